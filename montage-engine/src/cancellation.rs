//! Cancellation bus
//!
//! Cancellation requests are routed by `(definition, correlation_key)` to
//! the one non-terminal instance that owns the key. Cancellation is
//! cooperative: an in-flight step finishes, and the runner stops at the next
//! step boundary.

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use montage_core::domain::instance::DefinitionName;
use montage_core::dto::instance::CancelledInstance;

use crate::error::StoreError;
use crate::repository::InstanceRepository;

#[derive(Clone)]
pub struct CancellationBus {
    repository: Arc<dyn InstanceRepository>,
}

impl CancellationBus {
    pub fn new(repository: Arc<dyn InstanceRepository>) -> Self {
        Self { repository }
    }

    /// Delivers a cancellation request to the matching instance
    ///
    /// # Returns
    /// The instances reached; empty when nothing is in flight for the key
    pub async fn cancel(
        &self,
        definition: DefinitionName,
        correlation_key: &str,
    ) -> Result<Vec<CancelledInstance>, StoreError> {
        let Some(instance) = self
            .repository
            .find_active(definition, correlation_key)
            .await?
        else {
            info!(
                "No active {} instance for '{}', nothing to cancel",
                definition, correlation_key
            );
            return Ok(Vec::new());
        };

        let status = self.repository.request_cancel(instance.id).await?;
        info!(
            instance_id = %instance.id,
            "Cancellation of {} '{}' applied, status now {}",
            definition, correlation_key, status
        );

        Ok(vec![CancelledInstance {
            instance_id: instance.id,
            status,
        }])
    }

    /// Whether the instance must stop before its next step
    pub async fn is_cancelled(&self, instance_id: Uuid) -> Result<bool, StoreError> {
        self.repository
            .find_by_id(instance_id)
            .await?
            .map(|instance| instance.is_cancelled())
            .ok_or(StoreError::NotFound(instance_id))
    }
}
