//! Instance repository
//!
//! Persistence contract for job instances. Every status change goes through
//! a conditional update so that two owners can never act on the same
//! instance: the sweep, the runner and the cancellation bus all race through
//! these methods.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use montage_core::domain::instance::{DefinitionName, InstanceStatus, JobInstance};
use uuid::Uuid;

use crate::error::StoreError;

#[async_trait]
pub trait InstanceRepository: Send + Sync {
    /// Inserts a new pending instance
    ///
    /// Fails with [`StoreError::ActiveInstanceExists`] when a non-terminal
    /// instance already holds the same `(definition, correlation_key)`.
    /// The check and the insert are atomic.
    async fn create(&self, instance: JobInstance) -> Result<JobInstance, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<JobInstance>, StoreError>;

    /// Finds the non-terminal instance for a correlation key, if any
    async fn find_active(
        &self,
        definition: DefinitionName,
        correlation_key: &str,
    ) -> Result<Option<JobInstance>, StoreError>;

    /// Lists instances, oldest first, optionally filtered by status
    async fn list(&self, status: Option<InstanceStatus>) -> Result<Vec<JobInstance>, StoreError>;

    /// Moves an instance from `from` to `to`
    ///
    /// # Returns
    /// `false` when the instance was no longer in `from`
    async fn transition(
        &self,
        id: Uuid,
        from: InstanceStatus,
        to: InstanceStatus,
    ) -> Result<bool, StoreError>;

    /// Parks a running instance until `wake_at`
    ///
    /// If a cancellation was requested while the instance was running, it is
    /// moved to `Cancelled` instead.
    ///
    /// # Returns
    /// The resulting status
    async fn suspend(&self, id: Uuid, wake_at: DateTime<Utc>)
    -> Result<InstanceStatus, StoreError>;

    /// Atomically moves suspended instances whose `wake_at <= now` back to
    /// `Running` and returns them. An instance is returned by at most one call.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobInstance>, StoreError>;

    /// Applies a cancellation request
    ///
    /// Pending and suspended instances have no owner and become `Cancelled`
    /// immediately. Running instances get their cancel flag set and stop at
    /// the next step boundary. Terminal instances are left untouched.
    ///
    /// # Returns
    /// The resulting status
    async fn request_cancel(&self, id: Uuid) -> Result<InstanceStatus, StoreError>;
}
