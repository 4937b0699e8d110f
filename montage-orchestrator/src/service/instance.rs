//! Instance Service
//!
//! Read-side queries over job instances and their ledgers.

use montage_core::domain::instance::{InstanceStatus, JobInstance};
use montage_core::domain::step::StepRecord;
use montage_core::dto::instance::InstanceSummary;
use montage_engine::StoreError;
use montage_engine::ledger::StepLedger;
use montage_engine::repository::InstanceRepository;
use uuid::Uuid;

/// Service error type
#[derive(Debug)]
pub enum InstanceError {
    NotFound(Uuid),
    ValidationError(String),
    StoreError(StoreError),
}

impl From<StoreError> for InstanceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => InstanceError::NotFound(id),
            other => InstanceError::StoreError(other),
        }
    }
}

/// Parse an optional status filter from a query string
pub fn parse_status_filter(raw: Option<&str>) -> Result<Option<InstanceStatus>, InstanceError> {
    match raw {
        None | Some("") => Ok(None),
        Some(s) => InstanceStatus::parse(s).map(Some).ok_or_else(|| {
            InstanceError::ValidationError(format!(
                "Unknown status '{}', expected one of {:?}",
                s,
                InstanceStatus::ALL.map(|st| st.as_str())
            ))
        }),
    }
}

/// List instances, optionally filtered by status
pub async fn list_instances(
    repository: &dyn InstanceRepository,
    status: Option<InstanceStatus>,
) -> Result<Vec<InstanceSummary>, InstanceError> {
    let instances = repository.list(status).await?;
    Ok(instances.into_iter().map(InstanceSummary::from).collect())
}

/// Get an instance by ID
pub async fn get_instance(
    repository: &dyn InstanceRepository,
    id: Uuid,
) -> Result<JobInstance, InstanceError> {
    repository
        .find_by_id(id)
        .await?
        .ok_or(InstanceError::NotFound(id))
}

/// Get the ledger of an instance in execution order
pub async fn get_steps(
    repository: &dyn InstanceRepository,
    ledger: &dyn StepLedger,
    id: Uuid,
) -> Result<Vec<StepRecord>, InstanceError> {
    // Verify instance exists first
    get_instance(repository, id).await?;
    Ok(ledger.list_steps(id).await?)
}
