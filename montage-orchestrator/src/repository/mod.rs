//! Repository Module
//!
//! Data access layer for the orchestrator. The submodules hold the SQL;
//! [`PgStore`] puts them behind the engine's repository and ledger traits.

pub mod instance;
pub mod step;

// Re-export for convenience
pub use instance as instance_repository;
pub use step as step_repository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use montage_core::domain::instance::{DefinitionName, InstanceStatus, JobInstance};
use montage_core::domain::step::{StepOutcome, StepRecord};
use montage_engine::error::invalid_transition;
use montage_engine::ledger::StepLedger;
use montage_engine::repository::InstanceRepository;
use montage_engine::StoreError;
use sqlx::PgPool;
use uuid::Uuid;

use instance::InstanceRow;

/// Postgres-backed instance repository and step ledger
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn require(&self, id: Uuid) -> Result<JobInstance, StoreError> {
        self.find_by_id(id).await?.ok_or(StoreError::NotFound(id))
    }
}

fn storage_error(err: sqlx::Error) -> StoreError {
    StoreError::Storage(err.to_string())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

fn to_instance(row: InstanceRow) -> Result<JobInstance, StoreError> {
    JobInstance::try_from(row).map_err(StoreError::Storage)
}

fn parse_status(raw: &str) -> Result<InstanceStatus, StoreError> {
    InstanceStatus::parse(raw).ok_or_else(|| StoreError::Storage(format!("unknown status '{raw}'")))
}

#[async_trait]
impl InstanceRepository for PgStore {
    async fn create(&self, instance: JobInstance) -> Result<JobInstance, StoreError> {
        match instance_repository::create(&self.pool, &instance).await {
            Ok(()) => Ok(instance),
            Err(e) if is_unique_violation(&e) => {
                let existing = self
                    .find_active(instance.definition, &instance.correlation_key)
                    .await?
                    .ok_or_else(|| {
                        StoreError::Storage(format!(
                            "conflict on '{}' but no active instance found",
                            instance.correlation_key
                        ))
                    })?;
                Err(StoreError::ActiveInstanceExists {
                    definition: instance.definition,
                    correlation_key: instance.correlation_key,
                    existing: existing.id,
                })
            }
            Err(e) => Err(storage_error(e)),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<JobInstance>, StoreError> {
        instance_repository::find_by_id(&self.pool, id)
            .await
            .map_err(storage_error)?
            .map(to_instance)
            .transpose()
    }

    async fn find_active(
        &self,
        definition: DefinitionName,
        correlation_key: &str,
    ) -> Result<Option<JobInstance>, StoreError> {
        instance_repository::find_active(&self.pool, definition, correlation_key)
            .await
            .map_err(storage_error)?
            .map(to_instance)
            .transpose()
    }

    async fn list(&self, status: Option<InstanceStatus>) -> Result<Vec<JobInstance>, StoreError> {
        instance_repository::list(&self.pool, status)
            .await
            .map_err(storage_error)?
            .into_iter()
            .map(to_instance)
            .collect()
    }

    async fn transition(
        &self,
        id: Uuid,
        from: InstanceStatus,
        to: InstanceStatus,
    ) -> Result<bool, StoreError> {
        if !from.can_transition_to(to) {
            return Err(invalid_transition(id, from, to));
        }

        let moved = instance_repository::transition(&self.pool, id, from, to)
            .await
            .map_err(storage_error)?;
        if !moved {
            // Distinguish a lost race from a missing row
            self.require(id).await?;
        }
        Ok(moved)
    }

    async fn suspend(
        &self,
        id: Uuid,
        wake_at: DateTime<Utc>,
    ) -> Result<InstanceStatus, StoreError> {
        match instance_repository::suspend(&self.pool, id, wake_at)
            .await
            .map_err(storage_error)?
        {
            Some(status) => parse_status(&status),
            None => {
                let current = self.require(id).await?;
                Err(invalid_transition(id, current.status, InstanceStatus::Suspended))
            }
        }
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobInstance>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        instance_repository::claim_due(&self.pool, now, limit)
            .await
            .map_err(storage_error)?
            .into_iter()
            .map(to_instance)
            .collect()
    }

    async fn request_cancel(&self, id: Uuid) -> Result<InstanceStatus, StoreError> {
        match instance_repository::request_cancel(&self.pool, id)
            .await
            .map_err(storage_error)?
        {
            Some(status) => parse_status(&status),
            None => Ok(self.require(id).await?.status),
        }
    }
}

#[async_trait]
impl StepLedger for PgStore {
    async fn record_step(
        &self,
        instance_id: Uuid,
        name: &str,
        outcome: StepOutcome,
    ) -> Result<StepOutcome, StoreError> {
        let value = serde_json::to_value(&outcome)?;
        step_repository::insert(&self.pool, instance_id, name, value)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    StoreError::NotFound(instance_id)
                } else {
                    storage_error(e)
                }
            })?;

        // Read back: a concurrent or earlier write may have won
        self.get_step(instance_id, name)
            .await?
            .ok_or_else(|| StoreError::Storage(format!("step '{name}' vanished after insert")))
    }

    async fn get_step(
        &self,
        instance_id: Uuid,
        name: &str,
    ) -> Result<Option<StepOutcome>, StoreError> {
        let value = step_repository::find_outcome(&self.pool, instance_id, name)
            .await
            .map_err(storage_error)?;
        Ok(value.map(serde_json::from_value).transpose()?)
    }

    async fn list_steps(&self, instance_id: Uuid) -> Result<Vec<StepRecord>, StoreError> {
        let rows = step_repository::find_by_instance(&self.pool, instance_id)
            .await
            .map_err(storage_error)?;
        Ok(rows
            .into_iter()
            .map(StepRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?)
    }
}
