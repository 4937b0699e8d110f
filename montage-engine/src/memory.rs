//! In-memory store
//!
//! Arena + index implementation of both [`InstanceRepository`] and
//! [`StepLedger`]. Instances live in a vector and are addressed through an
//! id index; ledger rows are kept per instance in insertion order. Used by
//! tests and by single-process deployments that do not need durability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use montage_core::domain::instance::{DefinitionName, InstanceStatus, JobInstance};
use montage_core::domain::step::{StepOutcome, StepRecord};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{StoreError, invalid_transition};
use crate::ledger::StepLedger;
use crate::repository::InstanceRepository;

#[derive(Default)]
struct Inner {
    instances: Vec<JobInstance>,
    index: HashMap<Uuid, usize>,
    /// Correlation lookup for non-terminal instances
    active: HashMap<(DefinitionName, String), Uuid>,
    steps: HashMap<Uuid, Vec<StepRecord>>,
}

impl Inner {
    fn get_mut(&mut self, id: Uuid) -> Result<&mut JobInstance, StoreError> {
        let slot = *self.index.get(&id).ok_or(StoreError::NotFound(id))?;
        Ok(&mut self.instances[slot])
    }

    fn set_status(&mut self, id: Uuid, to: InstanceStatus) -> Result<(), StoreError> {
        let instance = self.get_mut(id)?;
        if !instance.status.can_transition_to(to) {
            return Err(invalid_transition(id, instance.status, to));
        }
        if instance.status == InstanceStatus::Suspended {
            instance.wake_at = None;
        }
        instance.status = to;
        instance.updated_at = Utc::now();

        if to.is_terminal() {
            let key = (instance.definition, instance.correlation_key.clone());
            if self.active.get(&key) == Some(&id) {
                self.active.remove(&key);
            }
        }
        Ok(())
    }
}

/// Thread-safe in-memory instance repository and step ledger
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl InstanceRepository for InMemoryStore {
    async fn create(&self, instance: JobInstance) -> Result<JobInstance, StoreError> {
        let mut inner = self.inner.lock();
        let key = (instance.definition, instance.correlation_key.clone());

        if let Some(existing) = inner.active.get(&key) {
            return Err(StoreError::ActiveInstanceExists {
                definition: instance.definition,
                correlation_key: instance.correlation_key,
                existing: *existing,
            });
        }

        let slot = inner.instances.len();
        inner.index.insert(instance.id, slot);
        inner.active.insert(key, instance.id);
        inner.instances.push(instance.clone());
        Ok(instance)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<JobInstance>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.index.get(&id).map(|slot| inner.instances[*slot].clone()))
    }

    async fn find_active(
        &self,
        definition: DefinitionName,
        correlation_key: &str,
    ) -> Result<Option<JobInstance>, StoreError> {
        let inner = self.inner.lock();
        let id = inner
            .active
            .get(&(definition, correlation_key.to_string()))
            .copied();
        Ok(id
            .and_then(|id| inner.index.get(&id))
            .map(|slot| inner.instances[*slot].clone()))
    }

    async fn list(&self, status: Option<InstanceStatus>) -> Result<Vec<JobInstance>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .instances
            .iter()
            .filter(|i| status.is_none_or(|s| i.status == s))
            .cloned()
            .collect())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: InstanceStatus,
        to: InstanceStatus,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        if inner.get_mut(id)?.status != from {
            return Ok(false);
        }
        inner.set_status(id, to)?;
        Ok(true)
    }

    async fn suspend(
        &self,
        id: Uuid,
        wake_at: DateTime<Utc>,
    ) -> Result<InstanceStatus, StoreError> {
        let mut inner = self.inner.lock();
        let instance = inner.get_mut(id)?;

        if instance.cancel_requested {
            inner.set_status(id, InstanceStatus::Cancelled)?;
            return Ok(InstanceStatus::Cancelled);
        }

        inner.set_status(id, InstanceStatus::Suspended)?;
        inner.get_mut(id)?.wake_at = Some(wake_at);
        Ok(InstanceStatus::Suspended)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobInstance>, StoreError> {
        let mut inner = self.inner.lock();

        let mut due: Vec<(DateTime<Utc>, Uuid)> = inner
            .instances
            .iter()
            .filter(|i| i.status == InstanceStatus::Suspended)
            .filter_map(|i| i.wake_at.filter(|at| *at <= now).map(|at| (at, i.id)))
            .collect();
        due.sort();
        due.truncate(limit);

        let mut claimed = Vec::with_capacity(due.len());
        for (_, id) in due {
            inner.set_status(id, InstanceStatus::Running)?;
            claimed.push(inner.get_mut(id)?.clone());
        }
        Ok(claimed)
    }

    async fn request_cancel(&self, id: Uuid) -> Result<InstanceStatus, StoreError> {
        let mut inner = self.inner.lock();
        let status = inner.get_mut(id)?.status;

        match status {
            InstanceStatus::Pending | InstanceStatus::Suspended => {
                inner.get_mut(id)?.cancel_requested = true;
                inner.set_status(id, InstanceStatus::Cancelled)?;
                Ok(InstanceStatus::Cancelled)
            }
            InstanceStatus::Running => {
                let instance = inner.get_mut(id)?;
                instance.cancel_requested = true;
                instance.updated_at = Utc::now();
                Ok(InstanceStatus::Running)
            }
            terminal => Ok(terminal),
        }
    }
}

#[async_trait]
impl StepLedger for InMemoryStore {
    async fn record_step(
        &self,
        instance_id: Uuid,
        name: &str,
        outcome: StepOutcome,
    ) -> Result<StepOutcome, StoreError> {
        let mut inner = self.inner.lock();
        if !inner.index.contains_key(&instance_id) {
            return Err(StoreError::NotFound(instance_id));
        }

        let rows = inner.steps.entry(instance_id).or_default();
        if let Some(existing) = rows.iter().find(|r| r.name == name) {
            return Ok(existing.outcome.clone());
        }

        rows.push(StepRecord {
            instance_id,
            sequence: rows.len() as i64,
            name: name.to_string(),
            outcome: outcome.clone(),
            recorded_at: Utc::now(),
        });
        Ok(outcome)
    }

    async fn get_step(
        &self,
        instance_id: Uuid,
        name: &str,
    ) -> Result<Option<StepOutcome>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .steps
            .get(&instance_id)
            .and_then(|rows| rows.iter().find(|r| r.name == name))
            .map(|r| r.outcome.clone()))
    }

    async fn list_steps(&self, instance_id: Uuid) -> Result<Vec<StepRecord>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner.steps.get(&instance_id).cloned().unwrap_or_default())
    }
}
