//! Step context
//!
//! The primitives pipelines are written against. A pipeline is replayed from
//! the top on every run; each primitive consults the ledger first and only
//! touches the outside world for steps that have no entry yet.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use montage_core::domain::instance::{DefinitionName, JobInstance};
use montage_core::domain::step::StepOutcome;

use crate::cancellation::CancellationBus;
use crate::error::{Interrupt, StepError, StoreError};
use crate::ledger::StepLedger;
use crate::retry::RetryPolicy;
use crate::scheduler::Clock;

/// Execution context of one job instance run
#[derive(Clone)]
pub struct StepContext {
    instance: Arc<JobInstance>,
    ledger: Arc<dyn StepLedger>,
    cancellation: CancellationBus,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    /// Prepended to every step name, e.g. `cycle-2/`
    prefix: String,
}

impl StepContext {
    pub fn new(
        instance: JobInstance,
        ledger: Arc<dyn StepLedger>,
        cancellation: CancellationBus,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            instance: Arc::new(instance),
            ledger,
            cancellation,
            clock,
            retry,
            prefix: String::new(),
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance.id
    }

    pub fn definition(&self) -> DefinitionName {
        self.instance.definition
    }

    pub fn correlation_key(&self) -> &str {
        &self.instance.correlation_key
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// A context whose step names live under `prefix`
    pub fn scoped(&self, prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..self.clone()
        }
    }

    fn step_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Reads a trigger parameter
    pub fn parameter<T: DeserializeOwned>(&self, key: &str) -> Result<T, Interrupt> {
        let value = self
            .instance
            .parameters
            .get(key)
            .cloned()
            .ok_or_else(|| Interrupt::Failed {
                step: "parameters".to_string(),
                error: format!("missing parameter '{key}'"),
            })?;

        serde_json::from_value(value).map_err(|e| Interrupt::Failed {
            step: "parameters".to_string(),
            error: format!("invalid parameter '{key}': {e}"),
        })
    }

    pub fn parameter_str(&self, key: &str) -> Result<String, Interrupt> {
        self.parameter(key)
    }

    async fn check_cancelled(&self, step: &str) -> Result<(), Interrupt> {
        if self.cancellation.is_cancelled(self.instance.id).await? {
            info!(instance_id = %self.instance.id, step, "Cancellation observed at step boundary");
            return Err(Interrupt::Cancelled);
        }
        Ok(())
    }

    /// Runs a named step exactly once
    ///
    /// A recorded success is returned without calling `f`. A recorded
    /// failure is raised again. Otherwise `f` runs under the retry policy and
    /// its outcome is recorded, success or terminal failure alike.
    pub async fn step<T, F, Fut>(&self, name: &str, f: F) -> Result<T, Interrupt>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StepError>>,
    {
        self.step_with(name, &self.retry, f).await
    }

    /// Same as [`StepContext::step`] with an explicit retry policy
    pub async fn step_with<T, F, Fut>(
        &self,
        name: &str,
        policy: &RetryPolicy,
        f: F,
    ) -> Result<T, Interrupt>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StepError>>,
    {
        let name = self.step_name(name);
        self.check_cancelled(&name).await?;

        if let Some(outcome) = self.ledger.get_step(self.instance.id, &name).await? {
            debug!(instance_id = %self.instance.id, step = %name, "Replaying recorded step");
            return self.replay(name, outcome);
        }

        debug!(instance_id = %self.instance.id, step = %name, "Executing step");
        let outcome = match policy.run(&name, f).await {
            Ok(value) => {
                StepOutcome::success(serde_json::to_value(&value).map_err(StoreError::from)?)
            }
            Err(e) => {
                warn!(instance_id = %self.instance.id, step = %name, "Step failed: {}", e);
                StepOutcome::failed(e.message())
            }
        };

        let stored = self
            .ledger
            .record_step(self.instance.id, &name, outcome)
            .await?;
        self.replay(name, stored)
    }

    fn replay<T: DeserializeOwned>(
        &self,
        name: String,
        outcome: StepOutcome,
    ) -> Result<T, Interrupt> {
        match outcome {
            StepOutcome::Success { output } => {
                serde_json::from_value(output).map_err(|e| Interrupt::Store(e.into()))
            }
            StepOutcome::Failed { error } => Err(Interrupt::Failed { step: name, error }),
        }
    }

    /// Suspends the instance until `wake_at`
    ///
    /// The wake time chosen on first execution is recorded under `name` and
    /// wins on every replay. Returns immediately once the clock has passed it.
    pub async fn sleep_until(&self, name: &str, wake_at: DateTime<Utc>) -> Result<(), Interrupt> {
        let name = self.step_name(name);
        self.check_cancelled(&name).await?;

        let recorded = match self.ledger.get_step(self.instance.id, &name).await? {
            Some(outcome) => outcome,
            None => {
                self.ledger
                    .record_step(
                        self.instance.id,
                        &name,
                        StepOutcome::success(json!({ "wakeAt": wake_at })),
                    )
                    .await?
            }
        };

        let wake_at: DateTime<Utc> = match recorded {
            StepOutcome::Success { output } => serde_json::from_value(output["wakeAt"].clone())
                .map_err(|e| Interrupt::Store(e.into()))?,
            StepOutcome::Failed { error } => return Err(Interrupt::Failed { step: name, error }),
        };

        if self.clock.now() < wake_at {
            info!(instance_id = %self.instance.id, step = %name, %wake_at, "Suspending");
            return Err(Interrupt::Suspend { wake_at });
        }
        Ok(())
    }

    /// Records a terminal failure under `name` and stops the pipeline
    pub async fn fail(&self, name: &str, error: impl Into<String>) -> Interrupt {
        let name = self.step_name(name);
        let error = error.into();
        match self
            .ledger
            .record_step(self.instance.id, &name, StepOutcome::failed(error.clone()))
            .await
        {
            Ok(StepOutcome::Failed { error }) => Interrupt::Failed { step: name, error },
            Ok(StepOutcome::Success { .. }) => Interrupt::Failed { step: name, error },
            Err(e) => Interrupt::Store(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::repository::InstanceRepository;
    use crate::scheduler::ManualClock;
    use chrono::TimeZone;
    use montage_core::domain::instance::InstanceStatus;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Harness {
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        ctx: StepContext,
    }

    async fn harness() -> Harness {
        let store = InMemoryStore::arc();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        ));
        let mut parameters = HashMap::new();
        parameters.insert("videoId".to_string(), json!("v1"));
        let instance = store
            .create(JobInstance::new(DefinitionName::VideoCreate, "v1", parameters))
            .await
            .unwrap();
        store
            .transition(instance.id, InstanceStatus::Pending, InstanceStatus::Running)
            .await
            .unwrap();

        let ctx = StepContext::new(
            instance,
            store.clone(),
            CancellationBus::new(store.clone()),
            clock.clone(),
            RetryPolicy {
                max_attempts: 2,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
                timeout: Duration::from_secs(1),
            },
        );
        Harness { store, clock, ctx }
    }

    #[tokio::test]
    async fn test_recorded_step_is_not_reexecuted() {
        let h = harness().await;
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let title: String = h
                .ctx
                .step("generate-title", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("Ocean Secrets".to_string())
                })
                .await
                .unwrap();
            assert_eq!(title, "Ocean Secrets");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recorded_failure_is_raised_again() {
        let h = harness().await;
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            let result: Result<String, _> = h
                .ctx
                .step("get-video-data", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(StepError::terminal("video v1 not found"))
                })
                .await;
            assert!(matches!(
                result,
                Err(Interrupt::Failed { ref step, ref error })
                    if step == "get-video-data" && error == "video v1 not found"
            ));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_blocks_next_step() {
        let h = harness().await;
        h.store.request_cancel(h.ctx.instance_id()).await.unwrap();

        let calls = AtomicU32::new(0);
        let result: Result<(), _> = h
            .ctx
            .step("mark-processing", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(Interrupt::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sleep_target_is_fixed_on_first_call() {
        let h = harness().await;
        let first_target = h.clock.now() + chrono::Duration::hours(6);

        let result = h.ctx.sleep_until("wait-for-schedule", first_target).await;
        assert!(matches!(result, Err(Interrupt::Suspend { wake_at }) if wake_at == first_target));

        // A replay asking for a different time still honors the recorded one
        h.clock.set(first_target);
        let later = first_target + chrono::Duration::days(1);
        assert!(h.ctx.sleep_until("wait-for-schedule", later).await.is_ok());
    }

    #[tokio::test]
    async fn test_scoped_steps_are_distinct() {
        let h = harness().await;
        let first: u32 = h.ctx.scoped("cycle-1/").step("count", || async { Ok(1) }).await.unwrap();
        let second: u32 = h.ctx.scoped("cycle-2/").step("count", || async { Ok(2) }).await.unwrap();
        assert_eq!((first, second), (1, 2));

        let names: Vec<_> = h
            .store
            .list_steps(h.ctx.instance_id())
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["cycle-1/count", "cycle-2/count"]);
    }

    #[tokio::test]
    async fn test_missing_parameter_fails() {
        let h = harness().await;
        assert_eq!(h.ctx.parameter_str("videoId").unwrap(), "v1");
        assert!(matches!(
            h.ctx.parameter_str("scheduleId"),
            Err(Interrupt::Failed { .. })
        ));
    }
}
