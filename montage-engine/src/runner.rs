//! Job runner
//!
//! Owns the instance state machine:
//!
//! ```text
//! Pending -> Running -> {Suspended <-> Running} -> {Completed | Failed | Cancelled}
//! ```
//!
//! A run replays the pipeline from the top against the ledger and turns the
//! way it stops into exactly one state transition.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use montage_core::domain::instance::InstanceStatus;

use crate::cancellation::CancellationBus;
use crate::context::StepContext;
use crate::definitions::Pipelines;
use crate::error::{EngineError, Interrupt, StepError, StoreError};
use crate::ledger::StepLedger;
use crate::repository::InstanceRepository;
use crate::retry::RetryPolicy;
use crate::scheduler::Scheduler;

/// How a single run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed,
    Suspended { wake_at: DateTime<Utc> },
    Failed { step: String, error: String },
    Cancelled,
    /// The instance was not in a runnable state; nothing was executed
    Skipped(InstanceStatus),
}

pub struct JobRunner {
    repository: Arc<dyn InstanceRepository>,
    ledger: Arc<dyn StepLedger>,
    scheduler: Scheduler,
    cancellation: CancellationBus,
    pipelines: Pipelines,
    retry: RetryPolicy,
}

impl JobRunner {
    pub fn new(
        repository: Arc<dyn InstanceRepository>,
        ledger: Arc<dyn StepLedger>,
        scheduler: Scheduler,
        pipelines: Pipelines,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            cancellation: CancellationBus::new(Arc::clone(&repository)),
            repository,
            ledger,
            scheduler,
            pipelines,
            retry,
        }
    }

    /// Runs an instance until it completes, fails, is cancelled or suspends
    ///
    /// Pending instances are moved to Running first. Running instances are
    /// assumed to be owned by the caller (claimed by the sweep or recovered
    /// after a crash). Any other status is skipped.
    pub async fn run(&self, instance_id: Uuid) -> Result<RunOutcome, EngineError> {
        let instance = self
            .repository
            .find_by_id(instance_id)
            .await?
            .ok_or(EngineError::UnknownInstance(instance_id))?;

        let pipeline = self
            .pipelines
            .get(instance.definition)
            .ok_or(EngineError::UnknownDefinition(instance.definition))?;

        match instance.status {
            InstanceStatus::Pending => {
                let claimed = self
                    .repository
                    .transition(instance_id, InstanceStatus::Pending, InstanceStatus::Running)
                    .await?;
                if !claimed {
                    let current = self.current_status(instance_id).await?;
                    info!(%instance_id, "Instance left Pending before it started ({})", current);
                    return Ok(RunOutcome::Skipped(current));
                }
            }
            InstanceStatus::Running => {}
            other => return Ok(RunOutcome::Skipped(other)),
        }

        info!(
            %instance_id,
            definition = %instance.definition,
            "Running {} for '{}'", instance.definition, instance.correlation_key
        );

        let ctx = StepContext::new(
            instance,
            Arc::clone(&self.ledger),
            self.cancellation.clone(),
            self.scheduler.clock(),
            self.retry.clone(),
        );

        match pipeline.execute(&ctx).await {
            Ok(()) => {
                // A cancellation that landed during the last step still wins
                match self.cancellation.is_cancelled(instance_id).await {
                    Ok(true) => {
                        self.finish(instance_id, InstanceStatus::Cancelled).await?;
                        info!(%instance_id, "Instance cancelled after its last step");
                        Ok(RunOutcome::Cancelled)
                    }
                    Ok(false) => {
                        self.finish(instance_id, InstanceStatus::Completed).await?;
                        info!(%instance_id, "Instance completed");
                        Ok(RunOutcome::Completed)
                    }
                    Err(e) => self.park_after_store_error(instance_id, e).await,
                }
            }
            Err(Interrupt::Suspend { wake_at }) => {
                match self.scheduler.sleep_until(instance_id, wake_at).await? {
                    InstanceStatus::Cancelled => {
                        info!(%instance_id, "Instance cancelled while suspending");
                        Ok(RunOutcome::Cancelled)
                    }
                    _ => Ok(RunOutcome::Suspended { wake_at }),
                }
            }
            Err(Interrupt::Cancelled) => {
                self.finish(instance_id, InstanceStatus::Cancelled).await?;
                info!(%instance_id, "Instance cancelled");
                Ok(RunOutcome::Cancelled)
            }
            Err(Interrupt::Failed { step, error }) => {
                // The canceller owns the record now; do not mark it failed
                if self.cancellation.is_cancelled(instance_id).await? {
                    self.finish(instance_id, InstanceStatus::Cancelled).await?;
                    info!(%instance_id, step = %step, "Instance cancelled; in-flight step failed: {}", error);
                    return Ok(RunOutcome::Cancelled);
                }

                self.finish(instance_id, InstanceStatus::Failed).await?;
                error!(%instance_id, step = %step, "Instance failed: {}", error);

                if let Err(e) = pipeline.on_failure(&ctx, &error).await {
                    warn!(%instance_id, "Failure hook did not complete: {}", e);
                }
                Ok(RunOutcome::Failed { step, error })
            }
            Err(Interrupt::Store(e)) => self.park_after_store_error(instance_id, e).await,
        }
    }

    /// Hands an instance whose run hit a store error back to the wake sweep
    ///
    /// The instance is suspended for one maximum backoff and replayed from
    /// its ledger afterwards. Only if parking fails too is it left Running
    /// for `Dispatcher::recover`.
    async fn park_after_store_error(
        &self,
        instance_id: Uuid,
        cause: StoreError,
    ) -> Result<RunOutcome, EngineError> {
        let delay = chrono::Duration::from_std(self.retry.max_delay)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        let wake_at = self.scheduler.now() + delay;
        warn!(%instance_id, %wake_at, "Store error during run, retrying later: {}", cause);

        let parked = self
            .retry
            .run("park-instance", || async {
                self.scheduler
                    .sleep_until(instance_id, wake_at)
                    .await
                    .map_err(|e| StepError::transient(e.to_string()))
            })
            .await;

        match parked {
            Ok(InstanceStatus::Cancelled) => {
                info!(%instance_id, "Instance cancelled while parking");
                Ok(RunOutcome::Cancelled)
            }
            Ok(_) => Ok(RunOutcome::Suspended { wake_at }),
            Err(e) => {
                error!(%instance_id, "Store unavailable, leaving instance for recovery: {}", e);
                Err(cause.into())
            }
        }
    }

    async fn finish(&self, instance_id: Uuid, to: InstanceStatus) -> Result<(), EngineError> {
        let moved = self
            .repository
            .transition(instance_id, InstanceStatus::Running, to)
            .await?;
        if !moved {
            warn!(
                %instance_id,
                "Instance was no longer Running when moving to {}", to
            );
        }
        Ok(())
    }

    async fn current_status(&self, instance_id: Uuid) -> Result<InstanceStatus, EngineError> {
        Ok(self
            .repository
            .find_by_id(instance_id)
            .await?
            .ok_or(EngineError::UnknownInstance(instance_id))?
            .status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::Pipeline;
    use crate::fakes::start_time;
    use crate::memory::InMemoryStore;
    use crate::scheduler::ManualClock;
    use async_trait::async_trait;
    use montage_core::domain::instance::{DefinitionName, JobInstance};
    use std::collections::HashMap;

    /// One-step pipeline that can request its own cancellation mid-step
    struct SingleStep {
        store: Arc<InMemoryStore>,
        cancel_during_step: bool,
        fail_step: bool,
    }

    #[async_trait]
    impl Pipeline for SingleStep {
        fn definition(&self) -> DefinitionName {
            DefinitionName::VideoCreate
        }

        async fn execute(&self, ctx: &StepContext) -> Result<(), Interrupt> {
            ctx.step("save-video-assets", || async {
                if self.cancel_during_step {
                    self.store
                        .request_cancel(ctx.instance_id())
                        .await
                        .map_err(|e| StepError::terminal(e.to_string()))?;
                }
                if self.fail_step {
                    return Err(StepError::terminal("video v1 not found"));
                }
                Ok(())
            })
            .await
        }

        async fn on_failure(&self, _ctx: &StepContext, _error: &str) -> Result<(), StepError> {
            Ok(())
        }
    }

    async fn run_single_step(
        cancel_during_step: bool,
        fail_step: bool,
    ) -> (Arc<InMemoryStore>, Uuid, RunOutcome) {
        let store = InMemoryStore::arc();
        let clock = Arc::new(ManualClock::new(start_time()));
        let mut pipelines = Pipelines::new();
        pipelines.register(Arc::new(SingleStep {
            store: store.clone(),
            cancel_during_step,
            fail_step,
        }));
        let runner = JobRunner::new(
            store.clone(),
            store.clone(),
            Scheduler::new(store.clone(), clock),
            pipelines,
            RetryPolicy::default(),
        );

        let instance = store
            .create(JobInstance::new(
                DefinitionName::VideoCreate,
                "v1",
                HashMap::new(),
            ))
            .await
            .unwrap();
        let outcome = runner.run(instance.id).await.unwrap();
        (store, instance.id, outcome)
    }

    #[tokio::test]
    async fn test_last_step_completes_instance() {
        let (store, id, outcome) = run_single_step(false, false).await;
        assert_eq!(outcome, RunOutcome::Completed);
        let instance = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(instance.status, InstanceStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancel_during_last_step_ends_cancelled() {
        let (store, id, outcome) = run_single_step(true, false).await;
        assert_eq!(outcome, RunOutcome::Cancelled);

        let instance = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(instance.status, InstanceStatus::Cancelled);
        // The step itself was allowed to finish
        assert!(store.get_step(id, "save-video-assets").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failure_after_cancel_request_ends_cancelled() {
        let (store, id, outcome) = run_single_step(true, true).await;
        assert_eq!(outcome, RunOutcome::Cancelled);
        let instance = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(instance.status, InstanceStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_failure_without_cancel_request_fails() {
        let (_, _, outcome) = run_single_step(false, true).await;
        assert!(matches!(
            outcome,
            RunOutcome::Failed { ref step, .. } if step == "save-video-assets"
        ));
    }
}
