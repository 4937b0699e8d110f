//! Event dispatcher
//!
//! Single entry point for inbound trigger events. Start events create a
//! Pending instance and hand it to a runner task; cancel events go to the
//! cancellation bus. Runner tasks are gated by a semaphore so at most
//! `max_parallel_jobs` instances execute at once.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use montage_core::domain::instance::{DefinitionName, InstanceStatus, JobInstance};
use montage_core::dto::event::{EventAction, TriggerEvent};
use montage_core::dto::instance::DispatchReceipt;

use crate::cancellation::CancellationBus;
use crate::config::EngineConfig;
use crate::definitions::Pipelines;
use crate::error::EngineError;
use crate::ledger::StepLedger;
use crate::repository::InstanceRepository;
use crate::runner::{JobRunner, RunOutcome};
use crate::scheduler::{Clock, Scheduler};

pub struct Dispatcher {
    repository: Arc<dyn InstanceRepository>,
    ledger: Arc<dyn StepLedger>,
    runner: Arc<JobRunner>,
    scheduler: Scheduler,
    cancellation: CancellationBus,
    pipelines: Pipelines,
    semaphore: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        repository: Arc<dyn InstanceRepository>,
        ledger: Arc<dyn StepLedger>,
        pipelines: Pipelines,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        let scheduler = Scheduler::new(Arc::clone(&repository), clock);
        let runner = JobRunner::new(
            Arc::clone(&repository),
            Arc::clone(&ledger),
            scheduler.clone(),
            pipelines.clone(),
            config.retry_policy(),
        );

        Self {
            cancellation: CancellationBus::new(Arc::clone(&repository)),
            semaphore: Arc::new(Semaphore::new(config.max_parallel_jobs)),
            runner: Arc::new(runner),
            repository,
            ledger,
            scheduler,
            pipelines,
        }
    }

    pub fn repository(&self) -> &Arc<dyn InstanceRepository> {
        &self.repository
    }

    pub fn ledger(&self) -> &Arc<dyn StepLedger> {
        &self.ledger
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn cancellation(&self) -> &CancellationBus {
        &self.cancellation
    }

    /// Runner slots not currently taken
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Applies an inbound trigger event
    ///
    /// Fails with [`EngineError::DuplicateDispatch`] when a start event names
    /// a key that already has a non-terminal instance. Nothing is queued.
    pub async fn dispatch(&self, event: TriggerEvent) -> Result<DispatchReceipt, EngineError> {
        let definition = event.definition();
        let correlation_key = event.correlation_key().to_string();
        info!("Dispatching {} for '{}'", event.name(), correlation_key);

        match event.action() {
            EventAction::Start(parameters) => {
                let (instance, _handle) = self.start(definition, &correlation_key, parameters).await?;
                Ok(DispatchReceipt::Started {
                    instance_id: instance.id,
                })
            }
            EventAction::Cancel => {
                let instances = self.cancellation.cancel(definition, &correlation_key).await?;
                Ok(DispatchReceipt::Cancelled { instances })
            }
        }
    }

    /// Creates a Pending instance and spawns its runner task
    pub async fn start(
        &self,
        definition: DefinitionName,
        correlation_key: &str,
        parameters: HashMap<String, serde_json::Value>,
    ) -> Result<(JobInstance, JoinHandle<Option<RunOutcome>>), EngineError> {
        if self.pipelines.get(definition).is_none() {
            return Err(EngineError::UnknownDefinition(definition));
        }

        let instance = self
            .repository
            .create(JobInstance::new(definition, correlation_key, parameters))
            .await?;

        info!(
            instance_id = %instance.id,
            "Created {} instance for '{}'", definition, correlation_key
        );

        let handle = self.spawn(instance.id);
        Ok((instance, handle))
    }

    /// Spawns a runner task for an instance claimed by the wake sweep
    pub fn resume(&self, instance_id: Uuid) -> JoinHandle<Option<RunOutcome>> {
        info!(%instance_id, "Resuming instance");
        self.spawn(instance_id)
    }

    /// Re-spawns instances a previous process left Pending or Running
    ///
    /// # Returns
    /// The number of instances handed back to runners
    pub async fn recover(&self) -> Result<usize, EngineError> {
        let mut orphans = self.repository.list(Some(InstanceStatus::Pending)).await?;
        orphans.extend(self.repository.list(Some(InstanceStatus::Running)).await?);

        for instance in &orphans {
            info!(
                instance_id = %instance.id,
                "Recovering {} instance left {}", instance.definition, instance.status
            );
            self.spawn(instance.id);
        }

        Ok(orphans.len())
    }

    fn spawn(&self, instance_id: Uuid) -> JoinHandle<Option<RunOutcome>> {
        let runner = Arc::clone(&self.runner);
        let semaphore = Arc::clone(&self.semaphore);

        tokio::spawn(async move {
            // Permit is released when dropped
            let _permit = semaphore.acquire_owned().await.ok()?;

            match runner.run(instance_id).await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    error!(%instance_id, "Run failed: {}", e);
                    None
                }
            }
        })
    }
}
