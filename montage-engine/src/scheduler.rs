//! Suspend/resume scheduler
//!
//! A sleeping instance costs one row with a `wake_at` timestamp and nothing
//! else: no task, no timer. The [`WakeSweeper`] scans for due rows on an
//! interval and hands them back to the dispatcher, which replays the
//! pipeline from the top. Recorded steps, including the sleep itself, return
//! their stored values, so execution continues right after the sleep.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info};
use uuid::Uuid;

use montage_core::domain::instance::InstanceStatus;

use crate::dispatcher::Dispatcher;
use crate::error::StoreError;
use crate::repository::InstanceRepository;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Durable timers on top of the instance repository
#[derive(Clone)]
pub struct Scheduler {
    repository: Arc<dyn InstanceRepository>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(repository: Arc<dyn InstanceRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Persists `wake_at` and parks the instance
    ///
    /// # Returns
    /// `Suspended`, or `Cancelled` if a cancellation arrived while the
    /// instance was running
    pub async fn sleep_until(
        &self,
        instance_id: Uuid,
        wake_at: DateTime<Utc>,
    ) -> Result<InstanceStatus, StoreError> {
        let status = self.repository.suspend(instance_id, wake_at).await?;
        debug!(%instance_id, %wake_at, "Instance parked as {}", status);
        Ok(status)
    }

    /// Claims up to `limit` instances whose wake time has passed
    pub async fn claim_due(&self, limit: usize) -> Result<Vec<Uuid>, StoreError> {
        let claimed = self.repository.claim_due(self.clock.now(), limit).await?;
        Ok(claimed.into_iter().map(|i| i.id).collect())
    }
}

/// Periodic scan that resumes due instances
pub struct WakeSweeper {
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
    batch_size: usize,
}

impl WakeSweeper {
    pub fn new(dispatcher: Arc<Dispatcher>, interval: Duration, batch_size: usize) -> Self {
        Self {
            dispatcher,
            interval,
            batch_size,
        }
    }

    /// Runs the sweep loop forever
    pub async fn run(&self) {
        info!("Starting wake sweeper (interval: {:?})", self.interval);

        let mut interval = time::interval(self.interval);

        loop {
            interval.tick().await;

            match self.sweep_once().await {
                Ok(resumed) => {
                    if resumed > 0 {
                        info!("Resumed {} instance(s) this sweep", resumed);
                    }
                }
                Err(e) => {
                    error!("Error during wake sweep: {}", e);
                }
            }
        }
    }

    /// Performs a single sweep
    ///
    /// Only as many instances are claimed as there are free runner slots, so
    /// the rest stay suspended and are picked up by a later sweep.
    pub async fn sweep_once(&self) -> Result<usize, StoreError> {
        let capacity = self.dispatcher.available_slots().min(self.batch_size);
        if capacity == 0 {
            debug!("Max parallel jobs reached, skipping sweep");
            return Ok(0);
        }

        let due = self.dispatcher.scheduler().claim_due(capacity).await?;
        if due.is_empty() {
            debug!("No instances due");
            return Ok(0);
        }

        for instance_id in &due {
            self.dispatcher.resume(*instance_id);
        }

        Ok(due.len())
    }
}
