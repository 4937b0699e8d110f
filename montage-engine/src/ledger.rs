//! Step ledger
//!
//! Per-instance, append-only record of step name -> step outcome. The runner
//! consults it before every step so that completed side effects are never
//! repeated after a restart, a resume or a replay.

use async_trait::async_trait;
use montage_core::domain::step::{StepOutcome, StepRecord};
use uuid::Uuid;

use crate::error::StoreError;

/// Append-only store of step outcomes
///
/// Implementations must be first-write-wins: recording a name that already
/// has an entry leaves the entry untouched and returns the stored outcome.
/// Failed outcomes are recorded too, so a replay observes the same failure
/// instead of re-attempting a step known to fail.
#[async_trait]
pub trait StepLedger: Send + Sync {
    /// Records the outcome of a step
    ///
    /// # Returns
    /// The outcome stored for this name, which is the given one unless an
    /// earlier entry exists
    async fn record_step(
        &self,
        instance_id: Uuid,
        name: &str,
        outcome: StepOutcome,
    ) -> Result<StepOutcome, StoreError>;

    /// Fetches the recorded outcome of a step, if any
    async fn get_step(&self, instance_id: Uuid, name: &str)
    -> Result<Option<StepOutcome>, StoreError>;

    /// Lists all entries of an instance in execution order
    async fn list_steps(&self, instance_id: Uuid) -> Result<Vec<StepRecord>, StoreError>;
}
