//! Step ledger domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Recorded result of a named step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutcome {
    Success { output: serde_json::Value },
    Failed { error: String },
}

impl StepOutcome {
    pub fn success(output: serde_json::Value) -> Self {
        StepOutcome::Success { output }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        StepOutcome::Failed {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success { .. })
    }
}

/// One append-only ledger row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub instance_id: Uuid,
    /// Position in execution order, starting at 0
    pub sequence: i64,
    pub name: String,
    pub outcome: StepOutcome,
    pub recorded_at: DateTime<Utc>,
}
