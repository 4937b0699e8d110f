//! Job instance DTOs for the inspection API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::instance::{DefinitionName, InstanceStatus, JobInstance};

/// Result of dispatching a trigger event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchReceipt {
    Started { instance_id: Uuid },
    Cancelled { instances: Vec<CancelledInstance> },
}

/// An instance reached by a cancellation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelledInstance {
    pub instance_id: Uuid,
    /// Status right after the request was applied. `Running` means the
    /// runner will stop at its next step boundary.
    pub status: InstanceStatus,
}

/// Summary information about a job instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSummary {
    pub id: Uuid,
    pub definition: DefinitionName,
    pub correlation_key: String,
    pub status: InstanceStatus,
    pub wake_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<JobInstance> for InstanceSummary {
    fn from(instance: JobInstance) -> Self {
        InstanceSummary {
            id: instance.id,
            definition: instance.definition,
            correlation_key: instance.correlation_key,
            status: instance.status,
            wake_at: instance.wake_at,
            updated_at: instance.updated_at,
        }
    }
}
