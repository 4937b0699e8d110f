//! Job instance domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// The pipeline a job instance executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DefinitionName {
    VideoCreate,
    ImageGenerate,
    SchedulePublish,
    VideoRender,
}

impl DefinitionName {
    pub const ALL: [DefinitionName; 4] = [
        DefinitionName::VideoCreate,
        DefinitionName::ImageGenerate,
        DefinitionName::SchedulePublish,
        DefinitionName::VideoRender,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DefinitionName::VideoCreate => "VideoCreate",
            DefinitionName::ImageGenerate => "ImageGenerate",
            DefinitionName::SchedulePublish => "SchedulePublish",
            DefinitionName::VideoRender => "VideoRender",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == s)
    }
}

impl std::fmt::Display for DefinitionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a job instance
///
/// Pending -> Running -> {Suspended <-> Running} -> {Completed | Failed | Cancelled}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceStatus {
    Pending,
    Running,
    Suspended,
    Completed,
    Failed,
    Cancelled,
}

impl InstanceStatus {
    pub const ALL: [InstanceStatus; 6] = [
        InstanceStatus::Pending,
        InstanceStatus::Running,
        InstanceStatus::Suspended,
        InstanceStatus::Completed,
        InstanceStatus::Failed,
        InstanceStatus::Cancelled,
    ];

    /// Statuses an instance can hold while it still owns its correlation key
    pub const ACTIVE: [InstanceStatus; 3] = [
        InstanceStatus::Pending,
        InstanceStatus::Running,
        InstanceStatus::Suspended,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InstanceStatus::Completed | InstanceStatus::Failed | InstanceStatus::Cancelled
        )
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: InstanceStatus) -> bool {
        use InstanceStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Pending, Failed)
                | (Running, Suspended)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Suspended, Running)
                | (Suspended, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Pending => "Pending",
            InstanceStatus::Running => "Running",
            InstanceStatus::Suspended => "Suspended",
            InstanceStatus::Completed => "Completed",
            InstanceStatus::Failed => "Failed",
            InstanceStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One durable execution of a pipeline against a domain entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInstance {
    pub id: Uuid,
    pub definition: DefinitionName,
    /// Domain id (video, image or schedule id) used to route cancellations
    pub correlation_key: String,
    /// Trigger payload, fixed at creation so replays see the same inputs
    pub parameters: HashMap<String, serde_json::Value>,
    pub status: InstanceStatus,
    /// Set when a cancellation arrives while a runner owns the instance
    pub cancel_requested: bool,
    pub wake_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobInstance {
    /// Creates a new pending instance
    pub fn new(
        definition: DefinitionName,
        correlation_key: impl Into<String>,
        parameters: HashMap<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            definition,
            correlation_key: correlation_key.into(),
            parameters,
            status: InstanceStatus::Pending,
            cancel_requested: false,
            wake_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_requested || self.status == InstanceStatus::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses_have_no_exits() {
        for from in InstanceStatus::ALL.iter().filter(|s| s.is_terminal()) {
            for to in InstanceStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_suspend_resume_cycle_allowed() {
        assert!(InstanceStatus::Running.can_transition_to(InstanceStatus::Suspended));
        assert!(InstanceStatus::Suspended.can_transition_to(InstanceStatus::Running));
        assert!(!InstanceStatus::Suspended.can_transition_to(InstanceStatus::Completed));
        assert!(!InstanceStatus::Running.can_transition_to(InstanceStatus::Pending));
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in InstanceStatus::ALL {
            assert_eq!(InstanceStatus::parse(status.as_str()), Some(status));
        }
        for definition in DefinitionName::ALL {
            assert_eq!(DefinitionName::parse(definition.as_str()), Some(definition));
        }
        assert_eq!(InstanceStatus::parse("Queued"), None);
    }

    #[test]
    fn test_new_instance_is_pending() {
        let instance = JobInstance::new(DefinitionName::VideoCreate, "v1", HashMap::new());
        assert_eq!(instance.status, InstanceStatus::Pending);
        assert!(instance.wake_at.is_none());
        assert!(!instance.is_cancelled());
    }
}
