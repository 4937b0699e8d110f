//! Error types for the workflow engine

use chrono::{DateTime, Utc};
use montage_core::domain::instance::{DefinitionName, InstanceStatus};
use thiserror::Error;
use uuid::Uuid;

/// Outcome of a failed collaborator call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    /// Network, timeout or rate limit. Retried with backoff.
    #[error("transient error: {0}")]
    Transient(String),

    /// Validation failure or permanent rejection. Recorded and fails the instance.
    #[error("{0}")]
    Terminal(String),
}

impl StepError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self::Terminal(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient(msg) | Self::Terminal(msg) => msg,
        }
    }
}

/// Errors raised by instance repositories and step ledgers
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("instance not found: {0}")]
    NotFound(Uuid),

    #[error("{definition} instance {existing} is still active for key '{correlation_key}'")]
    ActiveInstanceExists {
        definition: DefinitionName,
        correlation_key: String,
        existing: Uuid,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors returned to callers of the dispatcher and runner
#[derive(Debug, Error)]
pub enum EngineError {
    /// A second start request for a key that already has a non-terminal instance
    #[error("duplicate dispatch: {definition} for '{correlation_key}' is already handled by {existing}")]
    DuplicateDispatch {
        definition: DefinitionName,
        correlation_key: String,
        existing: Uuid,
    },

    #[error("unknown instance: {0}")]
    UnknownInstance(Uuid),

    #[error("no pipeline registered for {0}")]
    UnknownDefinition(DefinitionName),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ActiveInstanceExists {
                definition,
                correlation_key,
                existing,
            } => EngineError::DuplicateDispatch {
                definition,
                correlation_key,
                existing,
            },
            StoreError::NotFound(id) => EngineError::UnknownInstance(id),
            other => EngineError::Store(other),
        }
    }
}

/// Control flow out of a running pipeline
///
/// Anything other than normal completion unwinds the pipeline with one of
/// these; the runner turns it into a state transition.
#[derive(Debug)]
pub enum Interrupt {
    /// Park the instance until `wake_at`
    Suspend { wake_at: DateTime<Utc> },
    /// A cancellation was observed at a step boundary
    Cancelled,
    /// A step failed terminally and has been recorded
    Failed { step: String, error: String },
    /// The ledger or instance store could not be reached
    Store(StoreError),
}

impl From<StoreError> for Interrupt {
    fn from(err: StoreError) -> Self {
        Interrupt::Store(err)
    }
}

impl std::fmt::Display for Interrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interrupt::Suspend { wake_at } => write!(f, "suspended until {wake_at}"),
            Interrupt::Cancelled => write!(f, "cancelled"),
            Interrupt::Failed { step, error } => write!(f, "step '{step}' failed: {error}"),
            Interrupt::Store(err) => write!(f, "{err}"),
        }
    }
}

/// Raised when a status change is not allowed by the state machine
pub fn invalid_transition(id: Uuid, from: InstanceStatus, to: InstanceStatus) -> StoreError {
    StoreError::Storage(format!("instance {id}: invalid transition {from} -> {to}"))
}
