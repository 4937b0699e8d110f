//! Core domain types
//!
//! This module contains the core domain structures used across Montage services.
//! Instance and step types are persisted by the orchestrator and driven by the
//! engine; the content records are owned by the external document store and
//! only read and patched by the pipelines.

pub mod image;
pub mod instance;
pub mod schedule;
pub mod step;
pub mod user;
pub mod video;

use serde::{Deserialize, Serialize};

/// Processing status of a content record (video, image generation, schedule)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordStatus::Queued => write!(f, "QUEUED"),
            RecordStatus::Processing => write!(f, "PROCESSING"),
            RecordStatus::Completed => write!(f, "COMPLETED"),
            RecordStatus::Failed => write!(f, "FAILED"),
        }
    }
}
