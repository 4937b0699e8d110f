//! Video domain types

use serde::{Deserialize, Serialize};

use super::RecordStatus;

/// A short-form video record held by the document store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    /// Owning user, used to address the publish notification
    pub user_id: String,
    pub script: String,
    /// Voice model for narration
    pub voice: String,
    pub video_style: String,
    pub title: Option<String>,
    pub audio_url: Option<String>,
    pub captions: Option<Vec<CaptionWord>>,
    pub images: Option<Vec<String>>,
    pub status: RecordStatus,
    pub video_url: Option<String>,
    #[serde(default)]
    pub rendering: RenderStatus,
}

/// Render sub-status of a video
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RenderStatus {
    #[default]
    NotRendered,
    Rendering,
    Rendered,
}

/// A word aligned to the narration audio, times in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionWord {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

/// Assets persisted once a video has been fully produced
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoAssets {
    pub audio_url: String,
    pub captions: Vec<CaptionWord>,
    pub images: Vec<String>,
    pub title: String,
    pub status: RecordStatus,
}
