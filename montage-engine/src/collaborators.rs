//! External collaborator contracts
//!
//! Everything a pipeline touches outside the engine goes through one of
//! these traits. Implementations classify their failures as
//! [`StepError::Transient`] (retried) or [`StepError::Terminal`] (recorded).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use montage_core::domain::RecordStatus;
use montage_core::domain::image::{ImageGeneration, ImageParams};
use montage_core::domain::schedule::Schedule;
use montage_core::domain::user::User;
use montage_core::domain::video::{CaptionWord, RenderStatus, Video, VideoAssets};

use crate::error::StepError;

/// Document store holding the content records
///
/// Reads return `None` when the record does not exist.
#[async_trait]
pub trait DomainStore: Send + Sync {
    async fn get_video(&self, video_id: &str) -> Result<Option<Video>, StepError>;

    async fn update_video_status(
        &self,
        video_id: &str,
        status: RecordStatus,
    ) -> Result<(), StepError>;

    async fn save_video_assets(&self, video_id: &str, assets: &VideoAssets)
    -> Result<(), StepError>;

    async fn update_render_status(
        &self,
        video_id: &str,
        rendering: RenderStatus,
    ) -> Result<(), StepError>;

    async fn save_video_url(&self, video_id: &str, video_url: &str) -> Result<(), StepError>;

    async fn get_image_generation(
        &self,
        image_id: &str,
    ) -> Result<Option<ImageGeneration>, StepError>;

    /// Sets the status and, on success, the resulting image url
    async fn update_image_generation(
        &self,
        image_id: &str,
        status: RecordStatus,
        image: Option<&str>,
    ) -> Result<(), StepError>;

    async fn get_schedule(&self, schedule_id: &str) -> Result<Option<Schedule>, StepError>;

    async fn update_schedule_status(
        &self,
        schedule_id: &str,
        status: RecordStatus,
    ) -> Result<(), StepError>;

    /// Moves a recurring schedule to its next occurrence and queues it again
    async fn rearm_schedule(
        &self,
        schedule_id: &str,
        datetime: DateTime<Utc>,
    ) -> Result<(), StepError>;

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StepError>;

    /// Deleting a record that no longer exists succeeds
    async fn delete_video(&self, video_id: &str) -> Result<(), StepError>;

    async fn delete_image_generation(&self, image_id: &str) -> Result<(), StepError>;

    async fn delete_schedule(&self, schedule_id: &str) -> Result<(), StepError>;
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, StepError>;
}

#[async_trait]
pub trait VoiceSynthesizer: Send + Sync {
    /// Returns WAV audio
    async fn speak(&self, text: &str, voice: &str) -> Result<Vec<u8>, StepError>;
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Word-level alignment of the audio behind `audio_url`
    async fn transcribe(&self, audio_url: &str) -> Result<Vec<CaptionWord>, StepError>;
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(
        &self,
        params: &ImageParams,
        reference_image: Option<&str>,
    ) -> Result<Vec<u8>, StepError>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores the bytes and returns their public url
    async fn upload(&self, bytes: Vec<u8>, file_name: &str) -> Result<String, StepError>;
}

/// Inputs of a render job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub images: Vec<String>,
    pub audio_url: String,
    pub captions: Vec<CaptionWord>,
}

/// Progress reported by the render farm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RenderProgress {
    Pending,
    Done { output_url: String },
    Fatal { error: String },
}

#[async_trait]
pub trait RenderFarm: Send + Sync {
    /// Submits a render job and returns its id
    async fn submit(&self, request: &RenderRequest) -> Result<String, StepError>;

    async fn poll(&self, render_id: &str) -> Result<RenderProgress, StepError>;
}

/// Title, description and tags for a published video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishMetadata {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// What the publishing platform reports back after an upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReceipt {
    pub published_id: String,
    pub channel_title: Option<String>,
}

impl PublishReceipt {
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.published_id)
    }
}

#[async_trait]
pub trait PublishingPlatform: Send + Sync {
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, StepError>;

    async fn publish(
        &self,
        access_token: &str,
        video_url: &str,
        metadata: &PublishMetadata,
    ) -> Result<PublishReceipt, StepError>;
}

/// E-mail sent once a scheduled upload went live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedNotice {
    pub name: String,
    pub video_url: String,
    pub channel_name: String,
    pub video_title: String,
    pub video_description: String,
    pub video_tags: Vec<String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_email(&self, to: &str, notice: &PublishedNotice) -> Result<(), StepError>;
}

/// The full set of collaborators handed to the pipelines
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn DomainStore>,
    pub text: Arc<dyn TextGenerator>,
    pub voice: Arc<dyn VoiceSynthesizer>,
    pub transcriber: Arc<dyn Transcriber>,
    pub images: Arc<dyn ImageGenerator>,
    pub storage: Arc<dyn ObjectStorage>,
    pub render: Arc<dyn RenderFarm>,
    pub publisher: Arc<dyn PublishingPlatform>,
    pub notifier: Arc<dyn Notifier>,
}
