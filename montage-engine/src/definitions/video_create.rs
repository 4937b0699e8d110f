//! Video creation pipeline
//!
//! Narration, word-level captions, scene imagery and a title for a scripted
//! video, persisted onto the video record in one final write.

use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::info;

use montage_core::domain::RecordStatus;
use montage_core::domain::image::{ImageFormat, ImageParams};
use montage_core::domain::instance::DefinitionName;
use montage_core::domain::video::{CaptionWord, Video, VideoAssets};

use super::Pipeline;
use super::prompts;
use crate::collaborators::Collaborators;
use crate::context::StepContext;
use crate::error::{Interrupt, StepError};

const SCENE_WIDTH: u32 = 720;
const SCENE_HEIGHT: u32 = 1080;

/// One scene image prompt produced by the text model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenePrompt {
    pub image_prompt: String,
    #[serde(default)]
    pub scene_content: String,
}

pub struct VideoCreatePipeline {
    collaborators: Collaborators,
}

impl VideoCreatePipeline {
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }

    async fn scene_image(
        &self,
        video_id: &str,
        index: usize,
        scene: &ScenePrompt,
    ) -> Result<String, StepError> {
        let params = ImageParams {
            prompt: scene.image_prompt.clone(),
            aspect_ratio: "2:3".to_string(),
            width: SCENE_WIDTH,
            height: SCENE_HEIGHT,
            format: ImageFormat::Png,
        };
        let bytes = self.collaborators.images.generate(&params, None).await?;
        self.collaborators
            .storage
            .upload(bytes, &format!("scene-{video_id}-{index}.png"))
            .await
    }
}

/// Rejects empty alignments and words that do not move forward in time
pub fn validate_captions(words: &[CaptionWord]) -> Result<(), StepError> {
    if words.is_empty() {
        return Err(StepError::terminal("transcription returned no words"));
    }
    if let Some(bad) = words.iter().find(|w| w.start >= w.end) {
        return Err(StepError::terminal(format!(
            "caption '{}' has start {} not before end {}",
            bad.word, bad.start, bad.end
        )));
    }
    Ok(())
}

#[async_trait]
impl Pipeline for VideoCreatePipeline {
    fn definition(&self) -> DefinitionName {
        DefinitionName::VideoCreate
    }

    async fn execute(&self, ctx: &StepContext) -> Result<(), Interrupt> {
        let video_id = ctx.parameter_str("videoId")?;
        let c = &self.collaborators;

        ctx.step("mark-processing", || async {
            c.store
                .update_video_status(&video_id, RecordStatus::Processing)
                .await
        })
        .await?;

        let video: Video = ctx
            .step("get-video-data", || async {
                c.store
                    .get_video(&video_id)
                    .await?
                    .ok_or_else(|| StepError::terminal(format!("video {video_id} not found")))
            })
            .await?;

        let audio_url: String = ctx
            .step("generate-audio", || async {
                let audio = c.voice.speak(&video.script, &video.voice).await?;
                if audio.is_empty() {
                    return Err(StepError::terminal("voice synthesis returned no audio"));
                }
                c.storage.upload(audio, &format!("audio-{video_id}.wav")).await
            })
            .await?;

        let captions: Vec<CaptionWord> = ctx
            .step("generate-captions", || async {
                let words = c.transcriber.transcribe(&audio_url).await?;
                validate_captions(&words)?;
                Ok(words)
            })
            .await?;

        let scenes: Vec<ScenePrompt> = ctx
            .step("generate-image-prompts", || async {
                let prompt = prompts::scene_prompts(&video.video_style, &video.script);
                let raw = c.text.generate(&prompt).await?;
                let scenes: Vec<ScenePrompt> = prompts::parse_json_response(&raw)?;
                if scenes.is_empty() {
                    return Err(StepError::terminal("text model returned no scene prompts"));
                }
                Ok(scenes)
            })
            .await?;

        // Scene images run concurrently and are joined back in prompt order
        let images: Vec<String> = ctx
            .step("generate-images", || {
                try_join_all(
                    scenes
                        .iter()
                        .enumerate()
                        .map(|(index, scene)| self.scene_image(&video_id, index, scene)),
                )
            })
            .await?;

        let title: String = ctx
            .step("generate-title", || async {
                let raw = c.text.generate(&prompts::title(&video.script)).await?;
                let title = prompts::clean_title(&raw);
                if title.is_empty() {
                    return Err(StepError::terminal("text model returned an empty title"));
                }
                Ok(title)
            })
            .await?;

        let assets = VideoAssets {
            audio_url,
            captions,
            images,
            title,
            status: RecordStatus::Completed,
        };
        ctx.step("save-video-assets", || async {
            c.store.save_video_assets(&video_id, &assets).await
        })
        .await?;

        info!(instance_id = %ctx.instance_id(), "Video {} created", video_id);
        Ok(())
    }

    async fn on_failure(&self, ctx: &StepContext, _error: &str) -> Result<(), StepError> {
        let video_id = ctx.correlation_key();
        ctx.retry_policy()
            .run("mark-failed", || {
                self.collaborators
                    .store
                    .update_video_status(video_id, RecordStatus::Failed)
            })
            .await
    }
}
