//! Render pipeline
//!
//! Submits a produced video to the render farm and polls until the output
//! is ready. Every poll is its own step, so a restart picks up polling where
//! it stopped instead of submitting a second render.

use async_trait::async_trait;
use tracing::{info, warn};

use montage_core::domain::instance::DefinitionName;
use montage_core::domain::video::{RenderStatus, Video};

use super::Pipeline;
use crate::collaborators::{Collaborators, RenderProgress, RenderRequest};
use crate::config::EngineConfig;
use crate::context::StepContext;
use crate::error::{Interrupt, StepError};
use crate::retry::RetryPolicy;

/// Render settings shared by every pipeline that renders
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub poll_interval: std::time::Duration,
    pub max_polls: u32,
    pub poll_policy: RetryPolicy,
}

impl RenderSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            poll_interval: config.render_poll_interval,
            max_polls: config.render_max_polls,
            poll_policy: config.render_poll_policy(),
        }
    }
}

/// Builds the render farm input, failing when the video is not produced yet
pub fn render_request(video: &Video) -> Result<RenderRequest, StepError> {
    let missing = |field: &str| {
        StepError::terminal(format!("video {} has no {field}, cannot render", video.id))
    };

    let audio_url = video.audio_url.clone().ok_or_else(|| missing("audio"))?;
    let images = video
        .images
        .clone()
        .filter(|i| !i.is_empty())
        .ok_or_else(|| missing("images"))?;
    let captions = video
        .captions
        .clone()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| missing("captions"))?;

    Ok(RenderRequest {
        images,
        audio_url,
        captions,
    })
}

/// Renders `video` and returns the output url
///
/// Marks the video RENDERING, then RENDERED on success or NOT_RENDERED on a
/// fatal render error or when polling runs out.
pub async fn render_video(
    ctx: &StepContext,
    collaborators: &Collaborators,
    settings: &RenderSettings,
    video: &Video,
) -> Result<String, Interrupt> {
    let c = collaborators;
    let video_id = video.id.as_str();

    let request: RenderRequest = ctx
        .step("validate-render-input", || async { render_request(video) })
        .await?;

    ctx.step("mark-rendering", || async {
        c.store
            .update_render_status(video_id, RenderStatus::Rendering)
            .await
    })
    .await?;

    let render_id: String = ctx
        .step("submit-render", || async { c.render.submit(&request).await })
        .await?;

    info!(instance_id = %ctx.instance_id(), "Render {} submitted for video {}", render_id, video_id);

    let mut outcome = None;
    for poll in 1..=settings.max_polls {
        let progress: RenderProgress = ctx
            .step_with(&format!("poll-render-{poll}"), &settings.poll_policy, || async {
                tokio::time::sleep(settings.poll_interval).await;
                c.render.poll(&render_id).await
            })
            .await?;

        match progress {
            RenderProgress::Pending => continue,
            done => {
                outcome = Some(done);
                break;
            }
        }
    }

    let error = match outcome {
        Some(RenderProgress::Done { output_url }) => {
            ctx.step("mark-rendered", || async {
                c.store
                    .update_render_status(video_id, RenderStatus::Rendered)
                    .await
            })
            .await?;
            return Ok(output_url);
        }
        Some(RenderProgress::Fatal { error }) => format!("render {render_id} failed: {error}"),
        _ => format!(
            "render {render_id} not finished after {} polls",
            settings.max_polls
        ),
    };

    warn!(instance_id = %ctx.instance_id(), "{}", error);
    ctx.step("mark-not-rendered", || async {
        c.store
            .update_render_status(video_id, RenderStatus::NotRendered)
            .await
    })
    .await?;
    Err(ctx.fail("render-failed", error).await)
}

pub struct VideoRenderPipeline {
    collaborators: Collaborators,
    settings: RenderSettings,
}

impl VideoRenderPipeline {
    pub fn new(collaborators: Collaborators, config: &EngineConfig) -> Self {
        Self {
            collaborators,
            settings: RenderSettings::from_config(config),
        }
    }
}

#[async_trait]
impl Pipeline for VideoRenderPipeline {
    fn definition(&self) -> DefinitionName {
        DefinitionName::VideoRender
    }

    async fn execute(&self, ctx: &StepContext) -> Result<(), Interrupt> {
        let video_id = ctx.parameter_str("videoId")?;
        let c = &self.collaborators;

        let video: Video = ctx
            .step("get-video-data", || async {
                c.store
                    .get_video(&video_id)
                    .await?
                    .ok_or_else(|| StepError::terminal(format!("video {video_id} not found")))
            })
            .await?;

        let video_url = render_video(ctx, c, &self.settings, &video).await?;

        ctx.step("save-video-url", || async {
            c.store.save_video_url(&video_id, &video_url).await
        })
        .await?;

        info!(instance_id = %ctx.instance_id(), "Video {} rendered to {}", video_id, video_url);
        Ok(())
    }

    async fn on_failure(&self, ctx: &StepContext, _error: &str) -> Result<(), StepError> {
        let video_id = ctx.correlation_key();
        ctx.retry_policy()
            .run("mark-not-rendered", || {
                self.collaborators
                    .store
                    .update_render_status(video_id, RenderStatus::NotRendered)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use montage_core::domain::instance::InstanceStatus;
    use montage_core::dto::event::TriggerEvent;
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use crate::fakes::{Harness, produced_video, test_config};
    use crate::runner::RunOutcome;

    #[test]
    fn test_render_request_from_produced_video() {
        let request = render_request(&produced_video("v1")).unwrap();
        assert_eq!(request.audio_url, "https://cdn.test/audio-v1.wav");
        assert_eq!(request.images.len(), 1);
    }

    #[test]
    fn test_render_request_requires_assets() {
        let mut video = produced_video("v1");
        video.images = Some(Vec::new());
        let err = render_request(&video).unwrap_err();
        assert!(!err.is_transient());
        assert!(err.message().contains("images"));

        let mut video = produced_video("v1");
        video.audio_url = None;
        assert!(render_request(&video).unwrap_err().message().contains("audio"));
    }

    fn render_params() -> HashMap<String, serde_json::Value> {
        HashMap::from([("videoId".to_string(), serde_json::json!("v1"))])
    }

    fn seed(h: &Harness) {
        h.world
            .store
            .videos
            .lock()
            .insert("v1".to_string(), produced_video("v1"));
    }

    /// Slow polling and a render that stays pending until told otherwise
    fn stalled_harness() -> Harness {
        let h = Harness::with_config(EngineConfig {
            render_poll_interval: Duration::from_millis(10),
            render_max_polls: 1000,
            ..test_config()
        });
        h.world.render.pending_polls.store(u32::MAX, Ordering::SeqCst);
        seed(&h);
        h
    }

    #[tokio::test]
    async fn test_render_polls_until_done() {
        let h = Harness::new();
        seed(&h);

        let (instance, handle) = h
            .dispatcher
            .start(DefinitionName::VideoRender, "v1", render_params())
            .await
            .unwrap();
        assert_eq!(handle.await.unwrap(), Some(RunOutcome::Completed));

        assert_eq!(
            h.step_names(instance.id).await,
            vec![
                "get-video-data",
                "validate-render-input",
                "mark-rendering",
                "submit-render",
                "poll-render-1",
                "poll-render-2",
                "poll-render-3",
                "mark-rendered",
                "save-video-url",
            ]
        );

        let video = h.world.store.video("v1").unwrap();
        assert_eq!(video.rendering, RenderStatus::Rendered);
        assert_eq!(video.video_url.as_deref(), Some("https://cdn.test/render.mp4"));
        assert_eq!(
            *h.world.store.render_history.lock(),
            vec![RenderStatus::Rendering, RenderStatus::Rendered]
        );
    }

    #[tokio::test]
    async fn test_fatal_render_marks_not_rendered() {
        let h = Harness::new();
        seed(&h);
        *h.world.render.result.lock() = RenderProgress::Fatal {
            error: "unsupported codec".to_string(),
        };

        let (_, handle) = h
            .dispatcher
            .start(DefinitionName::VideoRender, "v1", render_params())
            .await
            .unwrap();

        let outcome = handle.await.unwrap();
        assert!(matches!(
            outcome,
            Some(RunOutcome::Failed { ref step, ref error })
                if step == "render-failed" && error.contains("unsupported codec")
        ));

        let video = h.world.store.video("v1").unwrap();
        assert_eq!(video.rendering, RenderStatus::NotRendered);
        assert!(video.video_url.is_none());
        assert!(
            !h.world
                .store
                .render_history
                .lock()
                .contains(&RenderStatus::Rendered)
        );
    }

    #[tokio::test]
    async fn test_unproduced_video_is_rejected_before_submission() {
        let h = Harness::new();
        h.world
            .store
            .videos
            .lock()
            .insert("v1".to_string(), crate::fakes::sample_video("v1"));

        let (_, handle) = h
            .dispatcher
            .start(DefinitionName::VideoRender, "v1", render_params())
            .await
            .unwrap();

        assert!(matches!(
            handle.await.unwrap(),
            Some(RunOutcome::Failed { ref step, .. }) if step == "validate-render-input"
        ));
        assert_eq!(h.world.calls.count("render.submit"), 0);
    }

    #[tokio::test]
    async fn test_cancel_mid_poll_never_marks_rendered() {
        let h = stalled_harness();

        let (instance, handle) = h
            .dispatcher
            .start(DefinitionName::VideoRender, "v1", render_params())
            .await
            .unwrap();
        h.wait_for_calls("render.poll", 2).await;

        h.dispatcher
            .dispatch(TriggerEvent::RenderCancel {
                video_id: "v1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(handle.await.unwrap(), Some(RunOutcome::Cancelled));
        assert_eq!(h.instance(instance.id).await.status, InstanceStatus::Cancelled);
        assert_eq!(h.world.calls.count("render.submit"), 1);

        let video = h.world.store.video("v1").unwrap();
        assert_ne!(video.rendering, RenderStatus::Rendered);
        assert!(video.video_url.is_none());
    }

    #[tokio::test]
    async fn test_restart_resumes_polling_without_resubmitting() {
        let h = stalled_harness();

        let (instance, handle) = h
            .dispatcher
            .start(DefinitionName::VideoRender, "v1", render_params())
            .await
            .unwrap();
        h.wait_for_calls("render.poll", 3).await;

        handle.abort();
        let _ = handle.await;
        let polls_before = h
            .step_names(instance.id)
            .await
            .iter()
            .filter(|s| s.starts_with("poll-render-"))
            .count();

        h.world.render.pending_polls.store(0, Ordering::SeqCst);
        assert_eq!(h.dispatcher.recover().await.unwrap(), 1);
        h.wait_for(instance.id, InstanceStatus::Completed).await;

        assert_eq!(h.world.calls.count("render.submit"), 1);
        let steps = h.step_names(instance.id).await;
        let polls = steps.iter().filter(|s| s.starts_with("poll-render-")).count();
        assert_eq!(polls, polls_before + 1);
        assert_eq!(
            h.world.store.video("v1").unwrap().rendering,
            RenderStatus::Rendered
        );
    }
}
