//! Scheduled publish pipeline
//!
//! Sleeps until the schedule's datetime, makes sure the video is rendered,
//! uploads it to the publishing platform and notifies the owner. Daily
//! schedules loop inside the same instance: each cycle's steps live under
//! `cycle-<n>/` and the loop ends only by cancellation, a failure or the
//! schedule disappearing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use montage_core::domain::RecordStatus;
use montage_core::domain::instance::DefinitionName;
use montage_core::domain::schedule::{Recurrence, Schedule};
use montage_core::domain::user::User;
use montage_core::domain::video::Video;

use super::Pipeline;
use super::prompts;
use super::video_render::{RenderSettings, render_video};
use crate::collaborators::{Collaborators, PublishMetadata, PublishReceipt, PublishedNotice};
use crate::config::EngineConfig;
use crate::context::StepContext;
use crate::error::{Interrupt, StepError};

/// How a publish cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleEnd {
    /// The schedule was moved to its next occurrence
    Rearmed,
    Finished,
}

/// Recorded result of the notification step
#[derive(Debug, Clone, Serialize, Deserialize)]
struct NotificationOutcome {
    sent: bool,
    error: Option<String>,
}

pub struct ScheduledPublishPipeline {
    collaborators: Collaborators,
    render: RenderSettings,
}

impl ScheduledPublishPipeline {
    pub fn new(collaborators: Collaborators, config: &EngineConfig) -> Self {
        Self {
            collaborators,
            render: RenderSettings::from_config(config),
        }
    }

    async fn run_cycle(
        &self,
        ctx: &StepContext,
        schedule_id: &str,
        refresh_token: &str,
    ) -> Result<CycleEnd, Interrupt> {
        let c = &self.collaborators;

        let schedule: Option<Schedule> = ctx
            .step("get-schedule", || async { c.store.get_schedule(schedule_id).await })
            .await?;

        let Some(schedule) = schedule else {
            info!(instance_id = %ctx.instance_id(), "Schedule {} no longer exists, stopping", schedule_id);
            return Ok(CycleEnd::Finished);
        };

        ctx.sleep_until("wait-for-scheduled-time", schedule.datetime)
            .await?;

        ctx.step("mark-processing", || async {
            c.store
                .update_schedule_status(schedule_id, RecordStatus::Processing)
                .await
        })
        .await?;

        let video: Video = ctx
            .step("get-video-data", || async {
                c.store.get_video(&schedule.video_id).await?.ok_or_else(|| {
                    StepError::terminal(format!("video {} not found", schedule.video_id))
                })
            })
            .await?;

        let video_url = match &video.video_url {
            Some(url) => url.clone(),
            None => render_video(ctx, c, &self.render, &video).await?,
        };

        ctx.step("save-video-url", || async {
            c.store.save_video_url(&video.id, &video_url).await
        })
        .await?;

        let metadata: PublishMetadata = ctx
            .step("generate-metadata", || async {
                let raw = c.text.generate(&prompts::publish_metadata(&video.script)).await?;
                prompts::parse_json_response(&raw)
            })
            .await?;

        let access_token: String = ctx
            .step("refresh-access-token", || async {
                c.publisher.refresh_access_token(refresh_token).await
            })
            .await?;

        let receipt: PublishReceipt = ctx
            .step("publish-video", || async {
                c.publisher.publish(&access_token, &video_url, &metadata).await
            })
            .await?;

        info!(
            instance_id = %ctx.instance_id(),
            "Video {} published as {}", video.id, receipt.published_id
        );

        let user: Option<User> = ctx
            .step("get-user", || async { c.store.get_user(&video.user_id).await })
            .await?;

        // The upload already happened; a lost e-mail must not fail it
        let notification: NotificationOutcome = ctx
            .step("send-email-notification", || async {
                let Some(user) = &user else {
                    return Ok(NotificationOutcome {
                        sent: false,
                        error: Some(format!("user {} not found", video.user_id)),
                    });
                };
                let notice = PublishedNotice {
                    name: user.name.clone(),
                    video_url: receipt.watch_url(),
                    channel_name: receipt
                        .channel_title
                        .clone()
                        .unwrap_or_else(|| "Unknown Channel".to_string()),
                    video_title: metadata.title.clone(),
                    video_description: metadata.description.clone(),
                    video_tags: metadata.tags.clone(),
                };
                let sent = ctx
                    .retry_policy()
                    .run("send-email", || c.notifier.send_email(&user.email, &notice))
                    .await;
                Ok(match sent {
                    Ok(()) => NotificationOutcome {
                        sent: true,
                        error: None,
                    },
                    Err(e) => NotificationOutcome {
                        sent: false,
                        error: Some(e.message().to_string()),
                    },
                })
            })
            .await?;

        if let Some(error) = &notification.error {
            warn!(instance_id = %ctx.instance_id(), "Publish notification not sent: {}", error);
        }

        ctx.step("mark-completed", || async {
            c.store
                .update_schedule_status(schedule_id, RecordStatus::Completed)
                .await
        })
        .await?;

        if schedule.recurrence != Recurrence::Daily {
            return Ok(CycleEnd::Finished);
        }

        // Measured from now so an overdue schedule fires once, not once per missed day
        let next: DateTime<Utc> = ctx
            .step("rearm-schedule", || async {
                let next = schedule.next_occurrence(ctx.now()).ok_or_else(|| {
                    StepError::terminal(format!("no next occurrence after {}", schedule.datetime))
                })?;
                c.store.rearm_schedule(schedule_id, next).await?;
                Ok(next)
            })
            .await?;

        info!(instance_id = %ctx.instance_id(), "Schedule {} re-armed for {}", schedule_id, next);
        Ok(CycleEnd::Rearmed)
    }
}

#[async_trait]
impl Pipeline for ScheduledPublishPipeline {
    fn definition(&self) -> DefinitionName {
        DefinitionName::SchedulePublish
    }

    async fn execute(&self, ctx: &StepContext) -> Result<(), Interrupt> {
        let schedule_id = ctx.parameter_str("scheduleId")?;
        let refresh_token = ctx.parameter_str("refreshToken")?;

        let mut cycle: u32 = 1;
        loop {
            let cycle_ctx = ctx.scoped(format!("cycle-{cycle}/"));
            match self.run_cycle(&cycle_ctx, &schedule_id, &refresh_token).await? {
                CycleEnd::Rearmed => cycle += 1,
                CycleEnd::Finished => return Ok(()),
            }
        }
    }

    async fn on_failure(&self, ctx: &StepContext, _error: &str) -> Result<(), StepError> {
        let schedule_id = ctx.correlation_key();
        ctx.retry_policy()
            .run("mark-failed", || {
                self.collaborators
                    .store
                    .update_schedule_status(schedule_id, RecordStatus::Failed)
            })
            .await
    }
}
