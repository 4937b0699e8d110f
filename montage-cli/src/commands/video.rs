//! Video command handlers

use anyhow::Result;
use clap::Subcommand;
use montage_core::dto::event::TriggerEvent;

use super::event;
use crate::config::Config;

/// Video subcommands
#[derive(Subcommand)]
pub enum VideoCommands {
    /// Produce the assets of a video (script, voice, captions, images)
    Create {
        /// Video record ID
        video_id: String,
    },
    /// Cancel the in-flight production of a video
    Cancel {
        /// Video record ID
        video_id: String,
    },
}

pub async fn handle_video_command(command: VideoCommands, config: &Config) -> Result<()> {
    let event = match command {
        VideoCommands::Create { video_id } => TriggerEvent::VideoCreate { video_id },
        VideoCommands::Cancel { video_id } => TriggerEvent::VideoCancel { video_id },
    };
    event::send(config, event).await
}
