//! Render command handlers

use anyhow::Result;
use clap::Subcommand;
use montage_core::dto::event::TriggerEvent;

use super::event;
use crate::config::Config;

/// Render subcommands
#[derive(Subcommand)]
pub enum RenderCommands {
    /// Render a produced video into its final file
    Start {
        /// Video record ID
        video_id: String,
    },
    /// Cancel an in-flight render
    Cancel {
        /// Video record ID
        video_id: String,
    },
}

pub async fn handle_render_command(command: RenderCommands, config: &Config) -> Result<()> {
    let event = match command {
        RenderCommands::Start { video_id } => TriggerEvent::RenderVideo { video_id },
        RenderCommands::Cancel { video_id } => TriggerEvent::RenderCancel { video_id },
    };
    event::send(config, event).await
}
