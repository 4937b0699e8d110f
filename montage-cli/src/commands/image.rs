//! Image command handlers

use anyhow::Result;
use clap::Subcommand;
use montage_core::dto::event::TriggerEvent;

use super::event;
use crate::config::Config;

/// Image subcommands
#[derive(Subcommand)]
pub enum ImageCommands {
    /// Generate the image described by an image generation record
    Generate {
        /// Image generation record ID
        image_id: String,
    },
    /// Cancel an in-flight image generation
    Cancel {
        /// Image generation record ID
        image_id: String,
    },
}

pub async fn handle_image_command(command: ImageCommands, config: &Config) -> Result<()> {
    let event = match command {
        ImageCommands::Generate { image_id } => TriggerEvent::ImageGenerate { image_id },
        ImageCommands::Cancel { image_id } => TriggerEvent::ImageCancel { image_id },
    };
    event::send(config, event).await
}
