//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod event;
mod image;
mod instance;
mod render;
mod schedule;
mod video;

pub use image::ImageCommands;
pub use instance::InstanceCommands;
pub use render::RenderCommands;
pub use schedule::ScheduleCommands;
pub use video::VideoCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Video production
    Video {
        #[command(subcommand)]
        command: VideoCommands,
    },
    /// Image generation
    Image {
        #[command(subcommand)]
        command: ImageCommands,
    },
    /// Scheduled publishing
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommands,
    },
    /// Video rendering
    Render {
        #[command(subcommand)]
        command: RenderCommands,
    },
    /// Job instance inspection
    Instance {
        #[command(subcommand)]
        command: InstanceCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Video { command } => video::handle_video_command(command, config).await,
        Commands::Image { command } => image::handle_image_command(command, config).await,
        Commands::Schedule { command } => {
            schedule::handle_schedule_command(command, config).await
        }
        Commands::Render { command } => render::handle_render_command(command, config).await,
        Commands::Instance { command } => {
            instance::handle_instance_command(command, config).await
        }
    }
}
