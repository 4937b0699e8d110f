//! Schedule command handlers

use anyhow::Result;
use clap::Subcommand;
use montage_core::dto::event::TriggerEvent;

use super::event;
use crate::config::Config;

/// Schedule subcommands
#[derive(Subcommand)]
pub enum ScheduleCommands {
    /// Arm a schedule: wait for its time, then render and publish
    Upload {
        /// Schedule record ID
        schedule_id: String,

        /// Refresh token for the publishing account
        #[arg(long)]
        refresh_token: String,
    },
    /// Disarm a schedule
    Cancel {
        /// Schedule record ID
        schedule_id: String,
    },
}

pub async fn handle_schedule_command(command: ScheduleCommands, config: &Config) -> Result<()> {
    let event = match command {
        ScheduleCommands::Upload {
            schedule_id,
            refresh_token,
        } => TriggerEvent::ScheduleUpload {
            schedule_id,
            refresh_token,
        },
        ScheduleCommands::Cancel { schedule_id } => TriggerEvent::ScheduleCancel { schedule_id },
    };
    event::send(config, event).await
}
