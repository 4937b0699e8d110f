//! Trigger event submission shared by the pipeline commands

use anyhow::{Context, Result};
use colored::*;
use montage_core::domain::instance::InstanceStatus;
use montage_core::dto::event::TriggerEvent;
use montage_core::dto::instance::DispatchReceipt;

use crate::config::Config;

/// Send an event and report what the dispatcher did with it
pub async fn send(config: &Config, event: TriggerEvent) -> Result<()> {
    let client = config.client();

    let receipt = match client.send_event(&event).await {
        Ok(receipt) => receipt,
        Err(e) if e.is_conflict() => {
            println!(
                "{}",
                format!(
                    "✗ An instance is already active for '{}'",
                    event.correlation_key()
                )
                .red()
            );
            return Err(e).context("Duplicate dispatch");
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to send {}", event.name()));
        }
    };

    print_receipt(&event, &receipt);
    Ok(())
}

fn print_receipt(event: &TriggerEvent, receipt: &DispatchReceipt) {
    match receipt {
        DispatchReceipt::Started { instance_id } => {
            println!(
                "{}",
                format!("✓ Started {} instance", event.definition().as_str()).green()
            );
            println!("  ID:  {}", instance_id.to_string().cyan());
            println!("  Key: {}", event.correlation_key().dimmed());
        }
        DispatchReceipt::Cancelled { instances } if instances.is_empty() => {
            println!(
                "{}",
                format!("No active instance for '{}'.", event.correlation_key()).yellow()
            );
        }
        DispatchReceipt::Cancelled { instances } => {
            println!(
                "{}",
                format!("Cancellation requested for {} instance(s):", instances.len()).bold()
            );
            for cancelled in instances {
                let note = if cancelled.status == InstanceStatus::Running {
                    " (stops at next step)".dimmed().to_string()
                } else {
                    String::new()
                };
                println!(
                    "  {} {} {}{}",
                    "▸".cyan(),
                    cancelled.instance_id.to_string().dimmed(),
                    colorize_status(cancelled.status),
                    note
                );
            }
        }
    }
}

/// Colorize instance status for display
pub fn colorize_status(status: InstanceStatus) -> ColoredString {
    let status_str = status.as_str();
    match status {
        InstanceStatus::Pending => status_str.yellow(),
        InstanceStatus::Running => status_str.blue(),
        InstanceStatus::Suspended => status_str.magenta(),
        InstanceStatus::Completed => status_str.green(),
        InstanceStatus::Failed => status_str.red(),
        InstanceStatus::Cancelled => status_str.dimmed(),
    }
}
