//! Instance command handlers
//!
//! Lists job instances and shows an instance together with its step ledger.

use anyhow::{Result, anyhow};
use clap::Subcommand;
use colored::*;
use montage_client::OrchestratorClient;
use montage_core::domain::instance::{InstanceStatus, JobInstance};
use montage_core::domain::step::{StepOutcome, StepRecord};
use montage_core::dto::instance::InstanceSummary;

use super::event::colorize_status;
use crate::config::Config;
use crate::id_resolver::resolve_instance_id;
use crate::types::IdOrPrefix;

/// Instance subcommands
#[derive(Subcommand)]
pub enum InstanceCommands {
    /// List instances
    List {
        /// Only show instances with this status (e.g. running, suspended)
        #[arg(long)]
        status: Option<String>,
    },
    /// Get instance details
    Get {
        /// Instance ID or unambiguous prefix
        id: String,
    },
    /// Show the step ledger of an instance
    Steps {
        /// Instance ID or unambiguous prefix
        id: String,
    },
}

pub async fn handle_instance_command(command: InstanceCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        InstanceCommands::List { status } => {
            let status = status.as_deref().map(parse_status).transpose()?;
            list_instances(&client, status).await
        }
        InstanceCommands::Get { id } => get_instance(&client, &id).await,
        InstanceCommands::Steps { id } => get_steps(&client, &id).await,
    }
}

fn parse_status(input: &str) -> Result<InstanceStatus> {
    InstanceStatus::ALL
        .into_iter()
        .find(|status| status.as_str().eq_ignore_ascii_case(input))
        .ok_or_else(|| {
            let known: Vec<&str> = InstanceStatus::ALL.iter().map(|s| s.as_str()).collect();
            anyhow!("Unknown status '{}' (expected one of: {})", input, known.join(", "))
        })
}

async fn list_instances(
    client: &OrchestratorClient,
    status: Option<InstanceStatus>,
) -> Result<()> {
    let instances = client.list_instances(status).await?;

    if instances.is_empty() {
        println!("{}", "No instances found.".yellow());
    } else {
        println!(
            "{}",
            format!("Found {} instance(s):", instances.len()).bold()
        );
        println!();
        for instance in instances {
            print_instance_summary(&instance);
        }
    }

    Ok(())
}

async fn get_instance(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_instance_id(client, &IdOrPrefix::parse(id)).await?;
    let instance = client.get_instance(uuid).await?;

    print_instance_details(&instance);

    Ok(())
}

async fn get_steps(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_instance_id(client, &IdOrPrefix::parse(id)).await?;
    let steps = client.get_instance_steps(uuid).await?;

    if steps.is_empty() {
        println!("{}", "No steps recorded for this instance.".yellow());
    } else {
        println!("{}", format!("Steps for instance {}:", uuid).bold());
        println!("{}", "─".repeat(80).dimmed());
        for step in &steps {
            print_step(step);
        }
        println!("{}", "─".repeat(80).dimmed());
    }

    Ok(())
}

fn print_instance_summary(instance: &InstanceSummary) {
    println!("  {} Instance {}", "▸".cyan(), instance.id.to_string().dimmed());
    println!("    Definition: {}", instance.definition.as_str());
    println!("    Key:        {}", instance.correlation_key.dimmed());
    println!("    Status:     {}", colorize_status(instance.status));
    if let Some(wake_at) = instance.wake_at {
        println!(
            "    Wakes:      {}",
            wake_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }
    println!(
        "    Updated:    {}",
        instance
            .updated_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn print_instance_details(instance: &JobInstance) {
    println!("{}", "Instance Details:".bold());
    println!("  ID:         {}", instance.id.to_string().cyan());
    println!("  Definition: {}", instance.definition.as_str());
    println!("  Key:        {}", instance.correlation_key);
    println!("  Status:     {}", colorize_status(instance.status));
    if instance.cancel_requested && !instance.status.is_terminal() {
        println!("  {}", "Cancellation requested".yellow());
    }
    println!(
        "  Created:    {}",
        instance.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "  Updated:    {}",
        instance.updated_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(wake_at) = instance.wake_at {
        println!("  Wakes:      {}", wake_at.format("%Y-%m-%d %H:%M:%S"));
    }

    if !instance.parameters.is_empty() {
        println!("\n{}", "Parameters:".bold());
        let mut keys: Vec<&String> = instance.parameters.keys().collect();
        keys.sort();
        for key in keys {
            println!("  {} = {}", key.cyan(), instance.parameters[key]);
        }
    }
}

fn print_step(step: &StepRecord) {
    let (marker, detail) = match &step.outcome {
        StepOutcome::Success { output } => ("✓".green(), output.to_string().dimmed()),
        StepOutcome::Failed { error } => ("✗".red(), error.red()),
    };

    println!(
        "{} {} {} {}",
        step.recorded_at
            .format("%H:%M:%S")
            .to_string()
            .dimmed(),
        marker,
        step.name,
        detail
    );
}
