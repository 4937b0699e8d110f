//! ID resolver module
//!
//! Resolves instance ID prefixes to full UUIDs by querying the API, so users
//! can type short, unambiguous prefixes instead of full UUIDs.

use anyhow::{Context, Result, anyhow};
use montage_client::OrchestratorClient;
use uuid::Uuid;

use crate::types::IdOrPrefix;

/// Resolve an instance ID or prefix to a full UUID
///
/// # Errors
/// Returns an error if:
/// - No instance matches the prefix
/// - Multiple instances match the prefix (ambiguous)
/// - API call fails
pub async fn resolve_instance_id(
    client: &OrchestratorClient,
    id_or_prefix: &IdOrPrefix,
) -> Result<Uuid> {
    // If it's already a full UUID, return it
    if let IdOrPrefix::Full(uuid) = id_or_prefix {
        return Ok(*uuid);
    }

    let instances = client
        .list_instances(None)
        .await
        .context("Failed to fetch instances for ID resolution")?;

    pick_unique(id_or_prefix, instances.iter().map(|i| i.id))
}

fn pick_unique(id_or_prefix: &IdOrPrefix, ids: impl Iterator<Item = Uuid>) -> Result<Uuid> {
    let matches: Vec<Uuid> = ids.filter(|id| id_or_prefix.matches(*id)).collect();

    match matches.as_slice() {
        [] => Err(anyhow!(
            "No instance found with ID starting with '{}'",
            id_or_prefix
        )),
        [id] => Ok(*id),
        _ => {
            let ids: Vec<String> = matches.iter().map(Uuid::to_string).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple instances: {}",
                id_or_prefix,
                ids.join(", ")
            ))
        }
    }
}
