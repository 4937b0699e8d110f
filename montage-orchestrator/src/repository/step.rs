//! Step Ledger Repository
//!
//! Append-only ledger rows. An insert that collides with an existing
//! `(instance_id, name)` is dropped, so the first recorded outcome wins.

use chrono::{DateTime, Utc};
use montage_core::domain::step::{StepOutcome, StepRecord};
use sqlx::PgPool;
use uuid::Uuid;

/// Insert a ledger row unless one already exists for the name
pub async fn insert(
    pool: &PgPool,
    instance_id: Uuid,
    name: &str,
    outcome: serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO job_steps (instance_id, name, outcome, recorded_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (instance_id, name) DO NOTHING
        "#,
    )
    .bind(instance_id)
    .bind(name)
    .bind(outcome)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch the recorded outcome of a step
pub async fn find_outcome(
    pool: &PgPool,
    instance_id: Uuid,
    name: &str,
) -> Result<Option<serde_json::Value>, sqlx::Error> {
    sqlx::query_scalar::<_, serde_json::Value>(
        "SELECT outcome FROM job_steps WHERE instance_id = $1 AND name = $2",
    )
    .bind(instance_id)
    .bind(name)
    .fetch_optional(pool)
    .await
}

/// List the ledger of an instance in execution order
pub async fn find_by_instance(
    pool: &PgPool,
    instance_id: Uuid,
) -> Result<Vec<StepRow>, sqlx::Error> {
    sqlx::query_as::<_, StepRow>(
        r#"
        SELECT instance_id,
               ROW_NUMBER() OVER (ORDER BY sequence) - 1 AS position,
               name, outcome, recorded_at
        FROM job_steps
        WHERE instance_id = $1
        ORDER BY sequence ASC
        "#,
    )
    .bind(instance_id)
    .fetch_all(pool)
    .await
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
pub struct StepRow {
    pub instance_id: Uuid,
    pub position: i64,
    pub name: String,
    pub outcome: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl TryFrom<StepRow> for StepRecord {
    type Error = serde_json::Error;

    fn try_from(row: StepRow) -> Result<Self, Self::Error> {
        Ok(StepRecord {
            instance_id: row.instance_id,
            sequence: row.position,
            name: row.name,
            outcome: serde_json::from_value::<StepOutcome>(row.outcome)?,
            recorded_at: row.recorded_at,
        })
    }
}
