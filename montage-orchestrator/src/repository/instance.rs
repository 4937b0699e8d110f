//! Job Instance Repository
//!
//! Handles all database operations on job instances. Every status change is
//! a single conditional UPDATE so that concurrent owners cannot both win.

use chrono::{DateTime, Utc};
use montage_core::domain::instance::{DefinitionName, InstanceStatus, JobInstance};
use sqlx::PgPool;
use uuid::Uuid;

const COLUMNS: &str = "id, definition, correlation_key, parameters, status, \
                       cancel_requested, wake_at, created_at, updated_at";

/// Insert a new instance
///
/// Fails with a unique violation when a non-terminal instance already holds
/// the same `(definition, correlation_key)`.
pub async fn create(pool: &PgPool, instance: &JobInstance) -> Result<(), sqlx::Error> {
    let parameters = encode_parameters(instance)?;

    sqlx::query(
        r#"
        INSERT INTO job_instances
            (id, definition, correlation_key, parameters, status,
             cancel_requested, wake_at, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(instance.id)
    .bind(instance.definition.as_str())
    .bind(&instance.correlation_key)
    .bind(parameters)
    .bind(instance.status.as_str())
    .bind(instance.cancel_requested)
    .bind(instance.wake_at)
    .bind(instance.created_at)
    .bind(instance.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Parameters as the JSONB column value
fn encode_parameters(instance: &JobInstance) -> Result<serde_json::Value, sqlx::Error> {
    serde_json::to_value(&instance.parameters).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

/// Find an instance by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<InstanceRow>, sqlx::Error> {
    sqlx::query_as::<_, InstanceRow>(&format!(
        "SELECT {COLUMNS} FROM job_instances WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Find the non-terminal instance holding a correlation key
pub async fn find_active(
    pool: &PgPool,
    definition: DefinitionName,
    correlation_key: &str,
) -> Result<Option<InstanceRow>, sqlx::Error> {
    sqlx::query_as::<_, InstanceRow>(&format!(
        r#"
        SELECT {COLUMNS} FROM job_instances
        WHERE definition = $1 AND correlation_key = $2
          AND status IN ('Pending', 'Running', 'Suspended')
        "#
    ))
    .bind(definition.as_str())
    .bind(correlation_key)
    .fetch_optional(pool)
    .await
}

/// List instances, oldest first
pub async fn list(
    pool: &PgPool,
    status: Option<InstanceStatus>,
) -> Result<Vec<InstanceRow>, sqlx::Error> {
    match status {
        Some(status) => {
            sqlx::query_as::<_, InstanceRow>(&format!(
                "SELECT {COLUMNS} FROM job_instances WHERE status = $1 ORDER BY created_at ASC"
            ))
            .bind(status.as_str())
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, InstanceRow>(&format!(
                "SELECT {COLUMNS} FROM job_instances ORDER BY created_at ASC"
            ))
            .fetch_all(pool)
            .await
        }
    }
}

/// Move an instance from `from` to `to`
///
/// # Returns
/// Whether a row was updated
pub async fn transition(
    pool: &PgPool,
    id: Uuid,
    from: InstanceStatus,
    to: InstanceStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE job_instances
        SET status = $1,
            wake_at = CASE WHEN status = 'Suspended' THEN NULL ELSE wake_at END,
            updated_at = $2
        WHERE id = $3 AND status = $4
        "#,
    )
    .bind(to.as_str())
    .bind(Utc::now())
    .bind(id)
    .bind(from.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Park a running instance, or cancel it if a cancellation is pending
///
/// # Returns
/// The new status, or `None` when the instance was not Running
pub async fn suspend(
    pool: &PgPool,
    id: Uuid,
    wake_at: DateTime<Utc>,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        r#"
        UPDATE job_instances
        SET status = CASE WHEN cancel_requested THEN 'Cancelled' ELSE 'Suspended' END,
            wake_at = CASE WHEN cancel_requested THEN NULL ELSE $1 END,
            updated_at = $2
        WHERE id = $3 AND status = 'Running'
        RETURNING status
        "#,
    )
    .bind(wake_at)
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Move due suspended instances back to Running
///
/// Rows locked by a concurrent sweep are skipped, so every instance is
/// claimed by exactly one caller.
pub async fn claim_due(
    pool: &PgPool,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<InstanceRow>, sqlx::Error> {
    sqlx::query_as::<_, InstanceRow>(&format!(
        r#"
        UPDATE job_instances
        SET status = 'Running', wake_at = NULL, updated_at = $1
        WHERE id IN (
            SELECT id FROM job_instances
            WHERE status = 'Suspended' AND wake_at <= $2
            ORDER BY wake_at ASC
            LIMIT $3
            FOR UPDATE SKIP LOCKED
        )
        RETURNING {COLUMNS}
        "#
    ))
    .bind(Utc::now())
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Apply a cancellation request to a non-terminal instance
///
/// Pending and Suspended instances are cancelled on the spot; Running ones
/// only get their flag set.
///
/// # Returns
/// The new status, or `None` when the instance is terminal or missing
pub async fn request_cancel(pool: &PgPool, id: Uuid) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        r#"
        UPDATE job_instances
        SET cancel_requested = TRUE,
            status = CASE WHEN status IN ('Pending', 'Suspended') THEN 'Cancelled' ELSE status END,
            wake_at = CASE WHEN status = 'Suspended' THEN NULL ELSE wake_at END,
            updated_at = $1
        WHERE id = $2 AND status IN ('Pending', 'Running', 'Suspended')
        RETURNING status
        "#,
    )
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(pool)
    .await
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
pub struct InstanceRow {
    pub id: Uuid,
    pub definition: String,
    pub correlation_key: String,
    pub parameters: serde_json::Value,
    pub status: String,
    pub cancel_requested: bool,
    pub wake_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<InstanceRow> for JobInstance {
    type Error = String;

    fn try_from(row: InstanceRow) -> Result<Self, Self::Error> {
        let definition = DefinitionName::parse(&row.definition)
            .ok_or_else(|| format!("instance {}: unknown definition '{}'", row.id, row.definition))?;
        let status = InstanceStatus::parse(&row.status)
            .ok_or_else(|| format!("instance {}: unknown status '{}'", row.id, row.status))?;
        let parameters = serde_json::from_value(row.parameters)
            .map_err(|e| format!("instance {}: invalid parameters: {}", row.id, e))?;

        Ok(JobInstance {
            id: row.id,
            definition,
            correlation_key: row.correlation_key,
            parameters,
            status,
            cancel_requested: row.cancel_requested,
            wake_at: row.wake_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(definition: &str, status: &str) -> InstanceRow {
        let now = Utc::now();
        InstanceRow {
            id: Uuid::new_v4(),
            definition: definition.to_string(),
            correlation_key: "v1".to_string(),
            parameters: serde_json::json!({ "videoId": "v1" }),
            status: status.to_string(),
            cancel_requested: false,
            wake_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_row_conversion() {
        let instance = JobInstance::try_from(row("VideoCreate", "Suspended")).unwrap();
        assert_eq!(instance.definition, DefinitionName::VideoCreate);
        assert_eq!(instance.status, InstanceStatus::Suspended);
        assert_eq!(instance.parameters["videoId"], "v1");
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let err = JobInstance::try_from(row("VideoCreate", "Queued")).unwrap_err();
        assert!(err.contains("unknown status"));

        let err = JobInstance::try_from(row("Deploy", "Pending")).unwrap_err();
        assert!(err.contains("unknown definition"));
    }

    #[test]
    fn test_parameters_are_stored_as_an_object() {
        let mut parameters = std::collections::HashMap::new();
        parameters.insert("videoId".to_string(), serde_json::json!("v1"));
        parameters.insert("attempt".to_string(), serde_json::json!(2));
        let instance = JobInstance::new(DefinitionName::VideoRender, "v1", parameters);

        let value = encode_parameters(&instance).unwrap();
        assert_eq!(value, serde_json::json!({ "videoId": "v1", "attempt": 2 }));

        let mut stored = row("VideoRender", "Pending");
        stored.parameters = value;
        let restored = JobInstance::try_from(stored).unwrap();
        assert_eq!(restored.parameters, instance.parameters);
    }

    #[test]
    fn test_non_object_parameters_are_rejected() {
        let mut bad = row("VideoRender", "Pending");
        bad.parameters = serde_json::json!(["v1"]);
        assert!(JobInstance::try_from(bad).is_err());
    }
}
