use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create job instances table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_instances (
            id UUID PRIMARY KEY,
            definition VARCHAR(64) NOT NULL,
            correlation_key VARCHAR(255) NOT NULL,
            parameters JSONB NOT NULL DEFAULT '{}',
            status VARCHAR(32) NOT NULL,
            cancel_requested BOOLEAN NOT NULL DEFAULT FALSE,
            wake_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One non-terminal instance per correlation key
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_job_instances_active_key
        ON job_instances(definition, correlation_key)
        WHERE status IN ('Pending', 'Running', 'Suspended')
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_job_instances_wake ON job_instances(status, wake_at)",
    )
    .execute(pool)
    .await?;

    // Create step ledger table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_steps (
            instance_id UUID NOT NULL REFERENCES job_instances(id) ON DELETE CASCADE,
            sequence BIGSERIAL,
            name VARCHAR(255) NOT NULL,
            outcome JSONB NOT NULL,
            recorded_at TIMESTAMPTZ NOT NULL,
            UNIQUE (instance_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_job_steps_instance ON job_steps(instance_id, sequence)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
