use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use montage_engine::collaborators::DomainStore;
use montage_engine::definitions::Pipelines;
use montage_engine::{Dispatcher, SystemClock, WakeSweeper};

pub mod api;
pub mod config;
pub mod db;
pub mod gateway;
pub mod repository;
pub mod service;

use config::OrchestratorConfig;
use gateway::HttpGateway;
use repository::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "montage_orchestrator=info,montage_engine=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Montage Orchestrator...");

    let config = OrchestratorConfig::from_env().context("Invalid configuration")?;

    tracing::info!("Connecting to database...");

    // Create database connection pool
    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;

    tracing::info!("Database connection pool created");

    // Run migrations
    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let store = Arc::new(PgStore::new(pool));
    let gateway = Arc::new(HttpGateway::new(
        &config.gateway_url,
        config.collaborator_timeout,
    )?);
    let domain_store: Arc<dyn DomainStore> = gateway.clone();
    let pipelines = Pipelines::standard(gateway.collaborators(), &config.engine);

    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        store,
        pipelines,
        Arc::new(SystemClock),
        &config.engine,
    ));

    // Hand instances orphaned by a previous process back to runners
    let recovered = dispatcher
        .recover()
        .await
        .context("Failed to recover instances")?;
    if recovered > 0 {
        tracing::info!("Recovered {} instance(s)", recovered);
    }

    let sweeper = WakeSweeper::new(
        Arc::clone(&dispatcher),
        config.engine.sweep_interval,
        config.engine.sweep_batch_size,
    );
    tokio::spawn(async move { sweeper.run().await });

    // Build router with all API endpoints
    let app = api::create_router(dispatcher, domain_store);

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
