//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod event;
pub mod health;
pub mod instance;

use axum::{
    Router,
    routing::{get, post},
};
use montage_engine::Dispatcher;
use montage_engine::collaborators::DomainStore;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    /// Domain records, for cleanup after cancel events
    pub store: Arc<dyn DomainStore>,
}

/// Create the main API router with all endpoints
pub fn create_router(dispatcher: Arc<Dispatcher>, store: Arc<dyn DomainStore>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Event intake
        .route("/events", post(event::dispatch_event))
        // Instance inspection
        .route("/instances", get(instance::list_instances))
        .route("/instances/{id}", get(instance::get_instance))
        .route("/instances/{id}/steps", get(instance::get_instance_steps))
        // Add state and middleware
        .with_state(AppState { dispatcher, store })
        .layer(TraceLayer::new_for_http())
}
