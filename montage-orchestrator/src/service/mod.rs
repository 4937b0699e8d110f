//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services sit between the HTTP handlers and the engine's stores.

pub mod instance;

// Re-export for convenience
pub use instance as instance_service;
