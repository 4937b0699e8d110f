//! Data Transfer Objects for inter-service communication
//!
//! This module contains DTOs used between Montage services (orchestrator,
//! client, CLI). Trigger events are the inbound contract of the dispatcher;
//! instance DTOs are lightweight views optimized for the inspection API.

pub mod event;
pub mod instance;
