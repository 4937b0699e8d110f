//! Montage Engine
//!
//! Durable workflow engine for the Montage content pipelines.
//!
//! This crate contains:
//! - The step ledger and instance repository contracts, plus an in-memory
//!   implementation of both
//! - The step context pipelines are written against (steps, durable sleeps,
//!   retries, cancellation checks)
//! - The job runner, the dispatcher and the wake sweep
//! - The four pipeline definitions and the collaborator traits they call
//! - Caller-side cleanup of records whose jobs were cancelled

pub mod cancellation;
pub mod collaborators;
pub mod compensation;
pub mod config;
pub mod context;
pub mod definitions;
pub mod dispatcher;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod repository;
pub mod retry;
pub mod runner;
pub mod scheduler;

#[cfg(test)]
mod fakes;

pub use config::EngineConfig;
pub use dispatcher::Dispatcher;
pub use error::{EngineError, Interrupt, StepError, StoreError};
pub use runner::{JobRunner, RunOutcome};
pub use scheduler::{Clock, Scheduler, SystemClock, WakeSweeper};
