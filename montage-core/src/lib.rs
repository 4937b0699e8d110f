//! Montage Core
//!
//! Core types shared by the Montage workflow services.
//!
//! This crate contains:
//! - Domain types: job instances, ledger entries and the content records
//!   (videos, image generations, schedules) the pipelines operate on
//! - DTOs: trigger events and the views exchanged over the orchestrator API

pub mod domain;
pub mod dto;
