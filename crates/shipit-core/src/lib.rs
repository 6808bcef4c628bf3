//! Core domain types and stage contracts for the shipit deployment pipeline.
//!
//! This crate contains:
//! - Push event types and the trigger filter
//! - The pipeline error taxonomy
//! - Stage contracts (checkout, build, authenticate, publish)
//! - Credential handling and run identifiers
//! - The run state machine

pub mod error;
pub mod event;
pub mod id;
pub mod run;
pub mod secret;
pub mod stage;

pub use error::{Error, Result};
pub use id::RunId;
