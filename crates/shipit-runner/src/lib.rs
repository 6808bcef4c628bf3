//! Pipeline instance runner.
//!
//! Drives one push event through the explicit stage graph
//! Filter -> Checkout -> Build -> Authenticate -> Publish, with
//! per-stage timeouts and bounded retry for transient failures.

pub mod retry;
pub mod runner;

pub use retry::retry_transient;
pub use runner::{PipelineRunner, RunError, RunEvent, RunOutcome};
