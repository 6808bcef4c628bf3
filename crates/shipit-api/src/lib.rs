//! Webhook server for shipit.
//!
//! Receives push events from the git hosting provider and dispatches
//! qualifying ones to the deployment pipeline.

pub mod error;
pub mod routes;
pub mod state;

pub use state::AppState;
