//! Error taxonomy for the pipeline.
//!
//! Each variant carries a distinct propagation policy: transient errors
//! are eligible for bounded retry, everything else aborts the run.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid static configuration. Not retried; requires a
    /// human fix.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The triggering commit could not be resolved or fetched.
    #[error("checkout failed: {0}")]
    Checkout(String),

    /// The image build failed; carries the builder's diagnostics verbatim.
    #[error("build failed: {0}")]
    Build(String),

    /// The registry rejected the supplied credentials or session.
    #[error("registry authentication failed: {0}")]
    Auth(String),

    /// Network or availability problem. Eligible for bounded retry.
    #[error("transient error: {0}")]
    Transient(String),

    /// The registry denied the write (quota or permissions).
    #[error("registry permission denied: {0}")]
    Permission(String),

    /// A stage exceeded its configured time bound.
    #[error("{stage} timed out after {limit:?}")]
    Timeout {
        stage: &'static str,
        limit: Duration,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the bounded retry policy applies to this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(Error::Transient("connection reset".to_string()).is_transient());
        assert!(!Error::Auth("bad password".to_string()).is_transient());
        assert!(!Error::Permission("quota exceeded".to_string()).is_transient());
        assert!(!Error::Configuration("missing branch".to_string()).is_transient());
        assert!(
            !Error::Timeout {
                stage: "build",
                limit: Duration::from_secs(1),
            }
            .is_transient()
        );
    }

    #[test]
    fn test_timeout_message_names_the_stage() {
        let err = Error::Timeout {
            stage: "publish",
            limit: Duration::from_secs(600),
        };
        assert!(err.to_string().contains("publish"));
    }
}
