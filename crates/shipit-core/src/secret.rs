//! Registry credential handling.
//!
//! Credentials are read from the environment once per pipeline instance,
//! live only for that run, and must never appear in logs or serialized
//! output.

use std::fmt;

use crate::{Error, Result};

/// Environment variable carrying the registry username.
pub const USERNAME_VAR: &str = "SHIPIT_REGISTRY_USERNAME";
/// Environment variable carrying the registry secret token.
pub const PASSWORD_VAR: &str = "SHIPIT_REGISTRY_PASSWORD";

/// A registry credential. The secret is redacted from Debug output and
/// the type deliberately implements neither Serialize nor Display.
#[derive(Clone)]
pub struct Credential {
    pub username: String,
    secret: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }

    /// Read the credential from the execution environment's secret
    /// injection mechanism.
    pub fn from_env() -> Result<Self> {
        let username = std::env::var(USERNAME_VAR)
            .map_err(|_| Error::Configuration(format!("{USERNAME_VAR} is not set")))?;
        let secret = std::env::var(PASSWORD_VAR)
            .map_err(|_| Error::Configuration(format!("{PASSWORD_VAR} is not set")))?;

        if username.is_empty() || secret.is_empty() {
            return Err(Error::Configuration(
                "registry credential must not be empty".to_string(),
            ));
        }

        Ok(Self { username, secret })
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}
