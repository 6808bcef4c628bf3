//! Registry authentication stage.
//!
//! Exchanges the credential for a session by probing the registry's
//! `/v2/` endpoint with basic auth. The probe is idempotent and
//! side-effect-free, so transient failures are safe to retry.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::info;

use shipit_core::secret::Credential;
use shipit_core::stage::{RegistryAuthenticator, Session};
use shipit_core::{Error, Result};

pub struct RegistryAuthClient {
    http: reqwest::Client,
}

impl RegistryAuthClient {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();

        Self { http }
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

impl Default for RegistryAuthClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryAuthenticator for RegistryAuthClient {
    async fn authenticate(&self, host: &str, credential: &Credential) -> Result<Session> {
        let url = format!("https://{host}/v2/");

        let response = self
            .http
            .get(&url)
            .basic_auth(&credential.username, Some(credential.secret()))
            .send()
            .await
            // Transport failures (DNS, refused, timeout) are transient;
            // the credential was not judged.
            .map_err(|e| Error::Transient(format!("registry {host} unreachable: {e}")))?;

        match response.status() {
            StatusCode::OK => {
                info!(registry = %host, username = %credential.username, "Registry session established");
                Ok(Session::new(host, credential.clone()))
            }
            StatusCode::UNAUTHORIZED => Err(Error::Auth(format!(
                "registry {host} rejected credentials for user {}",
                credential.username
            ))),
            StatusCode::FORBIDDEN => Err(Error::Permission(format!(
                "registry {host} denied access for user {}",
                credential.username
            ))),
            status if status.is_server_error() => Err(Error::Transient(format!(
                "registry {host} answered {status}"
            ))),
            status => Err(Error::Auth(format!(
                "unexpected response {status} from registry {host}"
            ))),
        }
    }
}
