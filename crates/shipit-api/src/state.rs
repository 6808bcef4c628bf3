//! Application state.

use std::sync::Arc;

use bollard::Docker;
use shipit_build::{DockerImageBuilder, GitCheckout, RegistryAuthClient, RegistryPublisher};
use shipit_config::DeployConfig;
use shipit_runner::PipelineRunner;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DeployConfig>,
    pub runner: PipelineRunner,
    /// Shared secret for webhook signature verification. When unset,
    /// unsigned deliveries are accepted.
    pub webhook_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(config: DeployConfig, runner: PipelineRunner, webhook_secret: Option<String>) -> Self {
        Self {
            config: Arc::new(config),
            runner,
            webhook_secret: webhook_secret.map(Into::into),
        }
    }

    /// Wire the production stages against the local Docker daemon.
    pub fn with_docker(config: DeployConfig, docker: Docker, webhook_secret: Option<String>) -> Self {
        let mut checkout = GitCheckout::new(config.checkout.url.as_str());
        if let Ok(token) = std::env::var("SHIPIT_GIT_TOKEN") {
            checkout = checkout.with_access_token(token);
        }

        let runner = PipelineRunner::new(
            config.clone(),
            Arc::new(checkout),
            Arc::new(DockerImageBuilder::new(docker.clone())),
            Arc::new(RegistryAuthClient::new()),
            Arc::new(RegistryPublisher::new(docker)),
        );

        Self::new(config, runner, webhook_secret)
    }
}
