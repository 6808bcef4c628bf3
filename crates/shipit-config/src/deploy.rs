//! Deployment configuration parsing.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// A complete deployment definition: one trigger branch, one image, one
/// registry target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Deployment name (e.g. "node").
    pub name: String,
    pub trigger: TriggerConfig,
    pub checkout: CheckoutConfig,
    pub build: BuildConfig,
    pub registry: RegistryConfig,
    pub retry: RetryConfig,
    pub timeouts: TimeoutConfig,
}

/// Which push events start a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// The single branch that qualifies (exact, case-sensitive match).
    pub branch: String,
}

/// Where the repository contents come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutConfig {
    /// HTTPS clone URL.
    pub url: String,
}

/// How the image is built from the workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Build descriptor path relative to the workspace root.
    pub dockerfile: String,
    /// Build context directory relative to the workspace root.
    pub context: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            dockerfile: "Dockerfile".to_string(),
            context: ".".to_string(),
        }
    }
}

/// Where built images are published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub host: String,
    pub repository: String,
}

/// Bounded retry policy for transient failures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub attempts: u32,
    /// Initial backoff; doubles after each failed attempt.
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Upper bound for each stage. A stage that exceeds its bound fails the
/// run instead of hanging it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub checkout: Duration,
    pub build: Duration,
    pub authenticate: Duration,
    pub publish: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            checkout: Duration::from_secs(120),
            build: Duration::from_secs(1800),
            authenticate: Duration::from_secs(30),
            publish: Duration::from_secs(600),
        }
    }
}

/// Load a deployment configuration from a `shipit.kdl` file.
pub fn load_deploy_config(path: &Path) -> ConfigResult<DeployConfig> {
    let text = std::fs::read_to_string(path)?;
    parse_deploy_config(&text)
}

/// Parse a deployment configuration from KDL text.
pub fn parse_deploy_config(kdl: &str) -> ConfigResult<DeployConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut name = String::new();
    let mut trigger = None;
    let mut checkout = None;
    let mut build = BuildConfig::default();
    let mut registry = None;
    let mut retry = RetryConfig::default();
    let mut timeouts = TimeoutConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "deploy" => {
                name = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("deploy name".to_string()))?;
            }
            "trigger" => {
                trigger = Some(parse_trigger(node)?);
            }
            "checkout" => {
                checkout = Some(parse_checkout(node)?);
            }
            "build" => {
                build = parse_build(node);
            }
            "registry" => {
                registry = Some(parse_registry(node)?);
            }
            "retry" => {
                retry = parse_retry(node)?;
            }
            "timeout" => {
                timeouts = parse_timeouts(node)?;
            }
            _ => {} // Ignore unknown nodes
        }
    }

    if name.is_empty() {
        return Err(ConfigError::MissingField("deploy name".to_string()));
    }

    let trigger = trigger.ok_or_else(|| ConfigError::MissingField("trigger".to_string()))?;
    let checkout = checkout.ok_or_else(|| ConfigError::MissingField("checkout".to_string()))?;
    let registry = registry.ok_or_else(|| ConfigError::MissingField("registry".to_string()))?;

    Ok(DeployConfig {
        name,
        trigger,
        checkout,
        build,
        registry,
        retry,
        timeouts,
    })
}

fn parse_trigger(node: &KdlNode) -> ConfigResult<TriggerConfig> {
    let branch = get_string_prop(node, "branch")
        .ok_or_else(|| ConfigError::MissingField("trigger branch".to_string()))?;

    if branch.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "trigger branch".to_string(),
            message: "must not be empty".to_string(),
        });
    }

    Ok(TriggerConfig { branch })
}

fn parse_checkout(node: &KdlNode) -> ConfigResult<CheckoutConfig> {
    let url = get_string_prop(node, "url")
        .ok_or_else(|| ConfigError::MissingField("checkout url".to_string()))?;

    Url::parse(&url).map_err(|e| ConfigError::InvalidValue {
        field: "checkout url".to_string(),
        message: e.to_string(),
    })?;

    Ok(CheckoutConfig { url })
}

fn parse_build(node: &KdlNode) -> BuildConfig {
    let defaults = BuildConfig::default();
    BuildConfig {
        dockerfile: get_string_prop(node, "dockerfile").unwrap_or(defaults.dockerfile),
        context: get_string_prop(node, "context").unwrap_or(defaults.context),
    }
}

fn parse_registry(node: &KdlNode) -> ConfigResult<RegistryConfig> {
    let host = get_string_prop(node, "host")
        .ok_or_else(|| ConfigError::MissingField("registry host".to_string()))?;
    let repository = get_string_prop(node, "repository")
        .ok_or_else(|| ConfigError::MissingField("registry repository".to_string()))?;

    if host.is_empty() || repository.is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "registry".to_string(),
            message: "host and repository must not be empty".to_string(),
        });
    }

    Ok(RegistryConfig { host, repository })
}

fn parse_retry(node: &KdlNode) -> ConfigResult<RetryConfig> {
    let defaults = RetryConfig::default();

    let attempts = match get_positive_int_prop(node, "attempts", "retry attempts")? {
        Some(n) if n <= u64::from(u32::MAX) => n as u32,
        Some(n) => {
            return Err(ConfigError::InvalidValue {
                field: "retry attempts".to_string(),
                message: format!("must fit in 32 bits, got {n}"),
            });
        }
        None => defaults.attempts,
    };

    let backoff = get_positive_int_prop(node, "backoff-ms", "retry backoff-ms")?
        .map(Duration::from_millis)
        .unwrap_or(defaults.backoff);

    Ok(RetryConfig { attempts, backoff })
}

fn parse_timeouts(node: &KdlNode) -> ConfigResult<TimeoutConfig> {
    let defaults = TimeoutConfig::default();
    let secs = |name: &str, field: &str, fallback: Duration| -> ConfigResult<Duration> {
        Ok(get_positive_int_prop(node, name, field)?
            .map(Duration::from_secs)
            .unwrap_or(fallback))
    };

    Ok(TimeoutConfig {
        checkout: secs("checkout-secs", "timeout checkout-secs", defaults.checkout)?,
        build: secs("build-secs", "timeout build-secs", defaults.build)?,
        authenticate: secs("auth-secs", "timeout auth-secs", defaults.authenticate)?,
        publish: secs("publish-secs", "timeout publish-secs", defaults.publish)?,
    })
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_int_prop(node: &KdlNode, name: &str) -> Option<i128> {
    node.get(name).and_then(|v| v.as_integer())
}

/// Counts and durations must be at least 1 and fit in 64 bits; anything
/// else (negative, zero, oversized) is a configuration error rather than
/// a silent wrap.
fn get_positive_int_prop(node: &KdlNode, name: &str, field: &str) -> ConfigResult<Option<u64>> {
    match get_int_prop(node, name) {
        None => Ok(None),
        Some(n) => u64::try_from(n)
            .ok()
            .filter(|&v| v >= 1)
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: field.to_string(),
                message: format!("must be a positive integer, got {n}"),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        deploy "node"

        trigger branch="main"
        checkout url="https://github.com/org/node.git"
        build dockerfile="docker/Dockerfile" context="."
        registry host="registry.example.com" repository="node"
        retry attempts=5 backoff-ms=250
        timeout checkout-secs=60 build-secs=900 auth-secs=10 publish-secs=300
    "#;

    #[test]
    fn test_parse_full_config() {
        let config = parse_deploy_config(FULL).unwrap();
        assert_eq!(config.name, "node");
        assert_eq!(config.trigger.branch, "main");
        assert_eq!(config.checkout.url, "https://github.com/org/node.git");
        assert_eq!(config.build.dockerfile, "docker/Dockerfile");
        assert_eq!(config.registry.host, "registry.example.com");
        assert_eq!(config.registry.repository, "node");
        assert_eq!(config.retry.attempts, 5);
        assert_eq!(config.retry.backoff, Duration::from_millis(250));
        assert_eq!(config.timeouts.build, Duration::from_secs(900));
        assert_eq!(config.timeouts.authenticate, Duration::from_secs(10));
    }

    #[test]
    fn test_defaults_for_optional_sections() {
        let kdl = r#"
            deploy "node"
            trigger branch="main"
            checkout url="https://github.com/org/node.git"
            registry host="registry.example.com" repository="node"
        "#;

        let config = parse_deploy_config(kdl).unwrap();
        assert_eq!(config.build.dockerfile, "Dockerfile");
        assert_eq!(config.build.context, ".");
        assert_eq!(config.retry.attempts, 3);
        assert_eq!(config.retry.backoff, Duration::from_millis(500));
        assert_eq!(config.timeouts.checkout, Duration::from_secs(120));
        assert_eq!(config.timeouts.publish, Duration::from_secs(600));
    }

    #[test]
    fn test_missing_trigger_is_an_error() {
        let kdl = r#"
            deploy "node"
            checkout url="https://github.com/org/node.git"
            registry host="registry.example.com" repository="node"
        "#;

        let result = parse_deploy_config(kdl);
        assert!(matches!(result.unwrap_err(), ConfigError::MissingField(_)));
    }

    #[test]
    fn test_missing_registry_is_an_error() {
        let kdl = r#"
            deploy "node"
            trigger branch="main"
            checkout url="https://github.com/org/node.git"
        "#;

        let result = parse_deploy_config(kdl);
        assert!(matches!(result.unwrap_err(), ConfigError::MissingField(_)));
    }

    #[test]
    fn test_invalid_clone_url() {
        let kdl = r#"
            deploy "node"
            trigger branch="main"
            checkout url="not a url"
            registry host="registry.example.com" repository="node"
        "#;

        let result = parse_deploy_config(kdl);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_zero_retry_attempts_rejected() {
        let kdl = r#"
            deploy "node"
            trigger branch="main"
            checkout url="https://github.com/org/node.git"
            registry host="registry.example.com" repository="node"
            retry attempts=0
        "#;

        let result = parse_deploy_config(kdl);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_negative_backoff_rejected() {
        let kdl = r#"
            deploy "node"
            trigger branch="main"
            checkout url="https://github.com/org/node.git"
            registry host="registry.example.com" repository="node"
            retry attempts=3 backoff-ms=-1
        "#;

        let result = parse_deploy_config(kdl);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_negative_timeout_rejected() {
        let kdl = r#"
            deploy "node"
            trigger branch="main"
            checkout url="https://github.com/org/node.git"
            registry host="registry.example.com" repository="node"
            timeout build-secs=-900
        "#;

        let result = parse_deploy_config(kdl);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_oversized_attempts_rejected() {
        let kdl = r#"
            deploy "node"
            trigger branch="main"
            checkout url="https://github.com/org/node.git"
            registry host="registry.example.com" repository="node"
            retry attempts=4294967296
        "#;

        let result = parse_deploy_config(kdl);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_empty_branch_rejected() {
        let kdl = r#"
            deploy "node"
            trigger branch=""
            checkout url="https://github.com/org/node.git"
            registry host="registry.example.com" repository="node"
        "#;

        let result = parse_deploy_config(kdl);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }
}
