//! KDL configuration parsing for shipit.
//!
//! A deployment is described by a single `shipit.kdl` document: the
//! trigger branch, the checkout source, the build descriptor, the
//! registry target, and the retry/timeout policy.

pub mod deploy;
pub mod error;

pub use deploy::{
    BuildConfig, CheckoutConfig, DeployConfig, RegistryConfig, RetryConfig, TimeoutConfig,
    TriggerConfig, load_deploy_config, parse_deploy_config,
};
pub use error::{ConfigError, ConfigResult};
