//! Docker-backed stage implementations for the shipit pipeline.
//!
//! Checkout runs the git CLI; build and publish go through the local
//! Docker daemon via bollard; registry authentication probes the
//! registry's v2 endpoint over HTTPS.

pub mod auth;
pub mod builder;
pub mod checkout;
pub mod context;
pub mod publish;

pub use auth::RegistryAuthClient;
pub use builder::DockerImageBuilder;
pub use checkout::GitCheckout;
pub use publish::RegistryPublisher;
