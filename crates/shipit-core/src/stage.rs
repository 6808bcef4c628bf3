//! Stage contracts for a pipeline instance.
//!
//! Each stage exclusively owns its output until it is handed to the next
//! stage. Nothing defined here persists past the run boundary except the
//! pushed image in the registry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::Result;
use crate::secret::Credential;

/// Repository tree materialized at the triggering commit.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub commit: String,
}

/// Location of the build descriptor inside the workspace. Its internal
/// format belongs entirely to the image builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Path relative to the workspace root.
    pub dockerfile: String,
    /// Build context directory relative to the workspace root.
    pub context: String,
}

impl Default for BuildSpec {
    fn default() -> Self {
        Self {
            dockerfile: "Dockerfile".to_string(),
            context: ".".to_string(),
        }
    }
}

/// A built container image, identified by its content digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageArtifact {
    /// Digest reported by the builder (e.g. "sha256:...").
    pub digest: String,
    /// Image references this digest is known under.
    pub tags: Vec<String>,
}

/// Where a built image is published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishTarget {
    pub registry_host: String,
    pub repository: String,
    pub tag: String,
}

impl PublishTarget {
    /// Tag-with-ref policy: the tag is the triggering commit ref, so
    /// repeated runs on the same ref overwrite the same tag rather than
    /// accumulating new ones.
    pub fn for_commit(
        registry_host: impl Into<String>,
        repository: impl Into<String>,
        commit_ref: impl Into<String>,
    ) -> Self {
        Self {
            registry_host: registry_host.into(),
            repository: repository.into(),
            tag: commit_ref.into(),
        }
    }

    /// The image name without a tag, e.g. "registry.example.com/node".
    pub fn image(&self) -> String {
        format!("{}/{}", self.registry_host, self.repository)
    }

    /// The full image reference, e.g. "registry.example.com/node:abc123".
    pub fn image_ref(&self) -> String {
        format!("{}/{}:{}", self.registry_host, self.repository, self.tag)
    }
}

/// Authenticated registry handle, valid for the rest of the run.
/// Debug output inherits the credential's secret redaction.
#[derive(Debug, Clone)]
pub struct Session {
    pub registry: String,
    credential: Credential,
    pub established_at: DateTime<Utc>,
}

impl Session {
    pub fn new(registry: impl Into<String>, credential: Credential) -> Self {
        Self {
            registry: registry.into(),
            credential,
            established_at: Utc::now(),
        }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }
}

/// Materializes the repository tree at a commit into a build workspace.
#[async_trait]
pub trait CheckoutStage: Send + Sync {
    /// All-or-nothing: on failure no partial workspace may remain or be
    /// handed downstream.
    async fn materialize(&self, commit_ref: &str) -> Result<Workspace>;
}

/// Produces a container image from a workspace.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Fails with `Error::Configuration` when the build descriptor is
    /// missing and `Error::Build` (diagnostics verbatim) when the build
    /// itself fails. Never publishes partial artifacts.
    async fn build(
        &self,
        workspace: &Workspace,
        spec: &BuildSpec,
        target: &PublishTarget,
    ) -> Result<ImageArtifact>;
}

/// Exchanges credential material for an authenticated registry session.
#[async_trait]
pub trait RegistryAuthenticator: Send + Sync {
    /// Idempotent and side-effect-free on failure, so transient failures
    /// are safe to retry.
    async fn authenticate(&self, host: &str, credential: &Credential) -> Result<Session>;
}

/// Uploads an artifact and moves the target tag to its digest.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// The registry's tag swap is atomic: the tag either resolves to the
    /// new digest or the prior state is retained. Between racing
    /// instances the last writer wins; the tag namespace is an external
    /// resource and is not locked in-process.
    ///
    /// Returns the pushed image reference.
    async fn publish(
        &self,
        artifact: &ImageArtifact,
        target: &PublishTarget,
        session: &Session,
    ) -> Result<String>;
}
