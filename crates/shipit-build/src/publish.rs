//! Image publisher stage.
//!
//! Uploads a built artifact to the target registry and moves the
//! ref-derived tag to its digest. The registry's tag swap is atomic, so
//! a failed upload never leaves a dangling half-written manifest; between
//! racing pipeline instances the last writer wins.

use async_trait::async_trait;
use bollard::Docker;
use bollard::auth::DockerCredentials;
use bollard::image::{PushImageOptions, TagImageOptions};
use futures::StreamExt;
use tracing::{debug, info};

use shipit_core::stage::{ImageArtifact, PublishTarget, Publisher, Session};
use shipit_core::{Error, Result};

pub struct RegistryPublisher {
    docker: Docker,
}

impl RegistryPublisher {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Docker tag constraints: at most 128 characters of
    /// `[A-Za-z0-9._-]`, not starting with a period or hyphen. Commit
    /// shas always pass; this guards hand-supplied refs.
    fn validate_tag(tag: &str) -> Result<()> {
        if tag.is_empty() {
            return Err(Error::Configuration("image tag must not be empty".to_string()));
        }

        if tag.len() > 128 {
            return Err(Error::Configuration(format!(
                "image tag too long ({} characters, max 128)",
                tag.len()
            )));
        }

        if tag.starts_with('.') || tag.starts_with('-') {
            return Err(Error::Configuration(format!(
                "image tag must not start with '.' or '-': {tag}"
            )));
        }

        for c in tag.chars() {
            if !c.is_ascii_alphanumeric() && c != '.' && c != '-' && c != '_' {
                return Err(Error::Configuration(format!(
                    "invalid character '{c}' in image tag: {tag}"
                )));
            }
        }

        Ok(())
    }

    /// Map a registry-reported push error onto the failure taxonomy.
    fn classify_push_error(message: String) -> Error {
        let lowered = message.to_lowercase();

        if lowered.contains("unauthorized") || lowered.contains("authentication required") {
            Error::Auth(message)
        } else if lowered.contains("denied")
            || lowered.contains("forbidden")
            || lowered.contains("quota")
        {
            Error::Permission(message)
        } else if lowered.contains("timeout")
            || lowered.contains("connection")
            || lowered.contains("unexpected eof")
            || lowered.contains("temporarily")
        {
            Error::Transient(message)
        } else {
            Error::Internal(message)
        }
    }
}

#[async_trait]
impl Publisher for RegistryPublisher {
    async fn publish(
        &self,
        artifact: &ImageArtifact,
        target: &PublishTarget,
        session: &Session,
    ) -> Result<String> {
        Self::validate_tag(&target.tag)?;

        let image = target.image();
        let image_ref = target.image_ref();

        // The builder normally tags the artifact with the target ref
        // already; retag from the digest when it hasn't.
        if !artifact.tags.contains(&image_ref) {
            let options = TagImageOptions::<String> {
                repo: image.clone(),
                tag: target.tag.clone(),
            };
            self.docker
                .tag_image(&artifact.digest, Some(options))
                .await
                .map_err(|e| Error::Internal(format!("failed to tag image: {e}")))?;
        }

        let credentials = DockerCredentials {
            username: Some(session.credential().username.clone()),
            password: Some(session.credential().secret().to_string()),
            serveraddress: Some(session.registry.clone()),
            ..Default::default()
        };

        info!(image = %image_ref, digest = %artifact.digest, "Pushing image");

        let options = PushImageOptions::<String> {
            tag: target.tag.clone(),
        };
        let mut stream = self
            .docker
            .push_image(&image, Some(options), Some(credentials));

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(err) = info.error {
                        return Err(Self::classify_push_error(err));
                    }
                    if let Some(status) = info.status {
                        debug!(status = %status, "Push progress");
                    }
                }
                Err(e) => {
                    // Stream-level failures are transport problems; the
                    // upload is idempotent per digest and safe to retry.
                    return Err(Error::Transient(e.to_string()));
                }
            }
        }

        info!(image = %image_ref, "Image pushed");

        Ok(image_ref)
    }
}
