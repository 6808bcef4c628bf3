//! Docker image builder stage.
//!
//! Builds the workspace into an image tagged with the publish target's
//! reference and resolves the resulting content digest.

use async_trait::async_trait;
use bollard::Docker;
use bollard::image::BuildImageOptions;
use bytes::Bytes;
use futures::StreamExt;
use tracing::{debug, info};

use shipit_core::stage::{BuildSpec, ImageArtifact, ImageBuilder, PublishTarget, Workspace};
use shipit_core::{Error, Result};

use crate::context::ContextArchive;

pub struct DockerImageBuilder {
    docker: Docker,
}

impl DockerImageBuilder {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    fn handle_build_output(output: bollard::models::BuildInfo) -> Result<()> {
        if let Some(line) = output.stream {
            debug!(line = %line.trim_end(), "Build output");
        }

        if let Some(error) = output.error {
            // Builder diagnostics are surfaced verbatim.
            return Err(Error::Build(error));
        }

        if let Some(detail) = output.error_detail {
            let message = detail
                .message
                .unwrap_or_else(|| "unknown build error".to_string());
            return Err(Error::Build(message));
        }

        Ok(())
    }
}

#[async_trait]
impl ImageBuilder for DockerImageBuilder {
    async fn build(
        &self,
        workspace: &Workspace,
        spec: &BuildSpec,
        target: &PublishTarget,
    ) -> Result<ImageArtifact> {
        let dockerfile_path = workspace.root.join(&spec.dockerfile);
        if !dockerfile_path.is_file() {
            // A missing build descriptor is a configuration problem, not
            // a build failure; retrying cannot fix it.
            return Err(Error::Configuration(format!(
                "build descriptor not found at {} in workspace for commit {}",
                spec.dockerfile, workspace.commit
            )));
        }

        let context_root = workspace.root.join(&spec.context);
        let context = ContextArchive::pack(&context_root, &dockerfile_path)?;

        let image_ref = target.image_ref();
        info!(image = %image_ref, commit = %workspace.commit, "Building image");

        let options = BuildImageOptions::<String> {
            dockerfile: "Dockerfile".to_string(),
            t: image_ref.clone(),
            rm: true,
            forcerm: true,
            pull: true,
            ..Default::default()
        };

        let body = Bytes::from(context);
        let mut stream = self.docker.build_image(options, None, Some(body));

        while let Some(msg) = stream.next().await {
            match msg {
                Ok(output) => Self::handle_build_output(output)?,
                Err(e) => return Err(Error::Build(e.to_string())),
            }
        }

        // The digest uniquely identifies the built content; the publish
        // tag is derived from the commit, so identical workspaces map to
        // identical references.
        let inspect = self
            .docker
            .inspect_image(&image_ref)
            .await
            .map_err(|e| Error::Build(format!("built image not found: {e}")))?;

        let digest = inspect
            .id
            .ok_or_else(|| Error::Internal("builder reported no image id".to_string()))?;

        info!(image = %image_ref, digest = %digest, "Image built");

        Ok(ImageArtifact {
            digest,
            tags: vec![image_ref],
        })
    }
}
