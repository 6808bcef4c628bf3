//! Git checkout stage.
//!
//! Materializes the repository tree at the triggering commit by fetching
//! exactly that commit with the git CLI. Materialization is
//! all-or-nothing: any failure removes the partially created workspace
//! before the error is returned.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{info, warn};

use shipit_core::stage::{CheckoutStage, Workspace};
use shipit_core::{Error, Result};

/// Fetches repository contents with the git CLI.
pub struct GitCheckout {
    clone_url: String,
    work_dir: PathBuf,
    access_token: Option<String>,
}

impl GitCheckout {
    pub fn new(clone_url: impl Into<String>) -> Self {
        let work_dir = std::env::var("SHIPIT_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("shipit-workspaces"));

        Self {
            clone_url: clone_url.into(),
            work_dir,
            access_token: None,
        }
    }

    pub fn with_work_dir(clone_url: impl Into<String>, work_dir: PathBuf) -> Self {
        Self {
            clone_url: clone_url.into(),
            work_dir,
            access_token: None,
        }
    }

    /// Access token for private repositories, injected into the fetch URL.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Workspace directory for one (url, commit) pair. Deterministic so a
    /// re-run of the same commit lands in the same place.
    fn workspace_path(&self, commit_ref: &str) -> PathBuf {
        let key = format!("{}@{}", self.clone_url, commit_ref);
        self.work_dir.join(format!("{:x}", md5::compute(key)))
    }

    fn fetch_url(&self) -> String {
        match (&self.access_token, self.clone_url.strip_prefix("https://")) {
            (Some(token), Some(rest)) => format!("https://{}@{}", token, rest),
            _ => self.clone_url.clone(),
        }
    }

    /// Strip the access token from diagnostics before they leave this
    /// stage.
    fn redact(&self, text: &str) -> String {
        match &self.access_token {
            Some(token) if !token.is_empty() => text.replace(token.as_str(), "[REDACTED]"),
            _ => text.to_string(),
        }
    }

    async fn git(&self, args: &[&str], cwd: &Path) -> Result<()> {
        let output = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::Checkout(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Checkout(self.redact(stderr.trim())));
        }

        Ok(())
    }

    async fn fetch_into(&self, dest: &Path, commit_ref: &str) -> Result<()> {
        self.git(&["init", "--quiet"], dest).await?;
        self.git(
            &["fetch", "--quiet", "--depth", "1", &self.fetch_url(), commit_ref],
            dest,
        )
        .await?;
        self.git(&["checkout", "--quiet", "--detach", "FETCH_HEAD"], dest)
            .await
    }
}

#[async_trait]
impl CheckoutStage for GitCheckout {
    async fn materialize(&self, commit_ref: &str) -> Result<Workspace> {
        let dest = self.workspace_path(commit_ref);

        // A previous run on the same commit may have left a workspace
        // behind; start from a clean tree.
        if dest.exists() {
            tokio::fs::remove_dir_all(&dest)
                .await
                .map_err(|e| Error::Checkout(format!("failed to clear workspace: {e}")))?;
        }
        tokio::fs::create_dir_all(&dest)
            .await
            .map_err(|e| Error::Checkout(format!("failed to create workspace: {e}")))?;

        info!(commit = %commit_ref, path = %dest.display(), "Materializing workspace");

        if let Err(e) = self.fetch_into(&dest, commit_ref).await {
            warn!(commit = %commit_ref, "Checkout failed, removing workspace");
            let _ = tokio::fs::remove_dir_all(&dest).await;
            return Err(e);
        }

        Ok(Workspace {
            root: dest,
            commit: commit_ref.to_string(),
        })
    }
}
