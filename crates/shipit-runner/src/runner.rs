//! Pipeline instance orchestration.
//!
//! One `PipelineRunner::execute` call drives one push event through the
//! stage graph. Each qualifying event gets its own instance; instances
//! share nothing but the registry tag namespace, which belongs to the
//! registry and is not locked in-process.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use shipit_config::DeployConfig;
use shipit_core::event::PushEvent;
use shipit_core::run::RunState;
use shipit_core::secret::Credential;
use shipit_core::stage::{
    BuildSpec, CheckoutStage, ImageBuilder, PublishTarget, Publisher, RegistryAuthenticator,
};
use shipit_core::{Error, Result, RunId};

use crate::retry::retry_transient;

const FILTER: &str = "filter";
const CHECKOUT: &str = "checkout";
const BUILD: &str = "build";
const AUTHENTICATE: &str = "authenticate";
const PUBLISH: &str = "publish";

/// Progress event emitted while a run executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    StageStarted {
        run_id: RunId,
        stage: &'static str,
        state: RunState,
    },
    StageCompleted {
        run_id: RunId,
        stage: &'static str,
    },
    RunCompleted {
        run_id: RunId,
        state: RunState,
    },
}

/// Final report for one pipeline instance.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub state: RunState,
    /// Image reference that was pushed, when the run succeeded.
    pub pushed: Option<String>,
    /// Failing stage and diagnostic, when the run failed.
    pub error: Option<RunError>,
}

#[derive(Debug)]
pub struct RunError {
    pub stage: &'static str,
    pub message: String,
}

/// Executes pipeline instances against a fixed deployment configuration.
#[derive(Clone)]
pub struct PipelineRunner {
    config: Arc<DeployConfig>,
    checkout: Arc<dyn CheckoutStage>,
    builder: Arc<dyn ImageBuilder>,
    authenticator: Arc<dyn RegistryAuthenticator>,
    publisher: Arc<dyn Publisher>,
}

impl PipelineRunner {
    pub fn new(
        config: DeployConfig,
        checkout: Arc<dyn CheckoutStage>,
        builder: Arc<dyn ImageBuilder>,
        authenticator: Arc<dyn RegistryAuthenticator>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            checkout,
            builder,
            authenticator,
            publisher,
        }
    }

    /// Start one pipeline instance for `event`. Returns a channel of
    /// progress events and a handle resolving to the final outcome. The
    /// credential is moved into the instance and dropped with it.
    pub fn execute(
        &self,
        event: PushEvent,
        credential: Credential,
    ) -> (mpsc::Receiver<RunEvent>, JoinHandle<RunOutcome>) {
        let (tx, rx) = mpsc::channel(32);
        let runner = self.clone();
        let handle = tokio::spawn(async move { runner.run(event, credential, tx).await });
        (rx, handle)
    }

    async fn run(
        self,
        event: PushEvent,
        credential: Credential,
        tx: mpsc::Sender<RunEvent>,
    ) -> RunOutcome {
        let run_id = RunId::new();
        info!(
            run_id = %run_id,
            repository = %event.repository_full_name,
            sha = %event.short_sha(),
            "Push event received"
        );

        started(&tx, run_id, FILTER, RunState::Filtering).await;
        if !event.qualifies(&self.config.trigger.branch) {
            info!(
                run_id = %run_id,
                branch = ?event.branch,
                configured = %self.config.trigger.branch,
                "Event does not qualify, pipeline returns to idle"
            );
            let _ = tx
                .send(RunEvent::RunCompleted {
                    run_id,
                    state: RunState::Idle,
                })
                .await;
            return RunOutcome {
                run_id,
                state: RunState::Idle,
                pushed: None,
                error: None,
            };
        }
        completed(&tx, run_id, FILTER).await;

        match self.run_stages(run_id, &event, &credential, &tx).await {
            Ok(image_ref) => {
                info!(run_id = %run_id, image = %image_ref, "Run succeeded");
                let _ = tx
                    .send(RunEvent::RunCompleted {
                        run_id,
                        state: RunState::Succeeded,
                    })
                    .await;
                RunOutcome {
                    run_id,
                    state: RunState::Succeeded,
                    pushed: Some(image_ref),
                    error: None,
                }
            }
            Err((stage, e)) => {
                error!(run_id = %run_id, stage, error = %e, "Run failed");
                let _ = tx
                    .send(RunEvent::RunCompleted {
                        run_id,
                        state: RunState::Failed,
                    })
                    .await;
                RunOutcome {
                    run_id,
                    state: RunState::Failed,
                    pushed: None,
                    error: Some(RunError {
                        stage,
                        message: e.to_string(),
                    }),
                }
            }
        }
    }

    /// Fail-fast stage sequence: the first stage error aborts the run
    /// with no publish.
    async fn run_stages(
        &self,
        run_id: RunId,
        event: &PushEvent,
        credential: &Credential,
        tx: &mpsc::Sender<RunEvent>,
    ) -> std::result::Result<String, (&'static str, Error)> {
        let timeouts = self.config.timeouts;
        let retry = self.config.retry;
        let host = &self.config.registry.host;

        // The publish target is fixed before any stage runs: the tag is
        // the triggering commit ref.
        let target = PublishTarget::for_commit(
            host,
            &self.config.registry.repository,
            event.commit_ref(),
        );
        let spec = BuildSpec {
            dockerfile: self.config.build.dockerfile.clone(),
            context: self.config.build.context.clone(),
        };

        started(tx, run_id, CHECKOUT, RunState::CheckingOut).await;
        let workspace = bounded(
            CHECKOUT,
            timeouts.checkout,
            self.checkout.materialize(event.commit_ref()),
        )
        .await
        .map_err(|e| (CHECKOUT, e))?;
        completed(tx, run_id, CHECKOUT).await;

        started(tx, run_id, BUILD, RunState::Building).await;
        let artifact = bounded(
            BUILD,
            timeouts.build,
            self.builder.build(&workspace, &spec, &target),
        )
        .await
        .map_err(|e| (BUILD, e))?;
        completed(tx, run_id, BUILD).await;

        started(tx, run_id, AUTHENTICATE, RunState::Authenticating).await;
        let session = retry_transient(&retry, || {
            bounded(
                AUTHENTICATE,
                timeouts.authenticate,
                self.authenticator.authenticate(host, credential),
            )
        })
        .await
        .map_err(|e| (AUTHENTICATE, e))?;
        completed(tx, run_id, AUTHENTICATE).await;

        started(tx, run_id, PUBLISH, RunState::Publishing).await;
        let result = retry_transient(&retry, || {
            bounded(
                PUBLISH,
                timeouts.publish,
                self.publisher.publish(&artifact, &target, &session),
            )
        })
        .await;

        let image_ref = match result {
            Ok(image_ref) => image_ref,
            Err(Error::Auth(reason)) => {
                // The session was rejected mid-upload (e.g. an expired
                // token). Re-establish it once and publish again; a
                // second rejection fails the run.
                warn!(run_id = %run_id, reason = %reason, "Session rejected during publish, re-authenticating");
                let session = retry_transient(&retry, || {
                    bounded(
                        AUTHENTICATE,
                        timeouts.authenticate,
                        self.authenticator.authenticate(host, credential),
                    )
                })
                .await
                .map_err(|e| (AUTHENTICATE, e))?;

                retry_transient(&retry, || {
                    bounded(
                        PUBLISH,
                        timeouts.publish,
                        self.publisher.publish(&artifact, &target, &session),
                    )
                })
                .await
                .map_err(|e| (PUBLISH, e))?
            }
            Err(e) => return Err((PUBLISH, e)),
        };
        completed(tx, run_id, PUBLISH).await;

        Ok(image_ref)
    }
}

/// Apply the stage's time bound: a stage that overruns fails the run
/// instead of hanging it.
async fn bounded<T>(
    stage: &'static str,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout { stage, limit }),
    }
}

async fn started(tx: &mpsc::Sender<RunEvent>, run_id: RunId, stage: &'static str, state: RunState) {
    debug!(run_id = %run_id, stage, "Stage started");
    let _ = tx
        .send(RunEvent::StageStarted {
            run_id,
            stage,
            state,
        })
        .await;
}

async fn completed(tx: &mpsc::Sender<RunEvent>, run_id: RunId, stage: &'static str) {
    debug!(run_id = %run_id, stage, "Stage completed");
    let _ = tx.send(RunEvent::StageCompleted { run_id, stage }).await;
}
