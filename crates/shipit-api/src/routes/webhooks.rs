//! Webhook endpoints for the git hosting provider.

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, error, info, warn};

use crate::AppState;
use crate::error::ApiError;
use shipit_core::event::PushEvent;
use shipit_core::secret::Credential;

pub fn router() -> Router<AppState> {
    Router::new().route("/github", post(github_webhook))
}

/// Handle GitHub webhook events.
async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let event_type = headers
        .get("X-GitHub-Event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    let signature = headers
        .get("X-Hub-Signature-256")
        .and_then(|v| v.to_str().ok());

    // Signature check comes first: an unverified body is never parsed.
    if let Some(secret) = &state.webhook_secret {
        if !verify_github_signature(secret, &body, signature) {
            warn!(event = %event_type, "Invalid webhook signature");
            return Err(ApiError::Unauthorized(
                "invalid webhook signature".to_string(),
            ));
        }
    }

    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))?;

    match event_type {
        "push" => {
            let Some(event) = PushEvent::from_github_payload(&payload) else {
                return Err(ApiError::BadRequest("malformed push payload".to_string()));
            };
            dispatch_push_event(&state, event)?;
            Ok(StatusCode::ACCEPTED)
        }
        "ping" => {
            info!("Ping event received, webhook is configured correctly");
            Ok(StatusCode::OK)
        }
        other => {
            info!(event = %other, "Ignoring event type");
            Ok(StatusCode::OK)
        }
    }
}

/// Hand a push event to a detached pipeline instance. The delivery is
/// acknowledged immediately; the run reports through its event stream.
fn dispatch_push_event(state: &AppState, event: PushEvent) -> Result<(), ApiError> {
    // The credential is read fresh for each run and dropped with it.
    let credential = Credential::from_env()?;

    info!(
        repository = %event.repository_full_name,
        branch = ?event.branch,
        sha = %event.short_sha(),
        "Dispatching push event"
    );

    let (mut events, handle) = state.runner.execute(event, credential);
    tokio::spawn(async move {
        while let Some(progress) = events.recv().await {
            debug!(?progress, "Run progress");
        }
        match handle.await {
            Ok(outcome) => info!(
                run_id = %outcome.run_id,
                state = %outcome.state,
                pushed = ?outcome.pushed,
                "Run finished"
            ),
            Err(e) => error!(error = %e, "Run task panicked"),
        }
    });

    Ok(())
}

/// Verify a GitHub webhook signature ("sha256=<hex>" over the raw body).
fn verify_github_signature(secret: &str, body: &[u8], signature: Option<&str>) -> bool {
    let Some(signature) = signature else {
        return false;
    };

    let Some(sig_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let Ok(sig_bytes) = hex::decode(sig_hex) else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    mac.verify_slice(&sig_bytes).is_ok()
}
