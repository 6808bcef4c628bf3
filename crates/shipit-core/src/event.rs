//! Push event types parsed from the hosting platform's webhook payload,
//! and the trigger filter that decides whether an event starts a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parsed push event data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEvent {
    pub r#ref: String,
    pub before: String,
    /// The commit sha at the head of the push. This is the ref the
    /// pipeline builds and the tag it publishes under.
    pub after: String,
    pub repository_full_name: String,
    pub branch: Option<String>,
    pub tag: Option<String>,
    pub head_commit: Option<CommitInfo>,
    pub pusher: String,
}

/// Commit information from a push event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub author: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl PushEvent {
    /// Parse a GitHub push webhook payload.
    pub fn from_github_payload(payload: &serde_json::Value) -> Option<Self> {
        let r#ref = payload.get("ref")?.as_str()?.to_string();
        let before = payload.get("before")?.as_str()?.to_string();
        let after = payload.get("after")?.as_str()?.to_string();
        let repository_full_name = payload
            .get("repository")?
            .get("full_name")?
            .as_str()?
            .to_string();

        let branch = r#ref
            .strip_prefix("refs/heads/")
            .map(|b| b.to_string());

        let tag = r#ref.strip_prefix("refs/tags/").map(|t| t.to_string());

        let head_commit = payload
            .get("head_commit")
            .and_then(CommitInfo::from_github_commit);

        let pusher = payload
            .get("pusher")
            .and_then(|p| p.get("name"))
            .and_then(|n| n.as_str())
            .unwrap_or("unknown")
            .to_string();

        Some(PushEvent {
            r#ref,
            before,
            after,
            repository_full_name,
            branch,
            tag,
            head_commit,
            pusher,
        })
    }

    /// The commit the pipeline materializes and tags.
    pub fn commit_ref(&self) -> &str {
        &self.after
    }

    /// Abbreviated sha for log lines. The payload is attacker-supplied,
    /// so truncation must respect char boundaries.
    pub fn short_sha(&self) -> &str {
        match self.after.char_indices().nth(7) {
            Some((idx, _)) => &self.after[..idx],
            None => &self.after,
        }
    }

    /// Trigger filter: the event qualifies iff it targets exactly the
    /// configured branch (case-sensitive). A mismatch is not an error;
    /// the pipeline simply does not run.
    pub fn qualifies(&self, configured_branch: &str) -> bool {
        self.branch.as_deref() == Some(configured_branch)
    }
}

impl CommitInfo {
    fn from_github_commit(value: &serde_json::Value) -> Option<Self> {
        Some(CommitInfo {
            sha: value.get("id")?.as_str()?.to_string(),
            message: value.get("message")?.as_str()?.to_string(),
            author: value
                .get("author")
                .and_then(|a| a.get("name"))
                .and_then(|n| n.as_str())
                .unwrap_or("unknown")
                .to_string(),
            timestamp: value
                .get("timestamp")
                .and_then(|t| t.as_str())
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_payload() -> serde_json::Value {
        json!({
            "ref": "refs/heads/main",
            "before": "0000000000000000000000000000000000000000",
            "after": "abc123def456abc123def456abc123def456abc1",
            "repository": { "full_name": "org/node" },
            "head_commit": {
                "id": "abc123def456abc123def456abc123def456abc1",
                "message": "fix startup crash",
                "author": { "name": "dev" },
                "timestamp": "2025-06-01T12:00:00Z"
            },
            "pusher": { "name": "dev" }
        })
    }

    #[test]
    fn test_parse_github_push_payload() {
        let event = PushEvent::from_github_payload(&sample_payload()).unwrap();
        assert_eq!(event.branch.as_deref(), Some("main"));
        assert_eq!(event.repository_full_name, "org/node");
        assert_eq!(event.pusher, "dev");
        assert_eq!(event.commit_ref(), "abc123def456abc123def456abc123def456abc1");
        assert_eq!(event.short_sha(), "abc123d");
        assert!(event.tag.is_none());

        let head = event.head_commit.unwrap();
        assert_eq!(head.message, "fix startup crash");
        assert_eq!(head.author, "dev");
    }

    #[test]
    fn test_short_sha_handles_non_ascii_after() {
        let mut payload = sample_payload();
        payload["after"] = json!("ééééé");
        let event = PushEvent::from_github_payload(&payload).unwrap();
        assert_eq!(event.short_sha(), "ééééé");

        payload["after"] = json!("ééééééééé");
        let event = PushEvent::from_github_payload(&payload).unwrap();
        assert_eq!(event.short_sha(), "ééééééé");
    }

    #[test]
    fn test_parse_tag_push() {
        let mut payload = sample_payload();
        payload["ref"] = json!("refs/tags/v1.2.0");

        let event = PushEvent::from_github_payload(&payload).unwrap();
        assert!(event.branch.is_none());
        assert_eq!(event.tag.as_deref(), Some("v1.2.0"));
    }

    #[test]
    fn test_missing_fields_return_none() {
        assert!(PushEvent::from_github_payload(&json!({})).is_none());
        assert!(PushEvent::from_github_payload(&json!({ "ref": "refs/heads/main" })).is_none());
    }

    #[test]
    fn test_trigger_filter_exact_branch_match() {
        let event = PushEvent::from_github_payload(&sample_payload()).unwrap();
        assert!(event.qualifies("main"));
        assert!(!event.qualifies("feature-x"));
        // Case-sensitive.
        assert!(!event.qualifies("Main"));
    }

    #[test]
    fn test_tag_pushes_never_qualify() {
        let mut payload = sample_payload();
        payload["ref"] = json!("refs/tags/main");

        let event = PushEvent::from_github_payload(&payload).unwrap();
        assert!(!event.qualifies("main"));
    }
}
