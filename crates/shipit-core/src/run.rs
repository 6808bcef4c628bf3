//! Run state machine.
//!
//! One state machine instance per qualifying push event. Terminal states
//! are never left; there is no resumption across runs.

use serde::{Deserialize, Serialize};

/// State of one pipeline instance:
/// `Idle -> Filtering -> CheckingOut -> Building -> Authenticating ->
/// Publishing -> {Succeeded | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// No qualifying event has started this instance.
    Idle,
    /// Deciding whether the event qualifies.
    Filtering,
    /// Materializing the repository tree.
    CheckingOut,
    /// Producing the image artifact.
    Building,
    /// Establishing the registry session.
    Authenticating,
    /// Uploading and tagging.
    Publishing,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Filtering => "filtering",
            RunState::CheckingOut => "checking_out",
            RunState::Building => "building",
            RunState::Authenticating => "authenticating",
            RunState::Publishing => "publishing",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
        };
        write!(f, "{name}")
    }
}
