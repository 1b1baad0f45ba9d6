//! Upload session state machine.

use serde::{Deserialize, Serialize};

/// State of a resumable upload session.
///
/// Transitions: `Initiated` → `Accumulating` on the first accepted part,
/// `Accumulating` → `Completing` when finalization starts. A session in
/// `Completing` accepts nothing further; successful completion deletes
/// the session outright. Completing straight from `Initiated` is illegal,
/// which makes "complete with zero parts" unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    /// The multipart upload exists but no part has been accepted yet.
    Initiated,
    /// At least one part has been committed.
    Accumulating,
    /// Finalization has started.
    Completing,
}

impl UploadState {
    /// Return the state as a string for document storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Accumulating => "accumulating",
            Self::Completing => "completing",
        }
    }

    /// Whether a part may be accepted in this state.
    pub fn can_accept_part(&self) -> bool {
        matches!(self, Self::Initiated | Self::Accumulating)
    }

    /// Whether finalization may start from this state.
    pub fn can_complete(&self) -> bool {
        matches!(self, Self::Accumulating)
    }
}

impl std::fmt::Display for UploadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
