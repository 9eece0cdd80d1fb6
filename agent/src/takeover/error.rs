// ─────────────────────────────────────────────────────────────
// takeover/error.rs – Takeover failure categories
// ─────────────────────────────────────────────────────────────
use thiserror::Error;

use super::os::{OsError, SessionId};

/// Why a takeover attempt failed. One variant per stage; the OS detail is
/// kept for logs only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TakeoverError {
    #[error("no {process} in session {session_id}")]
    NoTrustedProcess { session_id: SessionId, process: String },

    #[error("cannot enumerate processes: {0}")]
    ProcessEnumeration(OsError),

    #[error("token acquisition failed: {0}")]
    Token(OsError),

    #[error("process launch failed: {0}")]
    Launch(OsError),

    #[error("interactive session takeover is not supported on this platform")]
    Unsupported,
}

impl TakeoverError {
    /// Only token failures may be retried, and only from a fresh resolution:
    /// the session may have changed under us (a user just logged in).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Token(_))
    }

    pub fn is_resolution_failure(&self) -> bool {
        matches!(self, Self::NoTrustedProcess { .. } | Self::ProcessEnumeration(_))
    }

    /// Text shown to the operator.
    pub fn operator_message(&self) -> &'static str {
        if self.is_resolution_failure() {
            "cannot establish interactive session"
        } else {
            "remote control failed to start"
        }
    }

    pub fn os_error(&self) -> Option<&OsError> {
        match self {
            Self::ProcessEnumeration(e) | Self::Token(e) | Self::Launch(e) => Some(e),
            _ => None,
        }
    }
}
