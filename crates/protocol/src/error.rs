//! Error taxonomy (§7): every command-local failure is tagged with a kind
//! whose wire prefix is stable across protocol versions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Auth,
    InvalidArgument,
    NotFound,
    SessionNotLive,
    Conflict,
    PreconditionFailed,
    ShuttingDown,
    Internal,
}

impl ErrorKind {
    /// Stable wire prefix for this kind, per the §7 taxonomy table.
    pub fn prefix(self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth:",
            ErrorKind::InvalidArgument => "invalid:",
            ErrorKind::NotFound => "not-found:",
            ErrorKind::SessionNotLive => "session is not live",
            ErrorKind::Conflict => "conflict:",
            ErrorKind::PreconditionFailed => "precondition:",
            ErrorKind::ShuttingDown => "shutting-down:",
            ErrorKind::Internal => "internal:",
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{}", self.wire_message())]
pub struct WireError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl WireError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, detail)
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, detail)
    }

    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, detail)
    }

    pub fn precondition_failed(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::PreconditionFailed, detail)
    }

    pub fn session_not_live() -> Self {
        Self::new(ErrorKind::SessionNotLive, "session is not live")
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, detail)
    }

    /// Render the full wire string: `<prefix><detail>` (prefix already
    /// contains its own trailing separator, e.g. `not-found: session`).
    pub fn wire_message(&self) -> String {
        let prefix = self.kind.prefix();
        if self.detail.is_empty() {
            prefix.to_string()
        } else if prefix.ends_with(':') {
            format!("{} {}", prefix, self.detail)
        } else {
            format!("{}: {}", prefix, self.detail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_message_uses_stable_prefix() {
        let err = WireError::not_found("session not found");
        assert_eq!(err.wire_message(), "not-found: session not found");

        let err = WireError::session_not_live();
        assert_eq!(err.wire_message(), "session is not live");
    }
}
