//! `pty.signal` payloads: the three signal kinds the supervisor recognizes,
//! plus the `SIG[A-Z0-9]+(?:_[A-Z0-9]+)*` validator used for exit-signal names.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Interrupt,
    Eof,
    Terminate,
}

/// Validates a symbolic signal name like `SIGINT` or `SIGRTMIN_5` against
/// `^SIG[A-Z0-9]+(?:_[A-Z0-9]+)*$`.
pub fn is_valid_signal_name(name: &str) -> bool {
    let Some(rest) = name.strip_prefix("SIG") else {
        return false;
    };
    if rest.is_empty() {
        return false;
    }
    for segment in rest.split('_') {
        if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()) {
            return false;
        }
    }
    // first segment (directly after SIG, before any `_`) must be non-empty,
    // already guaranteed by the split/empty check above.
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_signal_names() {
        assert!(is_valid_signal_name("SIGINT"));
        assert!(is_valid_signal_name("SIGTERM"));
        assert!(is_valid_signal_name("SIGRTMIN_5"));
        assert!(is_valid_signal_name("SIG1"));
    }

    #[test]
    fn rejects_malformed_names() {
        assert!(!is_valid_signal_name("SIGint"));
        assert!(!is_valid_signal_name("TERM"));
        assert!(!is_valid_signal_name("SIG"));
        assert!(!is_valid_signal_name("SIG_"));
        assert!(!is_valid_signal_name("SIGTERM_"));
        assert!(!is_valid_signal_name(""));
    }
}
