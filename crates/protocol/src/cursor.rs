//! The cursor guard: a strictly monotonic per-subscription sequence number.
//!
//! The same guard is used on the server (per-subscription delivery order)
//! and on the client (projecting observed events into a synced snapshot),
//! so it lives here rather than in the registry crate — the ordering
//! contract is defined by this symmetry.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A strictly monotonic sequence number. Per-subscription for observed
/// events; per-session absolute byte position for PTY output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub i64);

impl Cursor {
    pub const ZERO: Cursor = Cursor(0);

    pub fn next(self) -> Cursor {
        Cursor(self.0 + 1)
    }
}

impl From<i64> for Cursor {
    fn from(v: i64) -> Self {
        Cursor(v)
    }
}

/// Result of `CursorGuard::observe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub accepted: bool,
    pub previous_cursor: Option<Cursor>,
}

/// Single-key cursor guard: `lastCursor: int|null`.
///
/// `observe(cursor)` accepts iff `lastCursor.is_none()` or `cursor >
/// lastCursor`. Rejected observations leave state untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorGuard {
    last: Option<Cursor>,
}

impl CursorGuard {
    pub fn new() -> Self {
        Self { last: None }
    }

    pub fn last_cursor(&self) -> Option<Cursor> {
        self.last
    }

    pub fn observe(&mut self, cursor: Cursor) -> Observation {
        let previous_cursor = self.last;
        let accepted = match self.last {
            None => true,
            Some(last) => cursor > last,
        };
        if accepted {
            self.last = Some(cursor);
        }
        Observation {
            accepted,
            previous_cursor,
        }
    }
}

/// Per-subscription cursor guards, keyed by subscription id. Progress on
/// one subscription never affects acceptance on another (tested property 5).
#[derive(Debug, Clone, Default)]
pub struct CursorStream {
    guards: HashMap<String, CursorGuard>,
}

impl CursorStream {
    pub fn new() -> Self {
        Self {
            guards: HashMap::new(),
        }
    }

    pub fn observe(&mut self, subscription_id: &str, cursor: Cursor) -> Observation {
        self.guards
            .entry(subscription_id.to_string())
            .or_default()
            .observe(cursor)
    }

    pub fn last_cursor(&self, subscription_id: &str) -> Option<Cursor> {
        self.guards.get(subscription_id).and_then(|g| g.last)
    }

    pub fn remove(&mut self, subscription_id: &str) {
        self.guards.remove(subscription_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_always_accepted() {
        let mut guard = CursorGuard::new();
        let obs = guard.observe(Cursor(5));
        assert!(obs.accepted);
        assert_eq!(obs.previous_cursor, None);
        assert_eq!(guard.last_cursor(), Some(Cursor(5)));
    }

    #[test]
    fn strictly_increasing_required() {
        let mut guard = CursorGuard::new();
        guard.observe(Cursor(10));
        guard.observe(Cursor(11));
        guard.observe(Cursor(12));

        let dup = guard.observe(Cursor(11));
        assert!(!dup.accepted);
        assert_eq!(dup.previous_cursor, Some(Cursor(12)));
        assert_eq!(guard.last_cursor(), Some(Cursor(12)));

        let regressed = guard.observe(Cursor(5));
        assert!(!regressed.accepted);
        assert_eq!(guard.last_cursor(), Some(Cursor(12)));
    }

    #[test]
    fn equal_cursor_rejected() {
        let mut guard = CursorGuard::new();
        guard.observe(Cursor(7));
        let obs = guard.observe(Cursor(7));
        assert!(!obs.accepted);
    }

    #[test]
    fn subscriptions_are_independent() {
        let mut stream = CursorStream::new();
        stream.observe("sub-a", Cursor(1));
        stream.observe("sub-a", Cursor(2));

        let obs_b = stream.observe("sub-b", Cursor(1));
        assert!(obs_b.accepted);
        assert_eq!(stream.last_cursor("sub-a"), Some(Cursor(2)));
    }
}
