//! The Domain Store (§4.3): directories, repositories, conversations, and
//! tasks, held in one `Mutex<StoreState>` so each mutation goes through a
//! single critical section. `transition` computes the new state and the
//! events to emit; the multiplexer fan-out happens after the lock is
//! released (design note §9).

mod state;
mod transition;

use std::sync::Mutex;

use chrono::Utc;
use harness_protocol::command::CommandResult;
use harness_protocol::error::WireError;
use harness_protocol::event::ObservedEvent;

pub use state::{task_scope_key, StoreState};
pub use transition::StoreOp;

pub struct DomainStore {
    state: Mutex<StoreState>,
}

impl DomainStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::new()),
        }
    }

    /// Seeds the store directly from a previously persisted snapshot,
    /// bypassing `transition` (and its event emission) entirely — used
    /// once at startup to rehydrate state without re-publishing every
    /// restored entity as a fresh observed event.
    pub fn restore(state: StoreState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Applies `op` inside the critical section and returns the events to
    /// fan out through the Subscription Multiplexer. Callers must not hold
    /// the multiplexer lock while calling this (lock ordering: store first).
    pub fn apply(&self, op: StoreOp) -> Result<(CommandResult, Vec<ObservedEvent>), WireError> {
        let mut guard = self.state.lock().expect("domain store mutex poisoned");
        let (next, result, events) = transition::transition(&guard, op, Utc::now())?;
        *guard = next;
        Ok((result, events))
    }

    /// Read-only snapshot access for query-only commands that don't need
    /// the full `transition` machinery (e.g. building a `directory.list`
    /// response from the current state without going through the lock
    /// twice).
    pub fn snapshot(&self) -> StoreState {
        self.state.lock().expect("domain store mutex poisoned").clone()
    }
}

impl Default for DomainStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harness_protocol::types::Scope;

    #[test]
    fn apply_and_snapshot_agree() {
        let store = DomainStore::new();
        store
            .apply(StoreOp::DirectoryUpsert {
                directory_id: Some("d1".into()),
                scope: Scope::default(),
                path: "/repo".into(),
            })
            .unwrap();
        assert_eq!(store.snapshot().directories.len(), 1);
    }

    #[test]
    fn not_found_leaves_state_untouched() {
        let store = DomainStore::new();
        let err = store
            .apply(StoreOp::DirectoryArchive {
                directory_id: "missing".into(),
            })
            .unwrap_err();
        assert_eq!(err.kind, harness_protocol::error::ErrorKind::NotFound);
        assert!(store.snapshot().directories.is_empty());
    }
}
