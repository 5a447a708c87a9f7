//! The client-side projection reducer (§9): a pure function
//! `(state, event) -> (state', changed)` wrapped with the cursor guard.
//! Included because it defines the server's ordering contract by
//! symmetry — the same `CursorGuard` enforced server-side for delivery
//! is enforced here for application, so a duplicate or regressed event
//! is a guaranteed no-op on both ends.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cursor::{Cursor, CursorGuard};
use crate::event::ObservedEvent;
use crate::types::{Conversation, Directory, Repository, Task};

/// The synced workspace snapshot a client reconstructs from observed
/// events. Wrapped in `Arc` so a no-op application can return the
/// identical pointer (tested property 4: duplicate/regressed events
/// return the exact same state object).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncedSnapshot {
    pub directories: HashMap<String, Directory>,
    pub repositories: HashMap<String, Repository>,
    pub conversations: HashMap<String, Conversation>,
    pub tasks: HashMap<String, Task>,
}

impl SyncedSnapshot {
    pub fn apply_event(&self, event: &ObservedEvent) -> SyncedSnapshot {
        let mut next = self.clone();
        match event {
            ObservedEvent::DirectoryUpserted { directory } => {
                next.directories
                    .insert(directory.directory_id.clone(), directory.clone());
            }
            ObservedEvent::DirectoryArchived { directory_id, ts, .. } => {
                if let Some(dir) = next.directories.get_mut(directory_id) {
                    dir.archived_at = Some(*ts);
                }
            }
            ObservedEvent::DirectoryGitUpdated { .. } => {
                // Git snapshots are tracked by a separate collaborator view;
                // the synced entity snapshot itself is unaffected.
            }
            ObservedEvent::RepositoryUpserted { repository }
            | ObservedEvent::RepositoryUpdated { repository } => {
                next.repositories
                    .insert(repository.repository_id.clone(), repository.clone());
            }
            ObservedEvent::RepositoryArchived { repository_id, ts, .. } => {
                if let Some(repo) = next.repositories.get_mut(repository_id) {
                    repo.archived_at = Some(*ts);
                }
            }
            ObservedEvent::ConversationCreated { conversation, .. }
            | ObservedEvent::ConversationUpdated { conversation, .. } => {
                next.conversations
                    .insert(conversation.conversation_id.clone(), conversation.clone());
            }
            ObservedEvent::ConversationArchived { conversation_id, ts, .. } => {
                if let Some(conv) = next.conversations.get_mut(conversation_id) {
                    conv.archived_at = Some(*ts);
                }
            }
            ObservedEvent::ConversationDeleted { conversation_id, .. } => {
                next.conversations.remove(conversation_id);
            }
            ObservedEvent::TaskCreated { task } | ObservedEvent::TaskUpdated { task } => {
                next.tasks.insert(task.task_id.clone(), task.clone());
            }
            ObservedEvent::TaskReordered { tasks } => {
                for task in tasks {
                    next.tasks.insert(task.task_id.clone(), task.clone());
                }
            }
            ObservedEvent::SessionStatus { .. }
            | ObservedEvent::SessionControl { .. }
            | ObservedEvent::SessionExit { .. }
            | ObservedEvent::SessionOutput { .. } => {
                // Session runtime events are applied to the Session Registry's
                // own client-side mirror, not the entity snapshot.
            }
        }
        next
    }
}

/// Wraps `SyncedSnapshot::apply_event` with the per-subscription cursor
/// guard. Returns the previous `Arc` unchanged on a duplicate/regressed
/// cursor so callers can do pointer-equality change detection.
pub struct Projector {
    guard: CursorGuard,
    state: Arc<SyncedSnapshot>,
}

impl Projector {
    pub fn new() -> Self {
        Self {
            guard: CursorGuard::new(),
            state: Arc::new(SyncedSnapshot::default()),
        }
    }

    pub fn state(&self) -> &Arc<SyncedSnapshot> {
        &self.state
    }

    /// Applies `(cursor, event)`; returns `(state, changed)` where
    /// `changed` is false iff the cursor was a duplicate/regression, in
    /// which case `state` is the identical `Arc` as before the call.
    pub fn apply(&mut self, cursor: Cursor, event: &ObservedEvent) -> (Arc<SyncedSnapshot>, bool) {
        let observation = self.guard.observe(cursor);
        if !observation.accepted {
            return (self.state.clone(), false);
        }
        self.state = Arc::new(self.state.apply_event(event));
        (self.state.clone(), true)
    }
}

impl Default for Projector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_directory(id: &str) -> Directory {
        Directory {
            directory_id: id.to_string(),
            scope: Default::default(),
            path: format!("/repos/{id}"),
            repository_id: None,
            created_at: Utc::now(),
            archived_at: None,
        }
    }

    #[test]
    fn duplicate_cursor_is_a_no_op_returning_identical_state() {
        let mut projector = Projector::new();
        let event = ObservedEvent::DirectoryUpserted {
            directory: sample_directory("d1"),
        };

        let (first, changed) = projector.apply(Cursor(10), &event);
        assert!(changed);

        let (second, changed) = projector.apply(Cursor(10), &event);
        assert!(!changed);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn idempotence_matches_first_application_snapshot() {
        let mut projector = Projector::new();
        let event = ObservedEvent::DirectoryUpserted {
            directory: sample_directory("d1"),
        };
        let (after_first, _) = projector.apply(Cursor(1), &event);
        let (after_replay, _) = projector.apply(Cursor(1), &event);
        assert_eq!(*after_first, *after_replay);
    }

    #[test]
    fn cursor_replay_scenario_b_from_spec() {
        let mut projector = Projector::new();
        let e10 = ObservedEvent::DirectoryUpserted {
            directory: sample_directory("a"),
        };
        let e11 = ObservedEvent::DirectoryUpserted {
            directory: sample_directory("b"),
        };
        let e12 = ObservedEvent::DirectoryUpserted {
            directory: sample_directory("c"),
        };

        projector.apply(Cursor(10), &e10);
        projector.apply(Cursor(11), &e11);
        let (after_12, _) = projector.apply(Cursor(12), &e12);

        let (replayed, changed) = projector.apply(Cursor(11), &e11);
        assert!(!changed);
        assert_eq!(*replayed, *after_12);
    }
}
