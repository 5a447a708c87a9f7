//! The observed-event taxonomy (§3, §4.3, §4.5): one sum type, one
//! variant per entity mutation or session lifecycle transition, each
//! struct carrying only the fields that variant uses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    Conversation, Controller, Directory, DirectoryGitSnapshot, ProcessExit, Repository, Scope,
    StreamSessionStatusModel, Task,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    TakenOver,
    Released,
}

/// A record describing a mutation to the domain store or a session
/// lifecycle transition, delivered inside a `stream.event` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ObservedEvent {
    DirectoryUpserted { directory: Directory },
    DirectoryArchived { directory_id: String, scope: Scope, ts: DateTime<Utc> },
    DirectoryGitUpdated { snapshot: DirectoryGitSnapshot, scope: Scope },

    RepositoryUpserted { repository: Repository },
    RepositoryUpdated { repository: Repository },
    RepositoryArchived { repository_id: String, scope: Scope, ts: DateTime<Utc> },

    // `Conversation` carries no `scope` of its own (§3: it inherits its
    // parent directory's); these events carry the directory's scope
    // alongside it so the multiplexer can filter without a store lookup.
    ConversationCreated { conversation: Conversation, scope: Scope },
    ConversationUpdated { conversation: Conversation, scope: Scope },
    ConversationArchived { conversation_id: String, scope: Scope, ts: DateTime<Utc> },
    ConversationDeleted { conversation_id: String, scope: Scope, ts: DateTime<Utc> },

    TaskCreated { task: Task },
    TaskUpdated { task: Task },
    TaskReordered { tasks: Vec<Task> },

    SessionStatus {
        session_id: String,
        status: StreamSessionStatusModel,
    },
    SessionControl {
        session_id: String,
        action: ControlAction,
        controller: Controller,
        #[serde(skip_serializing_if = "Option::is_none")]
        previous_controller: Option<Controller>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    SessionExit {
        session_id: String,
        exit: ProcessExit,
    },
    SessionOutput {
        session_id: String,
        cursor: crate::cursor::Cursor,
        chunk_len: usize,
    },
}

impl ObservedEvent {
    /// The scope-relevant identifiers this event touches, used by the
    /// Subscription Multiplexer's filter matching (§4.5).
    pub fn directory_id(&self) -> Option<&str> {
        match self {
            ObservedEvent::DirectoryUpserted { directory } => Some(&directory.directory_id),
            ObservedEvent::DirectoryArchived { directory_id, .. } => Some(directory_id),
            ObservedEvent::DirectoryGitUpdated { snapshot, .. } => Some(&snapshot.directory_id),
            ObservedEvent::ConversationCreated { conversation, .. }
            | ObservedEvent::ConversationUpdated { conversation, .. } => {
                Some(&conversation.directory_id)
            }
            _ => None,
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            ObservedEvent::ConversationCreated { conversation, .. }
            | ObservedEvent::ConversationUpdated { conversation, .. } => {
                Some(&conversation.conversation_id)
            }
            ObservedEvent::ConversationArchived { conversation_id, .. }
            | ObservedEvent::ConversationDeleted { conversation_id, .. } => Some(conversation_id),
            ObservedEvent::SessionStatus { session_id, .. }
            | ObservedEvent::SessionControl { session_id, .. }
            | ObservedEvent::SessionExit { session_id, .. }
            | ObservedEvent::SessionOutput { session_id, .. } => Some(session_id),
            _ => None,
        }
    }

    pub fn repository_ids(&self) -> Vec<&str> {
        match self {
            ObservedEvent::DirectoryGitUpdated { snapshot, .. } => {
                snapshot.repository_id.as_deref().into_iter().collect()
            }
            ObservedEvent::RepositoryUpserted { repository }
            | ObservedEvent::RepositoryUpdated { repository } => {
                vec![repository.repository_id.as_str()]
            }
            ObservedEvent::RepositoryArchived { repository_id, .. } => {
                vec![repository_id.as_str()]
            }
            ObservedEvent::TaskCreated { task } | ObservedEvent::TaskUpdated { task } => {
                task.repository_id.as_deref().into_iter().collect()
            }
            ObservedEvent::TaskReordered { tasks } => {
                tasks.iter().filter_map(|t| t.repository_id.as_deref()).collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn task_ids(&self) -> Vec<&str> {
        match self {
            ObservedEvent::TaskCreated { task } | ObservedEvent::TaskUpdated { task } => {
                vec![task.task_id.as_str()]
            }
            ObservedEvent::TaskReordered { tasks } => {
                tasks.iter().map(|t| t.task_id.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }

    /// `session-output` events are excluded from delivery unless the
    /// subscription explicitly opted into `includeOutput`.
    pub fn is_session_output(&self) -> bool {
        matches!(self, ObservedEvent::SessionOutput { .. })
    }

    /// The (tenantId, userId, workspaceId) this event belongs to, for the
    /// Subscription Multiplexer's scope filter (§4.5). Session-lifecycle
    /// events carry no scope — a subscription filter has no session-level
    /// scoping concept, so these always pass scope filtering.
    pub fn scope(&self) -> Option<Scope> {
        match self {
            ObservedEvent::DirectoryUpserted { directory } => Some(directory.scope.clone()),
            ObservedEvent::DirectoryArchived { scope, .. } => Some(scope.clone()),
            ObservedEvent::DirectoryGitUpdated { scope, .. } => Some(scope.clone()),
            ObservedEvent::RepositoryUpserted { repository }
            | ObservedEvent::RepositoryUpdated { repository } => Some(repository.scope.clone()),
            ObservedEvent::RepositoryArchived { scope, .. } => Some(scope.clone()),
            ObservedEvent::ConversationCreated { scope, .. }
            | ObservedEvent::ConversationUpdated { scope, .. }
            | ObservedEvent::ConversationArchived { scope, .. }
            | ObservedEvent::ConversationDeleted { scope, .. } => Some(scope.clone()),
            ObservedEvent::TaskCreated { task } | ObservedEvent::TaskUpdated { task } => {
                Some(task.scope.clone())
            }
            ObservedEvent::TaskReordered { tasks } => tasks.first().map(|t| t.scope.clone()),
            ObservedEvent::SessionStatus { .. }
            | ObservedEvent::SessionControl { .. }
            | ObservedEvent::SessionExit { .. }
            | ObservedEvent::SessionOutput { .. } => None,
        }
    }
}
