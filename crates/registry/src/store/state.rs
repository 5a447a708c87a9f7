//! Plain in-memory snapshot of the Domain Store's entity tables (§3).
//! Deliberately free of any locking or IO — `transition` below is the only
//! thing that produces a new `StoreState`.

use std::collections::HashMap;

use harness_protocol::types::{Conversation, Directory, DirectoryGitSnapshot, Repository, Scope, Task};

#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub directories: HashMap<String, Directory>,
    pub repositories: HashMap<String, Repository>,
    pub conversations: HashMap<String, Conversation>,
    pub tasks: HashMap<String, Task>,
    pub git_snapshots: HashMap<String, DirectoryGitSnapshot>,
}

impl StoreState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory/repository list order: `createdAt` descending, then id
    /// lexicographic (§4.3).
    pub fn list_directories(&self, scope: &Scope, include_archived: bool, limit: Option<u32>) -> Vec<Directory> {
        let mut out: Vec<Directory> = self
            .directories
            .values()
            .filter(|d| scope.matches(&d.scope) && (include_archived || d.archived_at.is_none()))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.directory_id.cmp(&b.directory_id))
        });
        if let Some(limit) = limit {
            out.truncate(limit as usize);
        }
        out
    }

    pub fn list_repositories(&self, scope: &Scope, include_archived: bool) -> Vec<Repository> {
        let mut out: Vec<Repository> = self
            .repositories
            .values()
            .filter(|r| scope.matches(&r.scope) && (include_archived || r.archived_at.is_none()))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.repository_id.cmp(&b.repository_id))
        });
        out
    }

    /// Conversation list order: `lastEventAt` descending (null sorts after
    /// non-null), then `createdAt` desc, then id lex.
    pub fn list_conversations_in_directory(&self, directory_id: &str) -> Vec<Conversation> {
        let mut out: Vec<Conversation> = self
            .conversations
            .values()
            .filter(|c| c.directory_id == directory_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            match (a.last_event_at, b.last_event_at) {
                (Some(x), Some(y)) => y.cmp(&x),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.conversation_id.cmp(&b.conversation_id))
        });
        out
    }

    /// Task ordering: `orderIndex` ascending, then id lex.
    pub fn list_tasks_in_scope(&self, scope_kind_key: &str) -> Vec<Task> {
        let mut out: Vec<Task> = self
            .tasks
            .values()
            .filter(|t| task_scope_key(t) == scope_kind_key)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.order_index
                .cmp(&b.order_index)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        out
    }

    pub fn next_order_index(&self, scope_kind_key: &str) -> u32 {
        self.list_tasks_in_scope(scope_kind_key)
            .len()
            .try_into()
            .unwrap_or(u32::MAX)
    }
}

/// Groups tasks into a reorder/order-index scope: (scopeKind, repositoryId
/// or projectId). Global scope has no narrower key.
pub fn task_scope_key(task: &Task) -> String {
    match (&task.repository_id, &task.project_id) {
        (Some(r), _) => format!("repository:{r}"),
        (None, Some(p)) => format!("project:{p}"),
        (None, None) => "global".to_string(),
    }
}
