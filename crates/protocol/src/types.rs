//! Domain entities shared by the store, the registry, and the wire
//! protocol (§3). Field names are `camelCase` on the wire to match the
//! literal envelopes in §8's end-to-end scenarios; Rust-side names stay
//! `snake_case`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The (tenantId, userId, workspaceId) triple that partitions the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
}

impl Scope {
    /// Whether every scope field this scope sets also matches `other`.
    /// An empty field on `self` is treated as "don't care".
    pub fn matches(&self, other: &Scope) -> bool {
        matches_field(&self.tenant_id, &other.tenant_id)
            && matches_field(&self.user_id, &other.user_id)
            && matches_field(&self.workspace_id, &other.workspace_id)
    }
}

fn matches_field(want: &Option<String>, have: &Option<String>) -> bool {
    match want {
        None => true,
        Some(w) => have.as_deref() == Some(w.as_str()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directory {
    pub directory_id: String,
    #[serde(flatten)]
    pub scope: Scope,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub repository_id: String,
    #[serde(flatten)]
    pub scope: Scope,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_branch: Option<String>,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoCommitSummary {
    pub sha: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryGitSnapshot {
    pub directory_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_id: Option<String>,
    pub branch: String,
    pub additions: u64,
    pub deletions: u64,
    pub changed_files: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    pub commits: Vec<RepoCommitSummary>,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeStatus {
    Running,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub conversation_id: String,
    pub directory_id: String,
    pub title: String,
    pub agent_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapter_state: Option<serde_json::Value>,
    pub runtime_status: RuntimeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_status_model: Option<StreamSessionStatusModel>,
    pub runtime_live: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_last_exit: Option<ProcessExit>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskScopeKind {
    Global,
    Repository,
    Project,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Draft,
    Ready,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerType {
    Human,
    Agent,
    Automation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Controller {
    pub controller_id: String,
    pub controller_type: ControllerType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller_label: Option<String>,
    pub claimed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: String,
    #[serde(flatten)]
    pub scope: Scope,
    pub scope_kind: TaskScopeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub order_index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_by_controller: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_by_project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linear_issue_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Output of the Status Reducer collaborator (§4.4, §9). The core never
/// parses the telemetry this is derived from; it only stores and relays
/// whatever the collaborator returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSessionStatusModel {
    pub runtime_status: WorkPhase,
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glyph: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attention_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_known_work: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_known_work_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_hint: Option<String>,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkPhase {
    Spawning,
    Running,
    NeedsInput,
    Working,
    Idle,
    Exited,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessExit {
    pub code: Option<i32>,
    pub signal: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_matches_is_subset_based() {
        let want = Scope {
            tenant_id: Some("t1".into()),
            user_id: None,
            workspace_id: None,
        };
        let have = Scope {
            tenant_id: Some("t1".into()),
            user_id: Some("u1".into()),
            workspace_id: Some("w1".into()),
        };
        assert!(want.matches(&have));

        let mismatched = Scope {
            tenant_id: Some("t2".into()),
            ..Default::default()
        };
        assert!(!mismatched.matches(&have));
    }
}
