//! The `command` envelope payload (§4.1, §4.3-§4.6): one request variant
//! per operation the Domain Store, Session Registry, and Subscription
//! Multiplexer expose, plus the matching result union.

use serde::{Deserialize, Serialize};

use crate::cursor::Cursor;
use crate::signal::Signal;
use crate::types::{
    Controller, ControllerType, Conversation, Directory, DirectoryGitSnapshot, ProcessExit,
    Repository, Scope, Task,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    // Domain Store: directories
    #[serde(rename = "directory.upsert", rename_all = "camelCase")]
    DirectoryUpsert {
        #[serde(skip_serializing_if = "Option::is_none")]
        directory_id: Option<String>,
        #[serde(flatten)]
        scope: Scope,
        path: String,
    },
    #[serde(rename = "directory.list", rename_all = "camelCase")]
    DirectoryList {
        #[serde(flatten)]
        scope: Scope,
        #[serde(skip_serializing_if = "Option::is_none")]
        include_archived: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
    },
    #[serde(rename = "directory.archive", rename_all = "camelCase")]
    DirectoryArchive {
        directory_id: String,
    },
    #[serde(rename = "directory.git-status", rename_all = "camelCase")]
    DirectoryGitStatus {
        #[serde(flatten)]
        scope: Scope,
        #[serde(skip_serializing_if = "Option::is_none")]
        directory_id: Option<String>,
    },

    // Domain Store: repositories
    #[serde(rename = "repository.upsert", rename_all = "camelCase")]
    RepositoryUpsert {
        #[serde(skip_serializing_if = "Option::is_none")]
        repository_id: Option<String>,
        #[serde(flatten)]
        scope: Scope,
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        remote_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        default_branch: Option<String>,
    },
    #[serde(rename = "repository.get", rename_all = "camelCase")]
    RepositoryGet {
        repository_id: String,
    },
    #[serde(rename = "repository.list", rename_all = "camelCase")]
    RepositoryList {
        #[serde(flatten)]
        scope: Scope,
        #[serde(skip_serializing_if = "Option::is_none")]
        include_archived: Option<bool>,
    },
    #[serde(rename = "repository.update", rename_all = "camelCase")]
    RepositoryUpdate {
        repository_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        remote_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        default_branch: Option<String>,
    },
    #[serde(rename = "repository.archive", rename_all = "camelCase")]
    RepositoryArchive {
        repository_id: String,
    },

    // Domain Store: conversations
    #[serde(rename = "conversation.create", rename_all = "camelCase")]
    ConversationCreate {
        #[serde(skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
        directory_id: String,
        title: String,
        agent_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        adapter_state: Option<serde_json::Value>,
    },
    #[serde(rename = "conversation.update", rename_all = "camelCase")]
    ConversationUpdate {
        conversation_id: String,
        title: String,
    },
    #[serde(rename = "conversation.archive", rename_all = "camelCase")]
    ConversationArchive {
        conversation_id: String,
    },
    #[serde(rename = "conversation.delete", rename_all = "camelCase")]
    ConversationDelete {
        conversation_id: String,
    },

    // Domain Store: tasks
    #[serde(rename = "task.create", rename_all = "camelCase")]
    TaskCreate {
        #[serde(flatten)]
        scope: Scope,
        #[serde(skip_serializing_if = "Option::is_none")]
        repository_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        project_id: Option<String>,
        title: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    #[serde(rename = "task.ready", rename_all = "camelCase")]
    TaskReady { task_id: String },
    #[serde(rename = "task.draft", rename_all = "camelCase")]
    TaskDraft { task_id: String },
    #[serde(rename = "task.complete", rename_all = "camelCase")]
    TaskComplete { task_id: String },
    #[serde(rename = "task.reorder", rename_all = "camelCase")]
    TaskReorder {
        #[serde(flatten)]
        scope: Scope,
        ordered_task_ids: Vec<String>,
    },
    #[serde(rename = "task.claim", rename_all = "camelCase")]
    TaskClaim {
        task_id: String,
        controller_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        project_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        branch_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        base_branch: Option<String>,
    },
    #[serde(rename = "task.pull", rename_all = "camelCase")]
    TaskPull {
        #[serde(flatten)]
        scope: Scope,
        controller_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        project_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        repository_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        branch_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        base_branch: Option<String>,
    },

    // Session Registry & PTY Supervisor
    #[serde(rename = "pty.start", rename_all = "camelCase")]
    PtyStart {
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        conversation_id: String,
    },
    #[serde(rename = "pty.attach", rename_all = "camelCase")]
    PtyAttach {
        session_id: String,
        since_cursor: Option<Cursor>,
    },
    #[serde(rename = "pty.detach", rename_all = "camelCase")]
    PtyDetach {
        session_id: String,
    },
    #[serde(rename = "pty.close", rename_all = "camelCase")]
    PtyClose {
        session_id: String,
    },
    #[serde(rename = "pty.subscribe-events", rename_all = "camelCase")]
    PtySubscribeEvents {
        session_id: String,
    },
    #[serde(rename = "pty.unsubscribe-events", rename_all = "camelCase")]
    PtyUnsubscribeEvents {
        session_id: String,
    },
    #[serde(rename = "session.respond", rename_all = "camelCase")]
    SessionRespond {
        session_id: String,
        text: String,
    },
    #[serde(rename = "session.interrupt", rename_all = "camelCase")]
    SessionInterrupt {
        session_id: String,
    },
    #[serde(rename = "session.remove", rename_all = "camelCase")]
    SessionRemove {
        session_id: String,
    },
    #[serde(rename = "session.list", rename_all = "camelCase")]
    SessionList {
        #[serde(skip_serializing_if = "Option::is_none")]
        live: Option<bool>,
    },
    #[serde(rename = "session.status", rename_all = "camelCase")]
    SessionStatusQuery {
        session_id: String,
    },
    #[serde(rename = "session.claim", rename_all = "camelCase")]
    SessionClaim {
        session_id: String,
        controller_id: String,
        controller_type: ControllerType,
        #[serde(skip_serializing_if = "Option::is_none")]
        controller_label: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "is_false")]
        takeover: bool,
    },
    #[serde(rename = "session.release", rename_all = "camelCase")]
    SessionRelease {
        session_id: String,
    },

    // Subscription Multiplexer
    #[serde(rename = "stream.subscribe", rename_all = "camelCase")]
    StreamSubscribe {
        #[serde(flatten)]
        filter: SubscriptionFilter,
    },
    #[serde(rename = "stream.unsubscribe", rename_all = "camelCase")]
    StreamUnsubscribe {
        subscription_id: String,
    },
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionFilter {
    #[serde(flatten)]
    pub scope: Scope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub include_output: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_cursor: Option<Cursor>,
}

/// The `pty.input` / `pty.resize` / `pty.signal` envelopes are not
/// commands (§4.1: no `commandId`, no response). They are modeled
/// separately from `Command` since the envelope layer dispatches them
/// without going through the accepted/completed/failed cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PtyInput {
    pub session_id: String,
    pub data_base64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PtyResize {
    pub session_id: String,
    pub cols: u16,
    pub rows: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PtySignal {
    pub session_id: String,
    pub signal: Signal,
}

/// Result payload carried inside `command.completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandResult {
    Directory(Directory),
    DirectoryList(Vec<Directory>),
    DirectoryGitStatus(Vec<DirectoryGitSnapshot>),
    Repository(Repository),
    RepositoryList(Vec<Repository>),
    Conversation(Conversation),
    Task(Task),
    TaskReordered { tasks: Vec<Task> },
    TaskPullResult {
        #[serde(skip_serializing_if = "Option::is_none")]
        task: Option<Task>,
        #[serde(skip_serializing_if = "Option::is_none")]
        directory_id: Option<String>,
        availability: TaskPullAvailability,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        repository_id: Option<String>,
        /// The claimed task's repository's `metadata` (build/env hints a
        /// puller needs), empty when no repository is associated.
        #[serde(default, skip_serializing_if = "std::collections::HashMap::is_empty")]
        settings: std::collections::HashMap<String, String>,
    },
    PtyStarted {
        session_id: String,
        #[serde(skip_serializing_if = "is_false")]
        recovered_duplicate_start: bool,
    },
    PtyAttached {
        latest_cursor: Cursor,
        #[serde(skip_serializing_if = "is_false")]
        truncated: bool,
    },
    Ack { ok: bool },
    SessionResponded { responded: bool, sent_bytes: usize },
    SessionList { sessions: Vec<crate::types::Conversation> },
    SessionClaimed {
        session_id: String,
        action: SessionClaimAction,
        controller: Controller,
    },
    Unsubscribed { unsubscribed: bool },
    Subscribed { subscription_id: String, cursor: Cursor },
    Exit(ProcessExit),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskPullAvailability {
    Claimed,
    None,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionClaimAction {
    Claimed,
    TakenOver,
}
