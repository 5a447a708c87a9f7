//! Command dispatch (§4.3-§4.6): translates a decoded `Command` into calls
//! against the Domain Store, the Session Registry, and the Subscription
//! Multiplexer, and assembles the matching `CommandResult`.
//!
//! Domain Store mutations return their own event batch straight from
//! `transition` and are published here, outside the store's lock, per the
//! design note in `store/mod.rs`. Session Registry operations are not
//! store mutations — they publish their own synthetic `ObservedEvent`s
//! (`session-control`, `session-exit`) so `stream.subscribe`rs see session
//! lifecycle the same way they see directory/task changes.

use std::sync::Arc;

use chrono::Utc;
use harness_protocol::command::{Command, CommandResult, SessionClaimAction};
use harness_protocol::error::WireError;
use harness_protocol::event::{ControlAction, ObservedEvent};
use harness_protocol::types::{Controller, RuntimeStatus};
use harness_registry::session::pty::{LaunchSpec, ProcessLauncher, ShellLauncher};
use harness_registry::store::{task_scope_key, StoreOp};
use harness_registry::{DomainStore, SessionRegistry, SubscriptionMultiplexer};
use tokio::sync::mpsc;
use tracing::warn;

use crate::persistence::PersistCommand;

/// What a Domain Store mutation should write back to disk once its
/// critical section has released, identified by id rather than by
/// `CommandResult` shape so archive/delete operations (which answer with
/// a bare `Ack`) still persist correctly.
enum PersistTarget {
    Directory(String),
    Repository(String),
    Conversation(String),
    ConversationDeleted(String),
    Task(String),
    Tasks(Vec<String>),
}

pub struct Dispatcher {
    pub store: Arc<DomainStore>,
    pub sessions: Arc<SessionRegistry>,
    pub multiplexer: Arc<SubscriptionMultiplexer>,
    pub launcher: Arc<dyn ProcessLauncher>,
    persist_tx: mpsc::Sender<PersistCommand>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<DomainStore>,
        sessions: Arc<SessionRegistry>,
        multiplexer: Arc<SubscriptionMultiplexer>,
        persist_tx: mpsc::Sender<PersistCommand>,
    ) -> Self {
        Self {
            store,
            sessions,
            multiplexer,
            launcher: Arc::new(ShellLauncher),
            persist_tx,
        }
    }

    pub async fn dispatch(&self, command: Command) -> Result<CommandResult, WireError> {
        match command {
            // --- Domain Store: directories ---
            Command::DirectoryUpsert { directory_id, scope, path } => {
                let result = self.apply_store(StoreOp::DirectoryUpsert { directory_id, scope, path })?;
                if let CommandResult::Directory(d) = &result {
                    self.persist(PersistTarget::Directory(d.directory_id.clone()));
                }
                Ok(result)
            }
            Command::DirectoryList {
                scope,
                include_archived,
                limit,
            } => self.apply_store(StoreOp::DirectoryList {
                scope,
                include_archived: include_archived.unwrap_or(false),
                limit,
            }),
            Command::DirectoryArchive { directory_id } => {
                let result = self.apply_store(StoreOp::DirectoryArchive { directory_id: directory_id.clone() })?;
                self.persist(PersistTarget::Directory(directory_id));
                Ok(result)
            }
            Command::DirectoryGitStatus { scope, directory_id } => {
                self.apply_store(StoreOp::DirectoryGitStatus { scope, directory_id })
            }

            // --- Domain Store: repositories ---
            Command::RepositoryUpsert {
                repository_id,
                scope,
                name,
                remote_url,
                default_branch,
            } => {
                let result = self.apply_store(StoreOp::RepositoryUpsert {
                    repository_id,
                    scope,
                    name,
                    remote_url,
                    default_branch,
                })?;
                if let CommandResult::Repository(r) = &result {
                    self.persist(PersistTarget::Repository(r.repository_id.clone()));
                }
                Ok(result)
            }
            Command::RepositoryGet { repository_id } => {
                self.apply_store(StoreOp::RepositoryGet { repository_id })
            }
            Command::RepositoryList { scope, include_archived } => self.apply_store(StoreOp::RepositoryList {
                scope,
                include_archived: include_archived.unwrap_or(false),
            }),
            Command::RepositoryUpdate {
                repository_id,
                name,
                remote_url,
                default_branch,
            } => {
                let result = self.apply_store(StoreOp::RepositoryUpdate {
                    repository_id: repository_id.clone(),
                    name,
                    remote_url,
                    default_branch,
                })?;
                self.persist(PersistTarget::Repository(repository_id));
                Ok(result)
            }
            Command::RepositoryArchive { repository_id } => {
                let result = self.apply_store(StoreOp::RepositoryArchive { repository_id: repository_id.clone() })?;
                self.persist(PersistTarget::Repository(repository_id));
                Ok(result)
            }

            // --- Domain Store: conversations ---
            Command::ConversationCreate {
                conversation_id,
                directory_id,
                title,
                agent_type,
                adapter_state,
            } => {
                let result = self.apply_store(StoreOp::ConversationCreate {
                    conversation_id,
                    directory_id,
                    title,
                    agent_type,
                    adapter_state,
                    has_live_pty: false,
                })?;
                if let CommandResult::Conversation(c) = &result {
                    self.persist(PersistTarget::Conversation(c.conversation_id.clone()));
                }
                Ok(result)
            }
            Command::ConversationUpdate { conversation_id, title } => {
                let result = self.apply_store(StoreOp::ConversationUpdate {
                    conversation_id: conversation_id.clone(),
                    title,
                })?;
                self.persist(PersistTarget::Conversation(conversation_id));
                Ok(result)
            }
            Command::ConversationArchive { conversation_id } => {
                let result = self.apply_store(StoreOp::ConversationArchive { conversation_id: conversation_id.clone() })?;
                self.persist(PersistTarget::Conversation(conversation_id));
                Ok(result)
            }
            Command::ConversationDelete { conversation_id } => {
                let result = self.apply_store(StoreOp::ConversationDelete { conversation_id: conversation_id.clone() })?;
                self.persist(PersistTarget::ConversationDeleted(conversation_id));
                Ok(result)
            }

            // --- Domain Store: tasks ---
            Command::TaskCreate {
                scope,
                repository_id,
                project_id,
                title,
                description,
            } => {
                let result = self.apply_store(StoreOp::TaskCreate {
                    scope,
                    repository_id,
                    project_id,
                    title,
                    description,
                })?;
                if let CommandResult::Task(t) = &result {
                    self.persist(PersistTarget::Task(t.task_id.clone()));
                }
                Ok(result)
            }
            Command::TaskReady { task_id } => self.apply_store_task(StoreOp::TaskReady { task_id: task_id.clone() }, task_id),
            Command::TaskDraft { task_id } => self.apply_store_task(StoreOp::TaskDraft { task_id: task_id.clone() }, task_id),
            Command::TaskComplete { task_id } => self.apply_store_task(StoreOp::TaskComplete { task_id: task_id.clone() }, task_id),
            Command::TaskReorder { scope: _, ordered_task_ids } => {
                let scope_kind_key = self.scope_key_for_tasks(&ordered_task_ids)?;
                let result = self.apply_store(StoreOp::TaskReorder {
                    scope_kind_key,
                    ordered_task_ids: ordered_task_ids.clone(),
                })?;
                self.persist(PersistTarget::Tasks(ordered_task_ids));
                Ok(result)
            }
            Command::TaskClaim {
                task_id,
                controller_id,
                project_id,
                branch_name,
                base_branch,
            } => self.apply_store_task(
                StoreOp::TaskClaim {
                    task_id: task_id.clone(),
                    controller_id,
                    project_id,
                    branch_name,
                    base_branch,
                },
                task_id,
            ),
            Command::TaskPull {
                scope,
                controller_id,
                project_id,
                repository_id,
                branch_name,
                base_branch,
            } => {
                let result = self.apply_store(StoreOp::TaskPull {
                    scope,
                    controller_id,
                    project_id,
                    repository_id,
                    branch_name,
                    base_branch,
                })?;
                if let CommandResult::TaskPullResult { task: Some(t), .. } = &result {
                    self.persist(PersistTarget::Task(t.task_id.clone()));
                }
                Ok(result)
            }

            // --- Session Registry & PTY Supervisor ---
            Command::PtyStart { session_id, conversation_id } => {
                self.pty_start(session_id, conversation_id).await
            }
            Command::PtyAttach { session_id, since_cursor } => {
                let result = self.sessions.attach(&session_id, since_cursor.map(|c| c.0)).await?;
                Ok(CommandResult::PtyAttached {
                    latest_cursor: harness_protocol::cursor::Cursor(result.latest_cursor),
                    truncated: result.truncated,
                })
            }
            Command::PtyDetach { session_id } => {
                self.sessions.detach(&session_id)?;
                Ok(CommandResult::Ack { ok: true })
            }
            Command::PtyClose { session_id } => {
                let exit = self.sessions.close(&session_id).await?;
                self.multiplexer.publish(&[ObservedEvent::SessionExit {
                    session_id,
                    exit: exit.clone(),
                }]);
                Ok(CommandResult::Exit(exit))
            }
            Command::PtySubscribeEvents { session_id } => {
                self.sessions.subscribe_events(&session_id).await?;
                Ok(CommandResult::Ack { ok: true })
            }
            Command::PtyUnsubscribeEvents { session_id } => {
                self.sessions.unsubscribe_events(&session_id)?;
                Ok(CommandResult::Ack { ok: true })
            }
            Command::SessionRespond { session_id, text } => {
                let sent_bytes = self.sessions.respond(&session_id, text).await?;
                Ok(CommandResult::SessionResponded {
                    responded: true,
                    sent_bytes,
                })
            }
            Command::SessionInterrupt { session_id } => {
                self.sessions.interrupt(&session_id).await?;
                Ok(CommandResult::Ack { ok: true })
            }
            Command::SessionRemove { session_id } => {
                let exit = self.sessions.remove(&session_id).await?;
                self.multiplexer.publish(&[ObservedEvent::SessionExit {
                    session_id,
                    exit: exit.clone(),
                }]);
                Ok(CommandResult::Exit(exit))
            }
            Command::SessionList { live } => self.session_list(live),
            Command::SessionStatusQuery { session_id } => self.session_status_query(&session_id),
            Command::SessionClaim {
                session_id,
                controller_id,
                controller_type,
                controller_label,
                reason,
                takeover,
            } => {
                self.session_claim(session_id, controller_id, controller_type, controller_label, reason, takeover)
                    .await
            }
            Command::SessionRelease { session_id } => self.session_release(session_id).await,

            // --- Subscription Multiplexer ---
            Command::StreamSubscribe { filter } => {
                let (subscription_id, cursor, _truncated, _rx) = self.multiplexer.subscribe(filter);
                Ok(CommandResult::Subscribed { subscription_id, cursor })
            }
            Command::StreamUnsubscribe { subscription_id } => {
                let unsubscribed = self.multiplexer.unsubscribe(&subscription_id);
                Ok(CommandResult::Unsubscribed { unsubscribed })
            }
        }
    }

    fn apply_store(&self, op: StoreOp) -> Result<CommandResult, WireError> {
        let (result, events) = self.store.apply(op)?;
        if !events.is_empty() {
            self.multiplexer.publish(&events);
        }
        Ok(result)
    }

    /// Convenience for the common task ops, which already know their
    /// `task_id` before calling `apply_store` and always persist the same entity.
    fn apply_store_task(&self, op: StoreOp, task_id: String) -> Result<CommandResult, WireError> {
        let result = self.apply_store(op)?;
        self.persist(PersistTarget::Task(task_id));
        Ok(result)
    }

    /// Re-reads the target entity from the just-mutated snapshot and
    /// forwards it to the persistence writer. Uses `try_send` so a backed
    /// up persistence channel never stalls command dispatch; failures are
    /// logged, not propagated, since the in-memory store is already the
    /// source of truth for the running process.
    fn persist(&self, target: PersistTarget) {
        let snapshot = self.store.snapshot();

        let cmd = match target {
            PersistTarget::Directory(id) => snapshot.directories.get(&id).cloned().map(PersistCommand::DirectoryUpsert),
            PersistTarget::Repository(id) => snapshot.repositories.get(&id).cloned().map(PersistCommand::RepositoryUpsert),
            PersistTarget::Conversation(id) => snapshot
                .conversations
                .get(&id)
                .cloned()
                .map(PersistCommand::ConversationUpsert),
            PersistTarget::ConversationDeleted(conversation_id) => {
                Some(PersistCommand::ConversationDelete { conversation_id })
            }
            PersistTarget::Task(id) => snapshot.tasks.get(&id).cloned().map(PersistCommand::TaskUpsert),
            PersistTarget::Tasks(ids) => {
                for id in ids {
                    if let Some(task) = snapshot.tasks.get(&id).cloned() {
                        self.send_persist(PersistCommand::TaskUpsert(task));
                    }
                }
                return;
            }
        };

        if let Some(cmd) = cmd {
            self.send_persist(cmd);
        }
    }

    fn send_persist(&self, cmd: PersistCommand) {
        if let Err(err) = self.persist_tx.try_send(cmd) {
            warn!(
                component = "dispatch",
                event = "dispatch.persist_dropped",
                error = %err,
                "Dropped a persistence write — channel full or closed"
            );
        }
    }

    fn scope_key_for_tasks(&self, ordered_task_ids: &[String]) -> Result<String, WireError> {
        let snapshot = self.store.snapshot();
        let first_id = ordered_task_ids
            .first()
            .ok_or_else(|| WireError::invalid_argument("orderedTaskIds must not be empty"))?;
        let task = snapshot
            .tasks
            .get(first_id)
            .ok_or_else(|| WireError::not_found("task not found"))?;
        Ok(task_scope_key(task))
    }

    async fn pty_start(&self, session_id: Option<String>, conversation_id: String) -> Result<CommandResult, WireError> {
        let snapshot = self.store.snapshot();
        let conversation = snapshot
            .conversations
            .get(&conversation_id)
            .cloned()
            .ok_or_else(|| WireError::not_found("conversation not found"))?;
        let directory_path = snapshot
            .directories
            .get(&conversation.directory_id)
            .map(|d| d.path.clone())
            .unwrap_or_else(|| ".".to_string());

        let spec: LaunchSpec = self.launcher.launch_spec(&conversation, &directory_path);
        let (session_id, recovered_duplicate_start) =
            self.sessions.start(session_id, conversation_id.clone(), spec).await?;

        if !recovered_duplicate_start {
            self.apply_store(StoreOp::ConversationUpdate {
                conversation_id: conversation_id.clone(),
                title: conversation.title,
            })?;
            self.persist(PersistTarget::Conversation(conversation_id));
        }

        Ok(CommandResult::PtyStarted {
            session_id,
            recovered_duplicate_start,
        })
    }

    /// `session.list`: Domain Store conversations enriched with live
    /// Session Registry runtime state, joined on `conversationId` (§13 —
    /// `CommandResult::SessionList` carries `Conversation`s, not bare
    /// session snapshots, precisely so this enrichment has somewhere to
    /// live).
    fn session_list(&self, live: Option<bool>) -> Result<CommandResult, WireError> {
        let snapshot = self.store.snapshot();
        let running = self.sessions.list(None);
        let mut sessions: Vec<_> = snapshot.conversations.values().cloned().collect();

        for conversation in sessions.iter_mut() {
            match running.iter().find(|s| s.conversation_id == conversation.conversation_id) {
                Some(session_snapshot) => {
                    conversation.runtime_live = session_snapshot.live;
                    conversation.runtime_status_model = session_snapshot.status.clone();
                    conversation.runtime_last_exit = session_snapshot.last_exit.clone();
                    conversation.runtime_status = if session_snapshot.live {
                        RuntimeStatus::Running
                    } else {
                        RuntimeStatus::Completed
                    };
                }
                None => conversation.runtime_live = false,
            }
        }

        if let Some(want_live) = live {
            sessions.retain(|c| c.runtime_live == want_live);
        }

        Ok(CommandResult::SessionList { sessions })
    }

    fn session_status_query(&self, session_id: &str) -> Result<CommandResult, WireError> {
        let session_snapshot = self.sessions.status(session_id)?;
        let store_snapshot = self.store.snapshot();
        let mut conversation = store_snapshot
            .conversations
            .get(&session_snapshot.conversation_id)
            .cloned()
            .ok_or_else(|| WireError::not_found("conversation not found for session"))?;

        conversation.runtime_live = session_snapshot.live;
        conversation.runtime_status_model = session_snapshot.status.clone();
        conversation.runtime_last_exit = session_snapshot.last_exit.clone();
        conversation.runtime_status = if session_snapshot.live {
            RuntimeStatus::Running
        } else {
            RuntimeStatus::Completed
        };

        Ok(CommandResult::Conversation(conversation))
    }

    async fn session_claim(
        &self,
        session_id: String,
        controller_id: String,
        controller_type: harness_protocol::types::ControllerType,
        controller_label: Option<String>,
        reason: Option<String>,
        takeover: bool,
    ) -> Result<CommandResult, WireError> {
        let controller = Controller {
            controller_id,
            controller_type,
            controller_label,
            claimed_at: Utc::now(),
        };
        let outcome = self
            .sessions
            .claim(&session_id, controller.clone(), takeover, reason.clone())
            .await?;

        let action = if outcome.taken_over {
            SessionClaimAction::TakenOver
        } else {
            SessionClaimAction::Claimed
        };

        if outcome.taken_over {
            self.multiplexer.publish(&[ObservedEvent::SessionControl {
                session_id: session_id.clone(),
                action: ControlAction::TakenOver,
                controller: controller.clone(),
                previous_controller: outcome.previous_controller,
                reason,
            }]);
        }

        Ok(CommandResult::SessionClaimed {
            session_id,
            action,
            controller,
        })
    }

    async fn session_release(&self, session_id: String) -> Result<CommandResult, WireError> {
        let snapshot = self.sessions.status(&session_id)?;
        let previous_controller = snapshot
            .controller
            .ok_or_else(|| WireError::invalid_argument("session has no active claim to release"))?;

        self.sessions.release(&session_id).await?;

        self.multiplexer.publish(&[ObservedEvent::SessionControl {
            session_id,
            action: ControlAction::Released,
            controller: previous_controller,
            previous_controller: None,
            reason: None,
        }]);

        Ok(CommandResult::Ack { ok: true })
    }
}
