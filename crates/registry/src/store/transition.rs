//! The Domain Store's single critical section: `transition(state, op, now)
//! -> (newState, result, events[])`. Pure and synchronous by design note
//! §9 ("store mutation + event emission must be atomic... use a single
//! critical section per mutation that returns (newSnapshot, events[])");
//! the caller applies the returned state under its own lock and fans out
//! the events outside of it.

use chrono::{DateTime, Utc};
use harness_protocol::command::{CommandResult, TaskPullAvailability};
use harness_protocol::error::WireError;
use harness_protocol::event::ObservedEvent;
use harness_protocol::types::{
    Conversation, Directory, DirectoryGitSnapshot, Repository, RuntimeStatus, Scope, Task,
    TaskScopeKind, TaskStatus,
};

use super::state::{task_scope_key, StoreState};

#[derive(Debug, Clone)]
pub enum StoreOp {
    DirectoryUpsert {
        directory_id: Option<String>,
        scope: Scope,
        path: String,
    },
    DirectoryList {
        scope: Scope,
        include_archived: bool,
        limit: Option<u32>,
    },
    DirectoryArchive {
        directory_id: String,
    },
    DirectoryGitStatus {
        scope: Scope,
        directory_id: Option<String>,
    },
    DirectoryGitUpdated {
        snapshot: DirectoryGitSnapshot,
    },

    RepositoryUpsert {
        repository_id: Option<String>,
        scope: Scope,
        name: String,
        remote_url: Option<String>,
        default_branch: Option<String>,
    },
    RepositoryGet {
        repository_id: String,
    },
    RepositoryList {
        scope: Scope,
        include_archived: bool,
    },
    RepositoryUpdate {
        repository_id: String,
        name: Option<String>,
        remote_url: Option<String>,
        default_branch: Option<String>,
    },
    RepositoryArchive {
        repository_id: String,
    },

    ConversationCreate {
        conversation_id: Option<String>,
        directory_id: String,
        title: String,
        agent_type: String,
        adapter_state: Option<serde_json::Value>,
        has_live_pty: bool,
    },
    ConversationUpdate {
        conversation_id: String,
        title: String,
    },
    ConversationArchive {
        conversation_id: String,
    },
    ConversationDelete {
        conversation_id: String,
    },

    TaskCreate {
        scope: Scope,
        repository_id: Option<String>,
        project_id: Option<String>,
        title: String,
        description: Option<String>,
    },
    TaskReady { task_id: String },
    TaskDraft { task_id: String },
    TaskComplete { task_id: String },
    TaskReorder {
        scope_kind_key: String,
        ordered_task_ids: Vec<String>,
    },
    TaskClaim {
        task_id: String,
        controller_id: String,
        project_id: Option<String>,
        branch_name: Option<String>,
        base_branch: Option<String>,
    },
    TaskPull {
        scope: Scope,
        controller_id: String,
        project_id: Option<String>,
        repository_id: Option<String>,
        branch_name: Option<String>,
        base_branch: Option<String>,
    },
}

pub fn transition(
    state: &StoreState,
    op: StoreOp,
    now: DateTime<Utc>,
) -> Result<(StoreState, CommandResult, Vec<ObservedEvent>), WireError> {
    let mut next = state.clone();
    match op {
        StoreOp::DirectoryUpsert {
            directory_id,
            scope,
            path,
        } => {
            let directory_id = directory_id.unwrap_or_else(harness_protocol::new_id);
            let created_at = next
                .directories
                .get(&directory_id)
                .map(|d| d.created_at)
                .unwrap_or(now);
            let archived_at = next.directories.get(&directory_id).and_then(|d| d.archived_at);
            let directory = Directory {
                directory_id: directory_id.clone(),
                scope,
                path,
                repository_id: next
                    .directories
                    .get(&directory_id)
                    .and_then(|d| d.repository_id.clone()),
                created_at,
                archived_at,
            };
            next.directories.insert(directory_id, directory.clone());
            let event = ObservedEvent::DirectoryUpserted {
                directory: directory.clone(),
            };
            Ok((next, CommandResult::Directory(directory), vec![event]))
        }

        StoreOp::DirectoryList {
            scope,
            include_archived,
            limit,
        } => {
            let list = next.list_directories(&scope, include_archived, limit);
            Ok((next, CommandResult::DirectoryList(list), vec![]))
        }

        StoreOp::DirectoryArchive { directory_id } => {
            let dir = next
                .directories
                .get_mut(&directory_id)
                .ok_or_else(|| WireError::not_found("directory not found"))?;
            dir.archived_at = Some(now);
            let scope = dir.scope.clone();

            let mut events = vec![ObservedEvent::DirectoryArchived {
                directory_id: directory_id.clone(),
                scope: scope.clone(),
                ts: now,
            }];

            let conversation_ids: Vec<String> = next
                .conversations
                .values()
                .filter(|c| c.directory_id == directory_id && c.archived_at.is_none())
                .map(|c| c.conversation_id.clone())
                .collect();
            for id in conversation_ids {
                if let Some(conv) = next.conversations.get_mut(&id) {
                    conv.archived_at = Some(now);
                }
                events.push(ObservedEvent::ConversationArchived {
                    conversation_id: id,
                    scope: scope.clone(),
                    ts: now,
                });
            }

            Ok((next, CommandResult::Ack { ok: true }, events))
        }

        StoreOp::DirectoryGitStatus { scope, directory_id } => {
            let list: Vec<DirectoryGitSnapshot> = next
                .git_snapshots
                .values()
                .filter(|s| {
                    directory_id
                        .as_deref()
                        .map(|id| id == s.directory_id)
                        .unwrap_or(true)
                        && next
                            .directories
                            .get(&s.directory_id)
                            .map(|d| scope.matches(&d.scope))
                            .unwrap_or(false)
                })
                .cloned()
                .collect();
            Ok((next, CommandResult::DirectoryGitStatus(list), vec![]))
        }

        StoreOp::DirectoryGitUpdated { snapshot } => {
            let scope = next
                .directories
                .get(&snapshot.directory_id)
                .map(|d| d.scope.clone())
                .unwrap_or_default();
            next.git_snapshots
                .insert(snapshot.directory_id.clone(), snapshot.clone());
            let event = ObservedEvent::DirectoryGitUpdated { snapshot, scope };
            Ok((next, CommandResult::Ack { ok: true }, vec![event]))
        }

        StoreOp::RepositoryUpsert {
            repository_id,
            scope,
            name,
            remote_url,
            default_branch,
        } => {
            let repository_id = repository_id.unwrap_or_else(harness_protocol::new_id);
            let existing = next.repositories.get(&repository_id);
            let created_at = existing.map(|r| r.created_at).unwrap_or(now);
            let archived_at = existing.and_then(|r| r.archived_at);
            let metadata = existing.map(|r| r.metadata.clone()).unwrap_or_default();
            let repository = Repository {
                repository_id: repository_id.clone(),
                scope,
                name,
                remote_url,
                default_branch,
                metadata,
                created_at,
                archived_at,
            };
            next.repositories.insert(repository_id, repository.clone());
            let event = ObservedEvent::RepositoryUpserted {
                repository: repository.clone(),
            };
            Ok((next, CommandResult::Repository(repository), vec![event]))
        }

        StoreOp::RepositoryGet { repository_id } => {
            let repo = next
                .repositories
                .get(&repository_id)
                .cloned()
                .ok_or_else(|| WireError::not_found("repository not found"))?;
            Ok((next, CommandResult::Repository(repo), vec![]))
        }

        StoreOp::RepositoryList { scope, include_archived } => {
            let list = next.list_repositories(&scope, include_archived);
            Ok((next, CommandResult::RepositoryList(list), vec![]))
        }

        StoreOp::RepositoryUpdate {
            repository_id,
            name,
            remote_url,
            default_branch,
        } => {
            let repo = next
                .repositories
                .get_mut(&repository_id)
                .ok_or_else(|| WireError::not_found("repository not found"))?;
            if let Some(name) = name {
                repo.name = name;
            }
            if remote_url.is_some() {
                repo.remote_url = remote_url;
            }
            if default_branch.is_some() {
                repo.default_branch = default_branch;
            }
            let repo = repo.clone();
            let event = ObservedEvent::RepositoryUpdated { repository: repo.clone() };
            Ok((next, CommandResult::Repository(repo), vec![event]))
        }

        StoreOp::RepositoryArchive { repository_id } => {
            let repo = next
                .repositories
                .get_mut(&repository_id)
                .ok_or_else(|| WireError::not_found("repository not found"))?;
            repo.archived_at = Some(now);
            let scope = repo.scope.clone();
            let event = ObservedEvent::RepositoryArchived {
                repository_id,
                scope,
                ts: now,
            };
            Ok((next, CommandResult::Ack { ok: true }, vec![event]))
        }

        StoreOp::ConversationCreate {
            conversation_id,
            directory_id,
            title,
            agent_type,
            adapter_state,
            has_live_pty,
        } => {
            let scope = next
                .directories
                .get(&directory_id)
                .ok_or_else(|| WireError::not_found("directory not found"))?
                .scope
                .clone();
            let conversation_id = conversation_id.unwrap_or_else(harness_protocol::new_id);
            let conversation = Conversation {
                conversation_id: conversation_id.clone(),
                directory_id,
                title,
                agent_type,
                adapter_state,
                runtime_status: if has_live_pty {
                    RuntimeStatus::Running
                } else {
                    RuntimeStatus::Completed
                },
                runtime_status_model: None,
                runtime_live: has_live_pty,
                last_event_at: Some(now),
                runtime_last_exit: None,
                created_at: now,
                archived_at: None,
            };
            next.conversations
                .insert(conversation_id, conversation.clone());
            let event = ObservedEvent::ConversationCreated {
                conversation: conversation.clone(),
                scope,
            };
            Ok((next, CommandResult::Conversation(conversation), vec![event]))
        }

        StoreOp::ConversationUpdate { conversation_id, title } => {
            let conv = next
                .conversations
                .get_mut(&conversation_id)
                .ok_or_else(|| WireError::not_found("conversation not found"))?;
            conv.title = title;
            conv.last_event_at = Some(now);
            let conv = conv.clone();
            let scope = next
                .directories
                .get(&conv.directory_id)
                .map(|d| d.scope.clone())
                .unwrap_or_default();
            let event = ObservedEvent::ConversationUpdated {
                conversation: conv.clone(),
                scope,
            };
            Ok((next, CommandResult::Conversation(conv), vec![event]))
        }

        StoreOp::ConversationArchive { conversation_id } => {
            let conv = next
                .conversations
                .get_mut(&conversation_id)
                .ok_or_else(|| WireError::not_found("conversation not found"))?;
            conv.archived_at = Some(now);
            let directory_id = conv.directory_id.clone();
            let scope = next
                .directories
                .get(&directory_id)
                .map(|d| d.scope.clone())
                .unwrap_or_default();
            let event = ObservedEvent::ConversationArchived {
                conversation_id,
                scope,
                ts: now,
            };
            Ok((next, CommandResult::Ack { ok: true }, vec![event]))
        }

        StoreOp::ConversationDelete { conversation_id } => {
            let conv = next
                .conversations
                .remove(&conversation_id)
                .ok_or_else(|| WireError::not_found("conversation not found"))?;
            let scope = next
                .directories
                .get(&conv.directory_id)
                .map(|d| d.scope.clone())
                .unwrap_or_default();
            let event = ObservedEvent::ConversationDeleted {
                conversation_id,
                scope,
                ts: now,
            };
            Ok((next, CommandResult::Ack { ok: true }, vec![event]))
        }

        StoreOp::TaskCreate {
            scope,
            repository_id,
            project_id,
            title,
            description,
        } => {
            let scope_kind = if repository_id.is_some() {
                TaskScopeKind::Repository
            } else if project_id.is_some() {
                TaskScopeKind::Project
            } else {
                TaskScopeKind::Global
            };
            let probe = Task {
                task_id: String::new(),
                scope: Scope::default(),
                scope_kind,
                repository_id: repository_id.clone(),
                project_id: project_id.clone(),
                title: String::new(),
                description: None,
                status: TaskStatus::Draft,
                order_index: 0,
                claimed_by_controller: None,
                claimed_by_project: None,
                branch: None,
                base_branch: None,
                linear_issue_id: None,
                created_at: now,
            };
            let scope_kind_key = task_scope_key(&probe);
            let order_index = next.next_order_index(&scope_kind_key);
            let task = Task {
                task_id: harness_protocol::new_id(),
                scope,
                order_index,
                title,
                description,
                ..probe
            };
            next.tasks.insert(task.task_id.clone(), task.clone());
            let event = ObservedEvent::TaskCreated { task: task.clone() };
            Ok((next, CommandResult::Task(task), vec![event]))
        }

        StoreOp::TaskReady { task_id } => set_task_status(&mut next, &task_id, TaskStatus::Ready, now, true),
        StoreOp::TaskDraft { task_id } => set_task_status(&mut next, &task_id, TaskStatus::Draft, now, true),
        StoreOp::TaskComplete { task_id } => {
            set_task_status(&mut next, &task_id, TaskStatus::Completed, now, false)
        }

        StoreOp::TaskReorder {
            scope_kind_key,
            ordered_task_ids,
        } => {
            let current: std::collections::HashSet<String> = next
                .list_tasks_in_scope(&scope_kind_key)
                .into_iter()
                .map(|t| t.task_id)
                .collect();
            let requested: std::collections::HashSet<String> =
                ordered_task_ids.iter().cloned().collect();
            if current != requested || current.len() != ordered_task_ids.len() {
                return Err(WireError::precondition_failed(
                    "task reorder set does not match the current tasks in scope",
                ));
            }
            for (index, task_id) in ordered_task_ids.iter().enumerate() {
                if let Some(task) = next.tasks.get_mut(task_id) {
                    task.order_index = index as u32;
                }
            }
            let tasks = next.list_tasks_in_scope(&scope_kind_key);
            let event = ObservedEvent::TaskReordered { tasks: tasks.clone() };
            Ok((next, CommandResult::TaskReordered { tasks }, vec![event]))
        }

        StoreOp::TaskClaim {
            task_id,
            controller_id,
            project_id,
            branch_name,
            base_branch,
        } => {
            let task = next
                .tasks
                .get_mut(&task_id)
                .ok_or_else(|| WireError::not_found("task not found"))?;
            if task.status == TaskStatus::InProgress
                && task.claimed_by_controller.as_deref() != Some(controller_id.as_str())
            {
                return Err(WireError::conflict("task already claimed by another controller"));
            }
            task.status = TaskStatus::InProgress;
            task.claimed_by_controller = Some(controller_id);
            task.claimed_by_project = project_id;
            task.branch = branch_name;
            task.base_branch = base_branch;
            let task = task.clone();
            let event = ObservedEvent::TaskUpdated { task: task.clone() };
            Ok((next, CommandResult::Task(task), vec![event]))
        }

        StoreOp::TaskPull {
            scope,
            controller_id,
            project_id,
            repository_id,
            branch_name,
            base_branch,
        } => {
            let candidates = ready_tasks_in_scope(&next, &scope, repository_id.as_deref());

            let Some(mut chosen) = candidates.into_iter().next() else {
                // Distinguish "nothing ready anywhere in scope" from "ready
                // work exists, just not for the requested repository".
                let availability = if repository_id.is_some()
                    && !ready_tasks_in_scope(&next, &scope, None).is_empty()
                {
                    TaskPullAvailability::Blocked
                } else {
                    TaskPullAvailability::None
                };
                let reason = match availability {
                    TaskPullAvailability::Blocked => {
                        "ready tasks exist in scope but none for the requested repository".to_string()
                    }
                    _ => "no ready task matches the requested scope".to_string(),
                };
                return Ok((
                    next,
                    CommandResult::TaskPullResult {
                        task: None,
                        directory_id: None,
                        availability,
                        reason: Some(reason),
                        repository_id,
                        settings: std::collections::HashMap::new(),
                    },
                    vec![],
                ));
            };

            chosen.status = TaskStatus::InProgress;
            chosen.claimed_by_controller = Some(controller_id);
            chosen.claimed_by_project = project_id;
            chosen.branch = branch_name;
            chosen.base_branch = base_branch;
            next.tasks.insert(chosen.task_id.clone(), chosen.clone());

            let repository_id = chosen.repository_id.clone();
            let (directory_id, settings) = match repository_id.as_deref() {
                Some(repo_id) => {
                    let directory_id = next
                        .directories
                        .values()
                        .filter(|d| d.repository_id.as_deref() == Some(repo_id) && scope.matches(&d.scope))
                        .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.directory_id.cmp(&b.directory_id)))
                        .map(|d| d.directory_id.clone());
                    let settings = next
                        .repositories
                        .get(repo_id)
                        .map(|r| r.metadata.clone())
                        .unwrap_or_default();
                    (directory_id, settings)
                }
                None => (None, std::collections::HashMap::new()),
            };

            let event = ObservedEvent::TaskUpdated { task: chosen.clone() };
            Ok((
                next,
                CommandResult::TaskPullResult {
                    task: Some(chosen),
                    directory_id,
                    availability: TaskPullAvailability::Claimed,
                    reason: None,
                    repository_id,
                    settings,
                },
                vec![event],
            ))
        }
    }
}

fn set_task_status(
    state: &mut StoreState,
    task_id: &str,
    status: TaskStatus,
    now: DateTime<Utc>,
    clears_claim: bool,
) -> Result<(StoreState, CommandResult, Vec<ObservedEvent>), WireError> {
    let task = state
        .tasks
        .get_mut(task_id)
        .ok_or_else(|| WireError::not_found("task not found"))?;
    task.status = status;
    if clears_claim {
        task.claimed_by_controller = None;
        task.claimed_by_project = None;
    }
    let _ = now;
    let task = task.clone();
    let event = ObservedEvent::TaskUpdated { task: task.clone() };
    Ok((state.clone(), CommandResult::Task(task), vec![event]))
}

/// Ready tasks visible to `scope`, optionally narrowed to one repository,
/// ordered the same way `task.pull` picks its next candidate.
fn ready_tasks_in_scope(state: &StoreState, scope: &Scope, repository_id: Option<&str>) -> Vec<Task> {
    let mut out: Vec<Task> = state
        .tasks
        .values()
        .filter(|t| {
            t.status == TaskStatus::Ready
                && scope.matches(&t.scope)
                && repository_id
                    .map(|r| t.repository_id.as_deref() == Some(r))
                    .unwrap_or(true)
        })
        .cloned()
        .collect();
    out.sort_by(|a, b| a.order_index.cmp(&b.order_index).then_with(|| a.task_id.cmp(&b.task_id)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use harness_protocol::types::Scope;

    fn scope() -> Scope {
        Scope {
            tenant_id: Some("t1".into()),
            user_id: Some("u1".into()),
            workspace_id: Some("w1".into()),
        }
    }

    #[test]
    fn directory_upsert_assigns_id_and_emits_event() {
        let state = StoreState::new();
        let (next, result, events) = transition(
            &state,
            StoreOp::DirectoryUpsert {
                directory_id: None,
                scope: scope(),
                path: "/repo".into(),
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(next.directories.len(), 1);
        assert_eq!(events.len(), 1);
        assert!(matches!(result, CommandResult::Directory(_)));
    }

    #[test]
    fn directory_archive_cascades_to_conversations() {
        let mut state = StoreState::new();
        let now = Utc::now();
        let (s1, _, _) = transition(
            &state,
            StoreOp::DirectoryUpsert {
                directory_id: Some("d1".into()),
                scope: scope(),
                path: "/repo".into(),
            },
            now,
        )
        .unwrap();
        state = s1;
        let (s2, _, _) = transition(
            &state,
            StoreOp::ConversationCreate {
                conversation_id: Some("c1".into()),
                directory_id: "d1".into(),
                title: "thread".into(),
                agent_type: "shell".into(),
                adapter_state: None,
                has_live_pty: false,
            },
            now,
        )
        .unwrap();
        state = s2;

        let (s3, _, events) = transition(&state, StoreOp::DirectoryArchive { directory_id: "d1".into() }, now).unwrap();
        assert!(s3.directories["d1"].archived_at.is_some());
        assert!(s3.conversations["c1"].archived_at.is_some());
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ObservedEvent::DirectoryArchived { .. }));
        assert!(matches!(events[1], ObservedEvent::ConversationArchived { .. }));
    }

    #[test]
    fn task_reorder_accepts_exact_set_scenario_c_from_spec() {
        let mut state = StoreState::new();
        let now = Utc::now();
        for id in ["A", "B", "C"] {
            let (s, _, _) = transition(
                &state,
                StoreOp::TaskCreate {
                    scope: scope(),
                    repository_id: None,
                    project_id: None,
                    title: id.into(),
                    description: None,
                },
                now,
            )
            .unwrap();
            state = s;
        }
        let ids: Vec<String> = state.list_tasks_in_scope("global").iter().map(|t| t.task_id.clone()).collect();
        let (a, b, c) = (ids[0].clone(), ids[1].clone(), ids[2].clone());

        let (next, result, events) = transition(
            &state,
            StoreOp::TaskReorder {
                scope_kind_key: "global".into(),
                ordered_task_ids: vec![c.clone(), a.clone(), b.clone()],
            },
            now,
        )
        .unwrap();
        let ordered = next.list_tasks_in_scope("global");
        assert_eq!(ordered[0].task_id, c);
        assert_eq!(ordered[1].task_id, a);
        assert_eq!(ordered[2].task_id, b);
        assert!(matches!(result, CommandResult::TaskReordered { .. }));
        assert_eq!(events.len(), 1);

        // mismatched set -> precondition-failed, state unchanged
        let err = transition(
            &next,
            StoreOp::TaskReorder {
                scope_kind_key: "global".into(),
                ordered_task_ids: vec![c, a],
            },
            now,
        )
        .unwrap_err();
        assert_eq!(err.kind, harness_protocol::error::ErrorKind::PreconditionFailed);
    }

    #[test]
    fn task_claim_conflicts_for_a_different_controller() {
        let mut state = StoreState::new();
        let now = Utc::now();
        let (s, _, _) = transition(
            &state,
            StoreOp::TaskCreate {
                scope: scope(),
                repository_id: None,
                project_id: None,
                title: "t".into(),
                description: None,
            },
            now,
        )
        .unwrap();
        state = s;
        let task_id = state.tasks.values().next().unwrap().task_id.clone();

        let (s2, _, _) = transition(
            &state,
            StoreOp::TaskClaim {
                task_id: task_id.clone(),
                controller_id: "c1".into(),
                project_id: None,
                branch_name: None,
                base_branch: None,
            },
            now,
        )
        .unwrap();
        state = s2;

        let err = transition(
            &state,
            StoreOp::TaskClaim {
                task_id,
                controller_id: "c2".into(),
                project_id: None,
                branch_name: None,
                base_branch: None,
            },
            now,
        )
        .unwrap_err();
        assert_eq!(err.kind, harness_protocol::error::ErrorKind::Conflict);
    }

    #[test]
    fn task_pull_resolves_directory_id_and_repository_settings() {
        let mut state = StoreState::new();
        let now = Utc::now();

        let (s, repo_result, _) = transition(
            &state,
            StoreOp::RepositoryUpsert {
                repository_id: None,
                scope: scope(),
                name: "repo".into(),
                remote_url: None,
                default_branch: None,
            },
            now,
        )
        .unwrap();
        state = s;
        let CommandResult::Repository(repo) = repo_result else { panic!("expected Repository result") };

        let (s, _, _) = transition(
            &state,
            StoreOp::DirectoryUpsert {
                directory_id: Some("d1".into()),
                scope: scope(),
                path: "/repo".into(),
            },
            now,
        )
        .unwrap();
        state = s;
        // directory.repositoryId is assigned by DirectoryGitUpdated in the
        // real flow; poke it directly here since that op is out of scope.
        state.directories.get_mut("d1").unwrap().repository_id = Some(repo.repository_id.clone());

        let (s, _, _) = transition(
            &state,
            StoreOp::TaskCreate {
                scope: scope(),
                repository_id: Some(repo.repository_id.clone()),
                project_id: None,
                title: "t".into(),
                description: None,
            },
            now,
        )
        .unwrap();
        state = s;
        let task_id = state.tasks.values().next().unwrap().task_id.clone();
        let (s, _, _) = transition(&state, StoreOp::TaskReady { task_id }, now).unwrap();
        state = s;

        let (_, result, events) = transition(
            &state,
            StoreOp::TaskPull {
                scope: scope(),
                controller_id: "ctrl".into(),
                project_id: None,
                repository_id: None,
                branch_name: None,
                base_branch: None,
            },
            now,
        )
        .unwrap();
        assert_eq!(events.len(), 1);
        let CommandResult::TaskPullResult {
            task,
            directory_id,
            availability,
            repository_id,
            ..
        } = result
        else {
            panic!("expected TaskPullResult")
        };
        assert!(task.is_some());
        assert_eq!(directory_id.as_deref(), Some("d1"));
        assert_eq!(repository_id, Some(repo.repository_id));
        assert_eq!(availability, TaskPullAvailability::Claimed);
    }

    #[test]
    fn task_pull_reports_blocked_when_scope_has_work_for_another_repository() {
        let mut state = StoreState::new();
        let now = Utc::now();

        let (s, _, _) = transition(
            &state,
            StoreOp::TaskCreate {
                scope: scope(),
                repository_id: Some("other-repo".into()),
                project_id: None,
                title: "t".into(),
                description: None,
            },
            now,
        )
        .unwrap();
        state = s;
        let task_id = state.tasks.values().next().unwrap().task_id.clone();
        let (s, _, _) = transition(&state, StoreOp::TaskReady { task_id }, now).unwrap();
        state = s;

        let (_, result, events) = transition(
            &state,
            StoreOp::TaskPull {
                scope: scope(),
                controller_id: "ctrl".into(),
                project_id: None,
                repository_id: Some("requested-repo".into()),
                branch_name: None,
                base_branch: None,
            },
            now,
        )
        .unwrap();
        assert!(events.is_empty());
        let CommandResult::TaskPullResult { task, availability, .. } = result else {
            panic!("expected TaskPullResult")
        };
        assert!(task.is_none());
        assert_eq!(availability, TaskPullAvailability::Blocked);
    }

    #[test]
    fn task_pull_reports_none_when_scope_has_no_ready_work() {
        let state = StoreState::new();
        let now = Utc::now();

        let (_, result, events) = transition(
            &state,
            StoreOp::TaskPull {
                scope: scope(),
                controller_id: "ctrl".into(),
                project_id: None,
                repository_id: None,
                branch_name: None,
                base_branch: None,
            },
            now,
        )
        .unwrap();
        assert!(events.is_empty());
        let CommandResult::TaskPullResult { availability, .. } = result else {
            panic!("expected TaskPullResult")
        };
        assert_eq!(availability, TaskPullAvailability::None);
    }
}
