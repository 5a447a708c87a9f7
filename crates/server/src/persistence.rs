//! Persistence collaborator (§10.5): an mpsc-fed batched SQLite writer,
//! grounded on the teacher's `persistence.rs` (`PersistenceWriter` /
//! `PersistCommand` / batch-then-flush loop), rescoped from the
//! session/message schema to directories/repositories/conversations/tasks.
//!
//! The Domain Store never imports `rusqlite` directly — it emits
//! `PersistCommand`s over a channel and this module is the only thing
//! that touches the database file.

use std::path::PathBuf;
use std::time::Duration;

use harness_protocol::types::{
    Conversation, Directory, Repository, RuntimeStatus, Scope, Task, TaskScopeKind, TaskStatus,
};
use rusqlite::{params, Connection};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

const BATCH_SIZE: usize = 50;
const FLUSH_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub enum PersistCommand {
    DirectoryUpsert(Directory),
    DirectoryArchive { directory_id: String, ts: chrono::DateTime<chrono::Utc> },
    RepositoryUpsert(Repository),
    RepositoryArchive { repository_id: String, ts: chrono::DateTime<chrono::Utc> },
    ConversationUpsert(Conversation),
    ConversationArchive { conversation_id: String, ts: chrono::DateTime<chrono::Utc> },
    ConversationDelete { conversation_id: String },
    TaskUpsert(Task),
}

pub struct PersistenceWriter {
    rx: mpsc::Receiver<PersistCommand>,
    db_path: PathBuf,
}

impl PersistenceWriter {
    pub fn new(rx: mpsc::Receiver<PersistCommand>, db_path: PathBuf) -> Self {
        Self { rx, db_path }
    }

    pub async fn run(mut self) {
        let mut batch = Vec::with_capacity(BATCH_SIZE);
        let mut interval = tokio::time::interval(FLUSH_INTERVAL);

        loop {
            tokio::select! {
                cmd = self.rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            batch.push(cmd);
                            if batch.len() >= BATCH_SIZE {
                                flush(&self.db_path, std::mem::take(&mut batch)).await;
                            }
                        }
                        None => {
                            if !batch.is_empty() {
                                flush(&self.db_path, std::mem::take(&mut batch)).await;
                            }
                            break;
                        }
                    }
                }
                _ = interval.tick() => {
                    if !batch.is_empty() {
                        flush(&self.db_path, std::mem::take(&mut batch)).await;
                    }
                }
            }
        }
    }
}

async fn flush(db_path: &PathBuf, batch: Vec<PersistCommand>) {
    let db_path = db_path.clone();
    let result = tokio::task::spawn_blocking(move || flush_batch(&db_path, batch)).await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(component = "persistence", event = "persistence.flush_error", error = %err, "Batch flush failed"),
        Err(err) => error!(component = "persistence", event = "persistence.flush_panic", error = %err, "Batch flush task panicked"),
    }
}

fn flush_batch(db_path: &PathBuf, batch: Vec<PersistCommand>) -> rusqlite::Result<()> {
    let mut conn = Connection::open(db_path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    let tx = conn.unchecked_transaction()?;
    let batch_len = batch.len();
    for cmd in batch {
        if let Err(err) = execute_command(&tx, &cmd) {
            warn!(component = "persistence", event = "persistence.command_error", error = %err, "Skipping failed persistence command");
        }
    }
    tx.commit()?;
    debug!(component = "persistence", event = "persistence.batch_flushed", batch_len, "Flushed persistence batch");
    Ok(())
}

fn execute_command(tx: &rusqlite::Transaction<'_>, cmd: &PersistCommand) -> rusqlite::Result<()> {
    match cmd {
        PersistCommand::DirectoryUpsert(d) => {
            tx.execute(
                "INSERT INTO directories (directory_id, tenant_id, user_id, workspace_id, path, repository_id, created_at, archived_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(directory_id) DO UPDATE SET
                   path = excluded.path,
                   repository_id = excluded.repository_id,
                   archived_at = excluded.archived_at",
                params![
                    d.directory_id,
                    d.scope.tenant_id,
                    d.scope.user_id,
                    d.scope.workspace_id,
                    d.path,
                    d.repository_id,
                    d.created_at.to_rfc3339(),
                    d.archived_at.map(|t| t.to_rfc3339()),
                ],
            )?;
        }
        PersistCommand::DirectoryArchive { directory_id, ts } => {
            tx.execute(
                "UPDATE directories SET archived_at = ?2 WHERE directory_id = ?1",
                params![directory_id, ts.to_rfc3339()],
            )?;
        }
        PersistCommand::RepositoryUpsert(r) => {
            let metadata_json = serde_json::to_string(&r.metadata).unwrap_or_else(|_| "{}".to_string());
            tx.execute(
                "INSERT INTO repositories (repository_id, tenant_id, user_id, workspace_id, name, remote_url, default_branch, metadata_json, created_at, archived_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(repository_id) DO UPDATE SET
                   name = excluded.name,
                   remote_url = excluded.remote_url,
                   default_branch = excluded.default_branch,
                   metadata_json = excluded.metadata_json,
                   archived_at = excluded.archived_at",
                params![
                    r.repository_id,
                    r.scope.tenant_id,
                    r.scope.user_id,
                    r.scope.workspace_id,
                    r.name,
                    r.remote_url,
                    r.default_branch,
                    metadata_json,
                    r.created_at.to_rfc3339(),
                    r.archived_at.map(|t| t.to_rfc3339()),
                ],
            )?;
        }
        PersistCommand::RepositoryArchive { repository_id, ts } => {
            tx.execute(
                "UPDATE repositories SET archived_at = ?2 WHERE repository_id = ?1",
                params![repository_id, ts.to_rfc3339()],
            )?;
        }
        PersistCommand::ConversationUpsert(c) => {
            tx.execute(
                "INSERT INTO conversations (conversation_id, directory_id, title, agent_type, created_at, last_event_at, archived_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(conversation_id) DO UPDATE SET
                   title = excluded.title,
                   last_event_at = excluded.last_event_at,
                   archived_at = excluded.archived_at",
                params![
                    c.conversation_id,
                    c.directory_id,
                    c.title,
                    c.agent_type,
                    c.created_at.to_rfc3339(),
                    c.last_event_at.map(|t| t.to_rfc3339()),
                    c.archived_at.map(|t| t.to_rfc3339()),
                ],
            )?;
        }
        PersistCommand::ConversationArchive { conversation_id, ts } => {
            tx.execute(
                "UPDATE conversations SET archived_at = ?2 WHERE conversation_id = ?1",
                params![conversation_id, ts.to_rfc3339()],
            )?;
        }
        PersistCommand::ConversationDelete { conversation_id } => {
            tx.execute("DELETE FROM conversations WHERE conversation_id = ?1", params![conversation_id])?;
        }
        PersistCommand::TaskUpsert(t) => {
            tx.execute(
                "INSERT INTO tasks (task_id, tenant_id, user_id, workspace_id, scope_kind, repository_id, project_id, title, description, status, order_index, claimed_by_controller, claimed_by_project, branch, base_branch, linear_issue_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                 ON CONFLICT(task_id) DO UPDATE SET
                   title = excluded.title,
                   description = excluded.description,
                   status = excluded.status,
                   order_index = excluded.order_index,
                   claimed_by_controller = excluded.claimed_by_controller,
                   claimed_by_project = excluded.claimed_by_project,
                   branch = excluded.branch,
                   base_branch = excluded.base_branch,
                   linear_issue_id = excluded.linear_issue_id",
                params![
                    t.task_id,
                    t.scope.tenant_id,
                    t.scope.user_id,
                    t.scope.workspace_id,
                    format!("{:?}", t.scope_kind),
                    t.repository_id,
                    t.project_id,
                    t.title,
                    t.description,
                    format!("{:?}", t.status),
                    t.order_index,
                    t.claimed_by_controller,
                    t.claimed_by_project,
                    t.branch,
                    t.base_branch,
                    t.linear_issue_id,
                    t.created_at.to_rfc3339(),
                ],
            )?;
        }
    }
    Ok(())
}

pub fn create_persistence_channel() -> (mpsc::Sender<PersistCommand>, mpsc::Receiver<PersistCommand>) {
    mpsc::channel(1000)
}

/// Everything the store needs to rehydrate at startup, read with a plain
/// blocking connection (no batching needed — this runs once before the
/// listener binds).
#[derive(Debug, Default)]
pub struct StartupSnapshot {
    pub directories: Vec<Directory>,
    pub repositories: Vec<Repository>,
    pub conversations: Vec<Conversation>,
    pub tasks: Vec<Task>,
}

pub fn load_startup_snapshot(db_path: &PathBuf) -> rusqlite::Result<StartupSnapshot> {
    let conn = Connection::open(db_path)?;
    let mut snapshot = StartupSnapshot::default();

    let mut stmt = conn.prepare(
        "SELECT directory_id, tenant_id, user_id, workspace_id, path, repository_id, created_at, archived_at FROM directories",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Directory {
            directory_id: row.get(0)?,
            scope: Scope {
                tenant_id: row.get(1)?,
                user_id: row.get(2)?,
                workspace_id: row.get(3)?,
            },
            path: row.get(4)?,
            repository_id: row.get(5)?,
            created_at: parse_timestamp(row.get::<_, String>(6)?),
            archived_at: row.get::<_, Option<String>>(7)?.map(parse_timestamp),
        })
    })?;
    for row in rows {
        snapshot.directories.push(row?);
    }

    let mut stmt = conn.prepare(
        "SELECT repository_id, tenant_id, user_id, workspace_id, name, remote_url, default_branch, metadata_json, created_at, archived_at FROM repositories",
    )?;
    let rows = stmt.query_map([], |row| {
        let metadata_json: String = row.get(7)?;
        Ok(Repository {
            repository_id: row.get(0)?,
            scope: Scope {
                tenant_id: row.get(1)?,
                user_id: row.get(2)?,
                workspace_id: row.get(3)?,
            },
            name: row.get(4)?,
            remote_url: row.get(5)?,
            default_branch: row.get(6)?,
            metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
            created_at: parse_timestamp(row.get::<_, String>(8)?),
            archived_at: row.get::<_, Option<String>>(9)?.map(parse_timestamp),
        })
    })?;
    for row in rows {
        snapshot.repositories.push(row?);
    }

    let mut stmt = conn.prepare(
        "SELECT conversation_id, directory_id, title, agent_type, created_at, last_event_at, archived_at FROM conversations",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Conversation {
            conversation_id: row.get(0)?,
            directory_id: row.get(1)?,
            title: row.get(2)?,
            agent_type: row.get(3)?,
            adapter_state: None,
            runtime_status: RuntimeStatus::Completed,
            runtime_status_model: None,
            runtime_live: false,
            created_at: parse_timestamp(row.get::<_, String>(4)?),
            last_event_at: row.get::<_, Option<String>>(5)?.map(parse_timestamp),
            runtime_last_exit: None,
            archived_at: row.get::<_, Option<String>>(6)?.map(parse_timestamp),
        })
    })?;
    for row in rows {
        snapshot.conversations.push(row?);
    }

    let mut stmt = conn.prepare(
        "SELECT task_id, tenant_id, user_id, workspace_id, scope_kind, repository_id, project_id, title, description, status, order_index, claimed_by_controller, claimed_by_project, branch, base_branch, linear_issue_id, created_at FROM tasks",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Task {
            task_id: row.get(0)?,
            scope: Scope {
                tenant_id: row.get(1)?,
                user_id: row.get(2)?,
                workspace_id: row.get(3)?,
            },
            scope_kind: parse_scope_kind(&row.get::<_, String>(4)?),
            repository_id: row.get(5)?,
            project_id: row.get(6)?,
            title: row.get(7)?,
            description: row.get(8)?,
            status: parse_task_status(&row.get::<_, String>(9)?),
            order_index: row.get(10)?,
            claimed_by_controller: row.get(11)?,
            claimed_by_project: row.get(12)?,
            branch: row.get(13)?,
            base_branch: row.get(14)?,
            linear_issue_id: row.get(15)?,
            created_at: parse_timestamp(row.get::<_, String>(16)?),
        })
    })?;
    for row in rows {
        snapshot.tasks.push(row?);
    }

    Ok(snapshot)
}

fn parse_scope_kind(raw: &str) -> TaskScopeKind {
    match raw {
        "Repository" => TaskScopeKind::Repository,
        "Project" => TaskScopeKind::Project,
        _ => TaskScopeKind::Global,
    }
}

fn parse_task_status(raw: &str) -> TaskStatus {
    match raw {
        "Ready" => TaskStatus::Ready,
        "InProgress" => TaskStatus::InProgress,
        "Completed" => TaskStatus::Completed,
        _ => TaskStatus::Draft,
    }
}

fn parse_timestamp(raw: String) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_batch_upserts_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        crate::migration_runner::run_migrations(&mut Connection::open(&db_path).unwrap()).unwrap();

        let directory = Directory {
            directory_id: "d1".into(),
            scope: Scope::default(),
            path: "/repo".into(),
            repository_id: None,
            created_at: chrono::Utc::now(),
            archived_at: None,
        };
        flush_batch(&db_path, vec![PersistCommand::DirectoryUpsert(directory)]).unwrap();

        let snapshot = load_startup_snapshot(&db_path).unwrap();
        assert_eq!(snapshot.directories.len(), 1);
        assert_eq!(snapshot.directories[0].directory_id, "d1");
    }
}
