//! `SessionRegistry` (§4.4): the command surface dispatched for every
//! `pty.*` / `session.*` command and raw `pty.input` / `pty.resize` /
//! `pty.signal` envelope. Backed by a `DashMap` so lookups never block on
//! a single global lock — each session's own actor serializes its own
//! mutations.

use dashmap::DashMap;
use harness_protocol::error::WireError;
use harness_protocol::signal::Signal;
use harness_protocol::types::{Controller, ProcessExit};
use tokio::sync::{broadcast, oneshot};

use super::actor::SessionActorHandle;
use super::command::{AttachResult, ClaimOutcome, SessionCommand, SessionSnapshot};
use super::pty::{LaunchSpec, PtyLifecycleEvent, PtyProcess};

pub struct SessionRegistry {
    sessions: DashMap<String, SessionActorHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// `pty.start`: spawns a new session unless `session_id` already
    /// names a live one, in which case it returns the existing id with
    /// `recovered_duplicate_start = true` rather than restarting it.
    pub async fn start(
        &self,
        session_id: Option<String>,
        conversation_id: String,
        spec: LaunchSpec,
    ) -> Result<(String, bool), WireError> {
        if let Some(id) = &session_id {
            if let Some(existing) = self.sessions.get(id) {
                if existing.is_live() {
                    return Ok((id.clone(), true));
                }
            }
        }

        let id = session_id.unwrap_or_else(harness_protocol::new_id);
        let process = PtyProcess::spawn(spec)
            .await
            .map_err(|e| WireError::internal(e.to_string()))?;
        let handle = SessionActorHandle::spawn(id.clone(), conversation_id, process);
        self.sessions.insert(id.clone(), handle);
        Ok((id, false))
    }

    fn get(&self, session_id: &str) -> Result<SessionActorHandle, WireError> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| WireError::not_found(format!("session {session_id} not found")))
    }

    fn require_live(&self, session_id: &str) -> Result<SessionActorHandle, WireError> {
        let handle = self.get(session_id)?;
        if !handle.is_live() {
            return Err(WireError::session_not_live());
        }
        Ok(handle)
    }

    pub async fn attach(&self, session_id: &str, since_cursor: Option<i64>) -> Result<AttachResult, WireError> {
        let handle = self.get(session_id)?;
        let (tx, rx) = oneshot::channel();
        handle.send(SessionCommand::Attach { since_cursor, reply: tx }).await;
        rx.await.map_err(|_| WireError::internal("session actor dropped attach reply"))
    }

    pub fn detach(&self, session_id: &str) -> Result<(), WireError> {
        self.get(session_id).map(|_| ())
    }

    pub async fn close(&self, session_id: &str) -> Result<ProcessExit, WireError> {
        let handle = self.get(session_id)?;
        let (tx, rx) = oneshot::channel();
        handle.send(SessionCommand::Close { reply: tx }).await;
        rx.await.map_err(|_| WireError::internal("session actor dropped close reply"))
    }

    pub async fn subscribe_events(&self, session_id: &str) -> Result<broadcast::Receiver<PtyLifecycleEvent>, WireError> {
        let handle = self.get(session_id)?;
        let (tx, rx) = oneshot::channel();
        handle.send(SessionCommand::SubscribeEvents { reply: tx }).await;
        rx.await.map_err(|_| WireError::internal("session actor dropped subscribe reply"))
    }

    pub fn unsubscribe_events(&self, session_id: &str) -> Result<(), WireError> {
        self.get(session_id).map(|_| ())
    }

    pub async fn write_input(&self, session_id: &str, data: Vec<u8>) -> Result<(), WireError> {
        let handle = self.require_live(session_id)?;
        handle.send(SessionCommand::Write { data }).await;
        Ok(())
    }

    pub async fn resize(&self, session_id: &str, cols: u16, rows: u16) -> Result<(), WireError> {
        let handle = self.require_live(session_id)?;
        handle.send(SessionCommand::Resize { cols, rows }).await;
        Ok(())
    }

    pub async fn signal(&self, session_id: &str, signal: Signal) -> Result<(), WireError> {
        let handle = self.require_live(session_id)?;
        handle.send(SessionCommand::Signal { signal }).await;
        Ok(())
    }

    pub async fn respond(&self, session_id: &str, text: String) -> Result<usize, WireError> {
        let handle = self.require_live(session_id)?;
        let (tx, rx) = oneshot::channel();
        handle.send(SessionCommand::Respond { text, reply: tx }).await;
        rx.await.map_err(|_| WireError::internal("session actor dropped respond reply"))
    }

    pub async fn interrupt(&self, session_id: &str) -> Result<(), WireError> {
        self.signal(session_id, Signal::Interrupt).await
    }

    /// `session.remove`: closes the process if live and drops the entry
    /// from the registry entirely (unlike `pty.close`, which keeps the
    /// record around for a grace period so `pty.attach` can still read
    /// `lastExit`).
    pub async fn remove(&self, session_id: &str) -> Result<ProcessExit, WireError> {
        let handle = self.get(session_id)?;
        let (tx, rx) = oneshot::channel();
        handle.send(SessionCommand::Close { reply: tx }).await;
        let exit = rx
            .await
            .map_err(|_| WireError::internal("session actor dropped close reply"))?;
        self.sessions.remove(session_id);
        Ok(exit)
    }

    pub fn list(&self, live_only: Option<bool>) -> Vec<SessionSnapshot> {
        self.sessions
            .iter()
            .map(|entry| entry.value().snapshot())
            .filter(|snap| live_only != Some(true) || snap.live)
            .map(|snap| (*snap).clone())
            .collect()
    }

    pub fn status(&self, session_id: &str) -> Result<SessionSnapshot, WireError> {
        Ok((*self.get(session_id)?.snapshot()).clone())
    }

    pub async fn claim(
        &self,
        session_id: &str,
        controller: Controller,
        takeover: bool,
        reason: Option<String>,
    ) -> Result<ClaimOutcome, WireError> {
        let handle = self.get(session_id)?;
        let (tx, rx) = oneshot::channel();
        handle
            .send(SessionCommand::Claim {
                controller,
                takeover,
                reason,
                reply: tx,
            })
            .await;
        rx.await.map_err(|_| WireError::internal("session actor dropped claim reply"))?
    }

    pub async fn release(&self, session_id: &str) -> Result<(), WireError> {
        let handle = self.get(session_id)?;
        handle.send(SessionCommand::Release).await;
        Ok(())
    }

    /// Applies a `StreamSessionStatusModel` produced by the Status Reducer
    /// collaborator (§9) to the named session's published snapshot.
    pub async fn apply_status(
        &self,
        session_id: &str,
        status: harness_protocol::types::StreamSessionStatusModel,
    ) -> Result<(), WireError> {
        let handle = self.get(session_id)?;
        handle.send(SessionCommand::ApplyStatus { status }).await;
        Ok(())
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
