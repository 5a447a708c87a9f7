//! Session actor (§4.4): owns one live `PtyProcess` and processes
//! `SessionCommand`s sequentially off an mpsc channel, the way the
//! teacher's `session_actor.rs` owns a `SessionHandle`. Read-only status
//! is published through an `ArcSwap<SessionSnapshot>` so `session.list`
//! and `session.status` never wait on the command queue.
//!
//! The actor is agent-agnostic: it knows how to move bytes, resize the
//! pty, and forward signals. A `StatusReducer` collaborator (see
//! `status_reducer.rs`) is the only thing that turns raw output into a
//! `working` / `needs-input` / `idle` phase.

use std::sync::Arc;

use arc_swap::ArcSwap;
use harness_protocol::error::{ErrorKind, WireError};
use harness_protocol::types::{Controller, ProcessExit};
use tokio::sync::mpsc;
use tracing::warn;

use super::command::{AttachResult, ClaimOutcome, SessionCommand, SessionSnapshot};
use super::pty::PtyProcess;

#[derive(Clone)]
pub struct SessionActorHandle {
    pub session_id: String,
    command_tx: mpsc::Sender<SessionCommand>,
    snapshot: Arc<ArcSwap<SessionSnapshot>>,
}

impl SessionActorHandle {
    pub fn spawn(session_id: String, conversation_id: String, process: PtyProcess) -> Self {
        let (command_tx, command_rx) = mpsc::channel(256);
        let snapshot = Arc::new(ArcSwap::from_pointee(SessionSnapshot::spawning(
            session_id.clone(),
            conversation_id,
        )));

        tokio::spawn(actor_loop(process, command_rx, snapshot.clone()));

        SessionActorHandle {
            session_id,
            command_tx,
            snapshot,
        }
    }

    pub async fn send(&self, cmd: SessionCommand) {
        if self.command_tx.send(cmd).await.is_err() {
            warn!(session_id = %self.session_id, "session actor channel closed, command dropped");
        }
    }

    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.snapshot.load_full()
    }

    pub fn is_live(&self) -> bool {
        self.snapshot().live
    }
}

async fn actor_loop(
    mut process: PtyProcess,
    mut command_rx: mpsc::Receiver<SessionCommand>,
    snapshot: Arc<ArcSwap<SessionSnapshot>>,
) {
    while let Some(cmd) = command_rx.recv().await {
        match cmd {
            SessionCommand::Write { data } => {
                if !snapshot.load().live {
                    continue;
                }
                if let Err(err) = process.write(&data) {
                    warn!(error = %err, "pty write failed");
                }
            }
            SessionCommand::Resize { cols, rows } => {
                if let Err(err) = process.resize(cols, rows) {
                    warn!(error = %err, "pty resize failed");
                }
            }
            SessionCommand::Signal { signal } => {
                let result = match signal {
                    harness_protocol::signal::Signal::Interrupt => process.signal_interrupt(),
                    harness_protocol::signal::Signal::Eof => process.signal_eof(),
                    harness_protocol::signal::Signal::Terminate => process.signal_terminate(),
                };
                if let Err(err) = result {
                    warn!(error = %err, "pty signal failed");
                }
            }
            SessionCommand::Respond { text, reply } => {
                let bytes = text.into_bytes();
                let sent = bytes.len();
                if snapshot.load().live {
                    let _ = process.write(&bytes);
                }
                let _ = reply.send(sent);
            }
            SessionCommand::Attach { since_cursor, reply } => {
                let since = since_cursor.unwrap_or(0);
                let (backlog, truncated) = process.replay_since(since);
                let latest_cursor = process.latest_cursor();
                let backlog_start_cursor = if truncated {
                    latest_cursor - backlog.len() as i64
                } else {
                    since
                };
                let _ = reply.send(AttachResult {
                    latest_cursor,
                    backlog,
                    backlog_start_cursor,
                    truncated,
                    output_rx: process.subscribe_output(),
                });
            }
            SessionCommand::SubscribeEvents { reply } => {
                let _ = reply.send(process.subscribe_events());
            }
            SessionCommand::Close { reply } => {
                let exit = close_session(&mut process, &snapshot).await;
                let _ = reply.send(exit);
                return;
            }
            SessionCommand::Claim {
                controller,
                takeover,
                reason,
                reply,
            } => {
                let outcome = apply_claim(&snapshot, controller, takeover, reason);
                let _ = reply.send(outcome);
            }
            SessionCommand::Release => {
                let current = snapshot.load_full();
                snapshot.store(Arc::new(SessionSnapshot {
                    controller: None,
                    ..(*current).clone()
                }));
            }
            SessionCommand::ApplyStatus { status } => {
                let current = snapshot.load_full();
                snapshot.store(Arc::new(SessionSnapshot {
                    status: Some(status),
                    ..(*current).clone()
                }));
            }
        }
    }

    // Command channel closed without an explicit `Close` — the process is
    // still live; wait for it to exit so `last_exit` is recorded honestly.
    let _ = close_session(&mut process, &snapshot).await;
}

async fn close_session(process: &mut PtyProcess, snapshot: &Arc<ArcSwap<SessionSnapshot>>) -> ProcessExit {
    let _ = process.signal_terminate();
    let exit = process.wait_for_exit().await;
    let current = snapshot.load_full();
    snapshot.store(Arc::new(SessionSnapshot {
        live: false,
        last_exit: Some(exit.clone()),
        ..(*current).clone()
    }));
    exit
}

fn apply_claim(
    snapshot: &Arc<ArcSwap<SessionSnapshot>>,
    controller: Controller,
    takeover: bool,
    reason: Option<String>,
) -> Result<ClaimOutcome, WireError> {
    let current = snapshot.load_full();
    let previous = current.controller.clone();

    match &previous {
        Some(existing) if existing.controller_id != controller.controller_id && !takeover => {
            Err(WireError::new(
                ErrorKind::Conflict,
                format!("session already claimed by controller {}", existing.controller_id),
            ))
        }
        Some(existing) if existing.controller_id != controller.controller_id => {
            let _ = reason;
            snapshot.store(Arc::new(SessionSnapshot {
                controller: Some(controller),
                ..(*current).clone()
            }));
            Ok(ClaimOutcome {
                taken_over: true,
                previous_controller: Some(existing.clone()),
            })
        }
        _ => {
            snapshot.store(Arc::new(SessionSnapshot {
                controller: Some(controller),
                ..(*current).clone()
            }));
            Ok(ClaimOutcome {
                taken_over: false,
                previous_controller: previous,
            })
        }
    }
}
