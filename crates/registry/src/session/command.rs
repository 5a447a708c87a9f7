//! Commands sent to a running session's actor loop (§4.4). Mirrors the
//! shape of the domain store's command/result split: one enum in, one
//! typed reply per variant via a oneshot channel.

use harness_protocol::signal::Signal;
use harness_protocol::types::{Controller, ProcessExit, StreamSessionStatusModel};
use tokio::sync::oneshot;

pub enum SessionCommand {
    Write {
        data: Vec<u8>,
    },
    Resize {
        cols: u16,
        rows: u16,
    },
    Signal {
        signal: Signal,
    },
    Respond {
        text: String,
        reply: oneshot::Sender<usize>,
    },
    Attach {
        since_cursor: Option<i64>,
        reply: oneshot::Sender<AttachResult>,
    },
    SubscribeEvents {
        reply: oneshot::Sender<tokio::sync::broadcast::Receiver<super::PtyLifecycleEvent>>,
    },
    Close {
        reply: oneshot::Sender<ProcessExit>,
    },
    Claim {
        controller: Controller,
        takeover: bool,
        reason: Option<String>,
        reply: oneshot::Sender<Result<ClaimOutcome, harness_protocol::error::WireError>>,
    },
    Release,
    ApplyStatus {
        status: StreamSessionStatusModel,
    },
}

pub struct AttachResult {
    pub latest_cursor: i64,
    pub backlog: Vec<u8>,
    pub backlog_start_cursor: i64,
    pub truncated: bool,
    pub output_rx: tokio::sync::broadcast::Receiver<(i64, Vec<u8>)>,
}

pub struct ClaimOutcome {
    pub taken_over: bool,
    pub previous_controller: Option<Controller>,
}

/// Read-only liveness/status view an actor keeps in an `ArcSwap` so
/// `session.list`/`session.status` never route through the command
/// channel.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub conversation_id: String,
    pub live: bool,
    pub status: Option<StreamSessionStatusModel>,
    pub last_exit: Option<ProcessExit>,
    pub controller: Option<Controller>,
}

impl SessionSnapshot {
    pub fn spawning(session_id: String, conversation_id: String) -> Self {
        Self {
            session_id,
            conversation_id,
            live: true,
            status: None,
            last_exit: None,
            controller: None,
        }
    }
}
