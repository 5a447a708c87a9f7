//! PTY process management (§4.4): spawns a child under a pseudo-terminal,
//! pipes its output into a bounded ring broadcast to attached readers, and
//! forwards writes/resizes/signals to it. Grounded on the `portable-pty`
//! spawn-on-blocking-thread + reader-thread pattern; the supervisor itself
//! knows nothing about agent CLI flags — a `ProcessLauncher` collaborator
//! derives the actual command line from the conversation.

use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use harness_protocol::types::{Conversation, ProcessExit};
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::ring::OutputRing;

const OUTPUT_BROADCAST_CAPACITY: usize = 256;
const EVENT_BROADCAST_CAPACITY: usize = 64;
const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub command: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: String,
    pub initial_cols: u16,
    pub initial_rows: u16,
}

/// Derives process launch parameters from a conversation's `agentType` /
/// `adapterState`. The supervisor never inspects these fields itself.
pub trait ProcessLauncher: Send + Sync {
    fn launch_spec(&self, conversation: &Conversation, directory_path: &str) -> LaunchSpec;
}

/// Default launcher used when no agent-specific collaborator is wired in:
/// runs the user's shell in the directory. Real deployments register a
/// `ProcessLauncher` that maps `agentType` to the right CLI invocation.
pub struct ShellLauncher;

impl ProcessLauncher for ShellLauncher {
    fn launch_spec(&self, _conversation: &Conversation, directory_path: &str) -> LaunchSpec {
        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
        LaunchSpec {
            command: shell,
            args: Vec::new(),
            env: Vec::new(),
            cwd: directory_path.to_string(),
            initial_cols: 80,
            initial_rows: 24,
        }
    }
}

#[derive(Debug, Clone)]
pub enum PtyLifecycleEvent {
    Notify { message: String },
    TurnCompleted,
    AttentionRequired { reason: String },
    SessionExit { exit: ProcessExit },
}

pub enum PtyError {
    SpawnFailed(String),
    Io(String),
}

impl std::fmt::Display for PtyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PtyError::SpawnFailed(msg) => write!(f, "failed to spawn pty process: {msg}"),
            PtyError::Io(msg) => write!(f, "pty io error: {msg}"),
        }
    }
}

struct PtyInner {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send>,
}

/// A running PTY process plus its output ring and broadcast channels. The
/// ring lives behind a `Mutex` because the forwarding task that drains the
/// blocking reader thread's bytes appends to it concurrently with the
/// owning actor's `replay_since` reads on `pty.attach`.
pub struct PtyProcess {
    inner: Arc<Mutex<PtyInner>>,
    ring: Arc<Mutex<OutputRing>>,
    pub output_tx: broadcast::Sender<(i64, Vec<u8>)>,
    pub event_tx: broadcast::Sender<PtyLifecycleEvent>,
    reader_handle: Option<JoinHandle<ProcessExit>>,
}

impl PtyProcess {
    pub async fn spawn(spec: LaunchSpec) -> Result<Self, PtyError> {
        let (inner, mut reader) = tokio::task::spawn_blocking(move || -> Result<_, PtyError> {
            let pty_system = native_pty_system();
            let pair = pty_system
                .openpty(PtySize {
                    rows: spec.initial_rows,
                    cols: spec.initial_cols,
                    pixel_width: 0,
                    pixel_height: 0,
                })
                .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;

            let mut cmd = CommandBuilder::new(spec.command);
            cmd.args(&spec.args);
            cmd.cwd(spec.cwd);
            for (key, value) in &spec.env {
                cmd.env(key, value);
            }

            let child = pair
                .slave
                .spawn_command(cmd)
                .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;
            drop(pair.slave);

            let reader = pair
                .master
                .try_clone_reader()
                .map_err(|e| PtyError::Io(e.to_string()))?;
            let writer = pair
                .master
                .take_writer()
                .map_err(|e| PtyError::Io(e.to_string()))?;

            Ok((
                PtyInner {
                    master: pair.master,
                    writer,
                    child,
                },
                reader,
            ))
        })
        .await
        .map_err(|e| PtyError::SpawnFailed(e.to_string()))??;

        let inner = Arc::new(Mutex::new(inner));
        let ring = Arc::new(Mutex::new(OutputRing::new()));
        let (output_tx, _) = broadcast::channel(OUTPUT_BROADCAST_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_BROADCAST_CAPACITY);

        let mut process = PtyProcess {
            inner: inner.clone(),
            ring: ring.clone(),
            output_tx: output_tx.clone(),
            event_tx: event_tx.clone(),
            reader_handle: None,
        };

        let output_tx_for_reader = output_tx.clone();
        let event_tx_for_reader = event_tx.clone();
        let inner_for_reader = inner.clone();
        let ring_for_reader = ring.clone();
        let (chunk_tx, mut chunk_rx) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();

        tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; READ_CHUNK];
            loop {
                let n = match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(_) => break,
                };
                if chunk_tx.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
        });

        let join = tokio::spawn(async move {
            while let Some(chunk) = chunk_rx.recv().await {
                let cursor = {
                    let mut ring = ring_for_reader.lock().expect("pty ring mutex poisoned");
                    ring.push(&chunk)
                };
                let _ = output_tx_for_reader.send((cursor, chunk));
            }
            let exit = tokio::task::spawn_blocking({
                let inner = inner_for_reader.clone();
                move || {
                    let mut guard = inner.lock().expect("pty mutex poisoned");
                    match guard.child.wait() {
                        Ok(status) => ProcessExit {
                            code: status.exit_code().try_into().ok(),
                            signal: None,
                        },
                        Err(_) => ProcessExit { code: None, signal: None },
                    }
                }
            })
            .await
            .unwrap_or(ProcessExit { code: None, signal: None });

            let _ = event_tx_for_reader.send(PtyLifecycleEvent::SessionExit { exit: exit.clone() });
            exit
        });

        process.reader_handle = Some(join);
        Ok(process)
    }

    /// Bytes observed at or after `since_cursor`, for `pty.attach` replay.
    pub fn replay_since(&self, since_cursor: i64) -> (Vec<u8>, bool) {
        self.ring.lock().expect("pty ring mutex poisoned").replay_since(since_cursor)
    }

    pub fn latest_cursor(&self) -> i64 {
        self.ring.lock().expect("pty ring mutex poisoned").latest_cursor()
    }

    pub fn subscribe_output(&self) -> broadcast::Receiver<(i64, Vec<u8>)> {
        self.output_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PtyLifecycleEvent> {
        self.event_tx.subscribe()
    }

    pub fn write(&self, data: &[u8]) -> Result<(), PtyError> {
        let mut guard = self.inner.lock().expect("pty mutex poisoned");
        guard.writer.write_all(data).map_err(|e| PtyError::Io(e.to_string()))
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), PtyError> {
        let guard = self.inner.lock().expect("pty mutex poisoned");
        guard
            .master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::Io(e.to_string()))
    }

    pub fn signal_interrupt(&self) -> Result<(), PtyError> {
        self.write(&[0x03])
    }

    pub fn signal_eof(&self) -> Result<(), PtyError> {
        self.write(&[0x04])
    }

    pub fn signal_terminate(&self) -> Result<(), PtyError> {
        let mut guard = self.inner.lock().expect("pty mutex poisoned");
        guard.child.kill().map_err(|e| PtyError::Io(e.to_string()))
    }

    pub async fn wait_for_exit(&mut self) -> ProcessExit {
        if let Some(handle) = self.reader_handle.take() {
            handle.await.unwrap_or(ProcessExit { code: None, signal: None })
        } else {
            ProcessExit { code: None, signal: None }
        }
    }
}
