//! The per-connection state machine (§4.6): `awaiting-auth -> ready ->
//! done`. One task per accepted connection; a single writer task owns
//! the socket's write half so command responses, pty output, and stream
//! events never interleave mid-line.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use harness_protocol::command::{Command, CommandResult};
use harness_protocol::envelope::{consume_json_lines, encode, ClientEnvelope, ServerEnvelope};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::dispatch::Dispatcher;

#[derive(Clone, Copy, PartialEq, Eq)]
enum ConnState {
    AwaitingAuth,
    Ready,
    Done,
}

/// Background forwarding tasks started for this connection (pty output
/// streams and stream subscriptions), tracked so a dropped connection can
/// cancel them all (§4.6: "releases all subscriptions, detaches from all
/// sessions — no other state change").
#[derive(Default)]
struct ConnectionTasks {
    subscriptions: HashMap<String, JoinHandle<()>>,
    pty_output: HashMap<String, JoinHandle<()>>,
}

impl ConnectionTasks {
    fn abort_all(&mut self, dispatcher: &Dispatcher) {
        for (subscription_id, h) in self.subscriptions.drain() {
            h.abort();
            dispatcher.multiplexer.unsubscribe(&subscription_id);
        }
        for (session_id, h) in self.pty_output.drain() {
            h.abort();
            let _ = dispatcher.sessions.detach(&session_id);
        }
    }
}

pub async fn handle_connection<S>(stream: S, config: Arc<Config>, dispatcher: Arc<Dispatcher>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut read_half, write_half) = tokio::io::split(stream);
    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<String>();

    let writer_task = tokio::spawn(async move {
        let mut write_half = write_half;
        while let Some(line) = writer_rx.recv().await {
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let mut state = ConnState::AwaitingAuth;
    let mut buffer = String::new();
    let mut read_buf = [0u8; 8192];
    let mut tasks = ConnectionTasks::default();

    'outer: loop {
        let n = match read_half.read(&mut read_buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };
        buffer.push_str(&String::from_utf8_lossy(&read_buf[..n]));
        let (messages, remainder) = consume_json_lines(&buffer);
        buffer = remainder;

        for envelope in messages {
            match state {
                ConnState::AwaitingAuth => match envelope {
                    ClientEnvelope::Auth { token } => {
                        if crate::auth::token_matches(&config.auth_token, &token) {
                            state = ConnState::Ready;
                            send(&writer_tx, &ServerEnvelope::AuthOk);
                        } else {
                            send(
                                &writer_tx,
                                &ServerEnvelope::AuthError {
                                    error: "auth: invalid token".to_string(),
                                },
                            );
                            state = ConnState::Done;
                            break 'outer;
                        }
                    }
                    _ => {
                        send(
                            &writer_tx,
                            &ServerEnvelope::AuthError {
                                error: "auth: first message must be auth".to_string(),
                            },
                        );
                        state = ConnState::Done;
                        break 'outer;
                    }
                },
                ConnState::Ready => {
                    handle_ready_envelope(envelope, &dispatcher, &writer_tx, &mut tasks).await;
                }
                ConnState::Done => break 'outer,
            }
        }
    }

    tasks.abort_all(&dispatcher);
    drop(writer_tx);
    let _ = writer_task.await;
    info!(component = "connection", event = "connection.closed", "Connection closed");
}

async fn handle_ready_envelope(
    envelope: ClientEnvelope,
    dispatcher: &Arc<Dispatcher>,
    writer_tx: &mpsc::UnboundedSender<String>,
    tasks: &mut ConnectionTasks,
) {
    match envelope {
        ClientEnvelope::Auth { .. } => {
            // Already authenticated; a second auth envelope is malformed
            // input for this state and is silently dropped (§4.1).
        }
        ClientEnvelope::Command { command_id, command } => {
            send(writer_tx, &ServerEnvelope::CommandAccepted { command_id: command_id.clone() });
            dispatch_command(command_id, command, dispatcher, writer_tx, tasks).await;
        }
        ClientEnvelope::PtyInput(input) => {
            if let Ok(data) = BASE64.decode(input.data_base64.as_bytes()) {
                let _ = dispatcher.sessions.write_input(&input.session_id, data).await;
            }
        }
        ClientEnvelope::PtyResize(resize) => {
            let _ = dispatcher.sessions.resize(&resize.session_id, resize.cols, resize.rows).await;
        }
        ClientEnvelope::PtySignal(signal) => {
            let _ = dispatcher.sessions.signal(&signal.session_id, signal.signal).await;
        }
    }
}

/// `pty.attach` and `stream.subscribe` both hand back a receiver that has
/// to live past the `command.completed` response, so they bypass
/// `Dispatcher::dispatch`'s plain `CommandResult` return and are handled
/// here directly; every other command goes through the dispatcher.
async fn dispatch_command(
    command_id: String,
    command: Command,
    dispatcher: &Arc<Dispatcher>,
    writer_tx: &mpsc::UnboundedSender<String>,
    tasks: &mut ConnectionTasks,
) {
    match command {
        Command::PtyAttach { session_id, since_cursor } => {
            match dispatcher.sessions.attach(&session_id, since_cursor.map(|c| c.0)).await {
                Ok(attach) => {
                    if !attach.backlog.is_empty() {
                        send(
                            writer_tx,
                            &ServerEnvelope::PtyOutput {
                                session_id: session_id.clone(),
                                cursor: harness_protocol::cursor::Cursor(attach.backlog_start_cursor),
                                chunk_base64: BASE64.encode(&attach.backlog),
                            },
                        );
                    }
                    let handle = spawn_pty_output_forwarder(session_id.clone(), attach.output_rx, writer_tx.clone());
                    tasks.pty_output.insert(session_id, handle);
                    send(
                        writer_tx,
                        &ServerEnvelope::CommandCompleted {
                            command_id,
                            result: CommandResult::PtyAttached {
                                latest_cursor: harness_protocol::cursor::Cursor(attach.latest_cursor),
                                truncated: attach.truncated,
                            },
                        },
                    );
                }
                Err(err) => send(
                    writer_tx,
                    &ServerEnvelope::CommandFailed {
                        command_id,
                        error: err.wire_message(),
                    },
                ),
            }
        }
        Command::StreamSubscribe { filter } => {
            let (subscription_id, cursor, _truncated, rx) = dispatcher.multiplexer.subscribe(filter);
            let handle = spawn_subscription_forwarder(subscription_id.clone(), rx, writer_tx.clone());
            tasks.subscriptions.insert(subscription_id.clone(), handle);
            send(
                writer_tx,
                &ServerEnvelope::CommandCompleted {
                    command_id,
                    result: CommandResult::Subscribed { subscription_id, cursor },
                },
            );
        }
        Command::StreamUnsubscribe { ref subscription_id } => {
            if let Some(handle) = tasks.subscriptions.remove(subscription_id) {
                handle.abort();
            }
            match dispatcher.dispatch(command.clone()).await {
                Ok(result) => send(writer_tx, &ServerEnvelope::CommandCompleted { command_id, result }),
                Err(err) => send(
                    writer_tx,
                    &ServerEnvelope::CommandFailed {
                        command_id,
                        error: err.wire_message(),
                    },
                ),
            }
        }
        other => match dispatcher.dispatch(other).await {
            Ok(result) => send(writer_tx, &ServerEnvelope::CommandCompleted { command_id, result }),
            Err(err) => send(
                writer_tx,
                &ServerEnvelope::CommandFailed {
                    command_id,
                    error: err.wire_message(),
                },
            ),
        },
    }
}

/// Forwards a session's PTY output broadcast to this connection as
/// `pty.output` envelopes, started the moment `pty.attach` succeeds.
fn spawn_pty_output_forwarder(
    session_id: String,
    mut rx: tokio::sync::broadcast::Receiver<(i64, Vec<u8>)>,
    writer_tx: mpsc::UnboundedSender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok((cursor, chunk)) => {
                    let envelope = ServerEnvelope::PtyOutput {
                        session_id: session_id.clone(),
                        cursor: harness_protocol::cursor::Cursor(cursor),
                        chunk_base64: BASE64.encode(chunk),
                    };
                    if writer_tx.send(encode(&envelope)).is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn spawn_subscription_forwarder(
    subscription_id: String,
    mut rx: mpsc::Receiver<(harness_protocol::cursor::Cursor, harness_protocol::event::ObservedEvent)>,
    writer_tx: mpsc::UnboundedSender<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some((cursor, event)) = rx.recv().await {
            let envelope = ServerEnvelope::StreamEvent {
                subscription_id: subscription_id.clone(),
                cursor,
                event,
            };
            if writer_tx.send(encode(&envelope)).is_err() {
                break;
            }
        }
    })
}

fn send(writer_tx: &mpsc::UnboundedSender<String>, envelope: &ServerEnvelope) {
    let _ = writer_tx.send(encode(envelope));
}
