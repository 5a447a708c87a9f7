//! The Envelope Codec (§4.1): newline-delimited JSON framing plus the
//! tagged-union envelope kinds exchanged in each direction.

use serde::{Deserialize, Serialize};

use crate::command::{Command, CommandResult, PtyInput, PtyResize, PtySignal};
use crate::cursor::Cursor;
use crate::event::ObservedEvent;
use crate::types::ProcessExit;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientEnvelope {
    Auth {
        token: String,
    },
    Command {
        command_id: String,
        command: Command,
    },
    #[serde(rename = "pty.input")]
    PtyInput(PtyInput),
    #[serde(rename = "pty.resize")]
    PtyResize(PtyResize),
    #[serde(rename = "pty.signal")]
    PtySignal(PtySignal),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerEnvelope {
    #[serde(rename = "auth.ok")]
    AuthOk,
    #[serde(rename = "auth.error")]
    AuthError { error: String },
    #[serde(rename = "command.accepted")]
    CommandAccepted { command_id: String },
    #[serde(rename = "command.completed")]
    CommandCompleted {
        command_id: String,
        result: CommandResult,
    },
    #[serde(rename = "command.failed")]
    CommandFailed { command_id: String, error: String },
    #[serde(rename = "pty.output")]
    PtyOutput {
        session_id: String,
        cursor: Cursor,
        chunk_base64: String,
    },
    #[serde(rename = "pty.exit")]
    PtyExit { session_id: String, exit: ProcessExit },
    #[serde(rename = "pty.event")]
    PtyEvent {
        session_id: String,
        event: ObservedEvent,
    },
    #[serde(rename = "stream.event")]
    StreamEvent {
        subscription_id: String,
        cursor: Cursor,
        event: ObservedEvent,
    },
}

/// `encode(envelope) = JSON(envelope) + "\n"`.
pub fn encode(envelope: &ServerEnvelope) -> String {
    let mut line = serde_json::to_string(envelope).expect("envelope serialization cannot fail");
    line.push('\n');
    line
}

/// Parses one line into a `ClientEnvelope`. A parse failure returns
/// `None` so a malformed peer cannot break the stream (§4.1).
pub fn parse_client_envelope(line: &str) -> Option<ClientEnvelope> {
    serde_json::from_str(line).ok()
}

pub fn parse_server_envelope(line: &str) -> Option<ServerEnvelope> {
    serde_json::from_str(line).ok()
}

/// Splits a buffer of possibly-partial NDJSON into complete parsed
/// envelopes plus the remainder (the partial trailing line). Empty
/// lines are skipped; lines that fail to parse are silently discarded.
pub fn consume_json_lines(buffer: &str) -> (Vec<ClientEnvelope>, String) {
    let mut messages = Vec::new();
    let mut last_end = 0usize;

    for (idx, _) in buffer.match_indices('\n') {
        let line = &buffer[last_end..idx];
        last_end = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        if let Some(envelope) = parse_client_envelope(line) {
            messages.push(envelope);
        }
    }

    (messages, buffer[last_end..].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_auth_envelope() {
        let client = ClientEnvelope::Auth {
            token: "T".into(),
        };
        let json = serde_json::to_string(&client).unwrap();
        let parsed: ClientEnvelope = serde_json::from_str(&json).unwrap();
        match parsed {
            ClientEnvelope::Auth { token } => assert_eq!(token, "T"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn rejects_malformed_lines_without_dropping_stream() {
        let buffer = "{\"kind\":\"auth\",\"token\":\"T\"}\n{oops\n{\"kind\":\"pty.signal\",\"sessionId\":\"s1\",\"signal\":\"interrupt\"}\npartial";
        let (messages, remainder) = consume_json_lines(buffer);
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[0], ClientEnvelope::Auth { .. }));
        assert!(matches!(messages[1], ClientEnvelope::PtySignal(_)));
        assert_eq!(remainder, "partial");
    }

    #[test]
    fn skips_empty_lines() {
        let buffer = "\n\n{\"kind\":\"auth\",\"token\":\"T\"}\n\n";
        let (messages, remainder) = consume_json_lines(buffer);
        assert_eq!(messages.len(), 1);
        assert_eq!(remainder, "");
    }

    #[test]
    fn malformed_envelope_scenario_f_from_spec() {
        let buffer = "{\"kind\":\"auth\",\"token\":\"T\"}\n{oops\n{\"kind\":\"pty.exit\",\"sessionId\":\"s1\",\"exit\":{\"code\":0,\"signal\":null}}\npartial";
        let (messages, remainder) = consume_json_lines(buffer);
        assert_eq!(messages.len(), 1, "pty.exit is a server->client kind, parsed as a client envelope it fails");
        assert_eq!(remainder, "partial");
    }

    #[test]
    fn encode_appends_single_trailing_newline() {
        let line = encode(&ServerEnvelope::AuthOk);
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }
}
