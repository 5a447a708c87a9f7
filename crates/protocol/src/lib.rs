//! Wire types for the control-plane stream protocol: envelopes exchanged
//! between clients and the gateway daemon, the command/result union, the
//! observed-event taxonomy, and the pure cursor/projection reducers that
//! define the protocol's ordering contract by symmetry with the server.

use uuid::Uuid;

pub mod command;
pub mod cursor;
pub mod envelope;
pub mod error;
pub mod event;
pub mod projection;
pub mod signal;
pub mod types;

pub use command::{Command, CommandResult};
pub use cursor::Cursor;
pub use envelope::{ClientEnvelope, ServerEnvelope};
pub use error::{ErrorKind, WireError};
pub use event::ObservedEvent;
pub use signal::Signal;

/// Generate a new opaque identifier for sessions, subscriptions, commands, etc.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
