//! Session Registry & PTY Supervisor (§4.4).

pub mod actor;
pub mod command;
pub mod pty;
pub mod registry;
pub mod ring;

pub use pty::PtyLifecycleEvent;
