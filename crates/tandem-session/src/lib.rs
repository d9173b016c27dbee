//! tandem-session: per-tab agent sessions over pseudo-terminals.
//!
//! # Architecture
//!
//! - [`Registry`] owns one [`Session`] per `(worktree, tab)` key. A session
//!   pairs a [`TerminalBuffer`] with at most one live process.
//! - [`Visibility`] keeps exactly one session on screen and defers fit/focus
//!   to a layout pass.
//! - [`Controller`] turns selections into spawn, respawn, and show decisions
//!   and routes [`ProcessEvent`](tandem_pty::ProcessEvent)s back to their
//!   sessions, discarding events from processes that were replaced.
//! - [`run_control_loop`] drives a controller from a [`Command`] channel and
//!   the adapter's event channel on a single thread.

pub mod agents;
pub mod buffer;
pub mod command;
pub mod controller;
pub mod env;
pub mod registry;
pub mod session;
pub mod tabs;
pub mod visibility;

#[cfg(test)]
mod testing;

pub use agents::{compute_args, AgentDefinition, AgentFlag, AgentKind, AgentRegistry};
pub use buffer::TerminalBuffer;
pub use command::{
    command_channel, run_control_loop, Command, CommandReceiver, CommandSender, SessionSummary,
    Snapshot,
};
pub use controller::{Controller, SelectError, SelectOutcome, Selection};
pub use registry::Registry;
pub use session::{Session, SessionKey, SessionStatus};
pub use tabs::{Tab, TabBook};
pub use visibility::Visibility;
