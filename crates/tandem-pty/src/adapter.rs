use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::subscription::Subscription;

/// Identifies one successful spawn. Never reused by an adapter.
pub type ProcessId = u64;

/// Environment variables for a spawned process, ordered by name.
pub type EnvMap = BTreeMap<String, String>;

pub type ProcessEventSender = mpsc::UnboundedSender<ProcessEvent>;
pub type ProcessEventReceiver = mpsc::UnboundedReceiver<ProcessEvent>;

/// Create the channel processes report into.
pub fn event_channel() -> (ProcessEventSender, ProcessEventReceiver) {
    mpsc::unbounded_channel()
}

/// Output or termination of a spawned process, tagged with its origin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessEvent {
    /// Raw output bytes, in the order the process produced them.
    Data { id: ProcessId, bytes: Vec<u8> },
    /// The process ended. Sent at most once per process.
    Exit { id: ProcessId, code: u32 },
}

impl ProcessEvent {
    pub fn id(&self) -> ProcessId {
        match self {
            ProcessEvent::Data { id, .. } | ProcessEvent::Exit { id, .. } => *id,
        }
    }
}

/// Everything needed to start one process on a pseudo-terminal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpawnRequest {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// The complete environment. Nothing is inherited beyond this map.
    pub env: EnvMap,
    pub cols: u16,
    pub rows: u16,
}

/// Launching a process failed. No handle exists afterwards.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("command not found: {command}")]
    NotFound { command: String },
    #[error("permission denied: {command}")]
    PermissionDenied { command: String },
    #[error("working directory does not exist: {}", .0.display())]
    MissingCwd(PathBuf),
    #[error("failed to open PTY: {0}")]
    OpenPty(String),
    #[error("failed to spawn {command}: {reason}")]
    Spawn { command: String, reason: String },
}

/// A live process attached to a pseudo-terminal.
///
/// Output and exit are delivered as [`ProcessEvent`]s through the adapter's
/// event channel from the moment of spawn. The subscriptions returned by
/// [`on_data`](Self::on_data) and [`on_exit`](Self::on_exit) stop that
/// forwarding when released.
pub trait ProcessHandle: Send {
    fn id(&self) -> ProcessId;

    /// OS process id, when the platform reports one.
    fn pid(&self) -> Option<u32>;

    /// Send input. No-op once the process has exited.
    fn write(&mut self, data: &[u8]);

    /// Best effort; failures are swallowed.
    fn resize(&mut self, cols: u16, rows: u16);

    /// Idempotent; safe on a process that already died.
    fn kill(&mut self);

    fn has_exited(&self) -> bool;

    fn on_data(&self) -> Subscription;

    fn on_exit(&self) -> Subscription;
}

/// Spawns processes on pseudo-terminals.
pub trait ProcessAdapter {
    fn spawn(&self, request: SpawnRequest) -> Result<Box<dyn ProcessHandle>, SpawnError>;
}
