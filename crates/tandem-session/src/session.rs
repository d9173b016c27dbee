use std::fmt;
use std::path::{Path, PathBuf};

use tandem_pty::{Gate, ProcessHandle, ProcessId, SubscriptionSet};

use crate::buffer::TerminalBuffer;

/// Identifies a session: one tab in one worktree.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    pub worktree_path: PathBuf,
    pub tab_id: String,
}

impl SessionKey {
    pub fn new(worktree_path: impl Into<PathBuf>, tab_id: impl Into<String>) -> Self {
        Self {
            worktree_path: worktree_path.into(),
            tab_id: tab_id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.worktree_path.display(), self.tab_id)
    }
}

/// Lifecycle of a session's process slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Uninitialized,
    Spawning,
    Running,
    Exited,
}

impl SessionStatus {
    /// Allowed edges: anything but `Spawning` may start a spawn, a spawn
    /// settles into `Running` or `Exited`, and a running process may exit.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Uninitialized | Running | Exited, Spawning)
                | (Spawning, Running)
                | (Spawning, Exited)
                | (Running, Exited)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Uninitialized => "uninitialized",
            SessionStatus::Spawning => "spawning",
            SessionStatus::Running => "running",
            SessionStatus::Exited => "exited",
        };
        f.write_str(s)
    }
}

/// Gates for buffer-side events bound to the current process.
struct LocalWiring {
    input: Gate,
    resize: Gate,
}

/// One terminal buffer plus, at most, one attached process.
///
/// `process` is present exactly when the status is `Running`.
pub struct Session<B> {
    key: SessionKey,
    agent_id: Option<String>,
    process: Option<Box<dyn ProcessHandle>>,
    buffer: B,
    subscriptions: SubscriptionSet,
    wiring: Option<LocalWiring>,
    status: SessionStatus,
    exit_code: Option<u32>,
    ever_spawned: bool,
    /// Every status this session has held, oldest first.
    #[cfg(test)]
    pub(crate) history: Vec<SessionStatus>,
}

impl<B: TerminalBuffer> Session<B> {
    pub(crate) fn new(key: SessionKey, buffer: B) -> Self {
        Self {
            key,
            agent_id: None,
            process: None,
            buffer,
            subscriptions: SubscriptionSet::new(),
            wiring: None,
            status: SessionStatus::Uninitialized,
            exit_code: None,
            ever_spawned: false,
            #[cfg(test)]
            history: vec![SessionStatus::Uninitialized],
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn worktree_path(&self) -> &Path {
        &self.key.worktree_path
    }

    /// The agent most recently launched here, successfully or not.
    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn exit_code(&self) -> Option<u32> {
        self.exit_code
    }

    /// True once any spawn has succeeded here.
    pub fn ever_spawned(&self) -> bool {
        self.ever_spawned
    }

    pub fn process_id(&self) -> Option<ProcessId> {
        self.process.as_ref().map(|p| p.id())
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|p| p.pid())
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut B {
        &mut self.buffer
    }

    pub(crate) fn set_status(&mut self, next: SessionStatus) {
        if !self.status.can_transition_to(next) {
            log::error!("session {}: illegal transition {} -> {}", self.key, self.status, next);
            debug_assert!(false, "illegal session transition {} -> {}", self.status, next);
        }
        self.status = next;
        #[cfg(test)]
        self.history.push(next);
    }

    pub(crate) fn begin_spawn(&mut self, agent_id: &str) {
        self.agent_id = Some(agent_id.to_string());
        self.exit_code = None;
        self.set_status(SessionStatus::Spawning);
    }

    /// Bind a freshly spawned process. Subscriptions are recorded in release
    /// order: data, input, resize, exit.
    pub(crate) fn attach(&mut self, process: Box<dyn ProcessHandle>) {
        let input = Gate::open();
        let resize = Gate::open();

        let mut subscriptions = SubscriptionSet::new();
        subscriptions.push(process.on_data());
        subscriptions.push(input.subscription());
        subscriptions.push(resize.subscription());
        subscriptions.push(process.on_exit());

        self.subscriptions = subscriptions;
        self.wiring = Some(LocalWiring { input, resize });
        self.process = Some(process);
        self.ever_spawned = true;
        self.set_status(SessionStatus::Running);
    }

    /// Release subscriptions, then kill and drop the process. No-op without one.
    pub(crate) fn release_process(&mut self) {
        self.subscriptions.dispose_all();
        self.wiring = None;
        if let Some(mut process) = self.process.take() {
            log::debug!("session {}: killing process {}", self.key, process.id());
            process.kill();
            self.set_status(SessionStatus::Exited);
        }
    }

    /// The attached process ended on its own.
    pub(crate) fn mark_exited(&mut self, code: u32) {
        self.subscriptions.dispose_all();
        self.wiring = None;
        self.process = None;
        self.exit_code = Some(code);
        self.set_status(SessionStatus::Exited);
    }

    /// Drain the buffer's local events into the process, honouring the gates.
    /// Events with nowhere to go are dropped.
    pub(crate) fn forward_local_events(&mut self) {
        let events = self.buffer.take_local_events();
        let (Some(process), Some(wiring)) = (self.process.as_mut(), self.wiring.as_ref()) else {
            return;
        };

        for event in events {
            match event {
                tandem_vt::LocalEvent::Input(bytes) if wiring.input.is_open() => {
                    process.write(&bytes);
                }
                tandem_vt::LocalEvent::Resize { cols, rows } if wiring.resize.is_open() => {
                    process.resize(cols, rows);
                }
                _ => {}
            }
        }
    }

    /// Tear everything down. The session is unusable afterwards.
    pub(crate) fn dispose(&mut self) {
        self.release_process();
        self.buffer.dispose();
    }
}

impl<B> fmt::Debug for Session<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("agent_id", &self.agent_id)
            .field("status", &self.status)
            .field("exit_code", &self.exit_code)
            .finish()
    }
}
