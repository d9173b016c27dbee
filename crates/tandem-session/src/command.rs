use std::ops::ControlFlow;
use std::path::PathBuf;
use std::time::Duration;

use tandem_db::Settings;
use tandem_pty::{EnvMap, ProcessAdapter, ProcessEventReceiver};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::buffer::TerminalBuffer;
use crate::controller::{Controller, Selection};
use crate::session::{SessionKey, SessionStatus};

/// How often deferred fit/focus work is flushed, roughly once per frame.
pub const LAYOUT_INTERVAL: Duration = Duration::from_micros(16_667);

/// Requests from the host into the control loop.
#[derive(Debug)]
pub enum Command {
    Select(Selection),
    SelectWorktree(PathBuf),
    OpenTab { worktree_path: PathBuf, agent_id: String },
    ActivateTab { worktree_path: PathBuf, tab_id: String },
    CloseTab { worktree_path: PathBuf, tab_id: String },
    RespawnActive,
    DestroyAll,
    SwitchWorkspace(EnvMap),
    Input(Vec<u8>),
    ViewportResized { cols: u16, rows: u16 },
    UpdateSettings(Settings),
    SetWorkspaceEnv(EnvMap),
    Snapshot(oneshot::Sender<Snapshot>),
    Shutdown,
}

pub type CommandSender = mpsc::UnboundedSender<Command>;
pub type CommandReceiver = mpsc::UnboundedReceiver<Command>;

pub fn command_channel() -> (CommandSender, CommandReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSummary {
    pub key: SessionKey,
    pub agent_id: Option<String>,
    pub status: SessionStatus,
    pub exit_code: Option<u32>,
    pub pid: Option<u32>,
    pub visible: bool,
}

/// Point-in-time view of the controller for hosts on other threads.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub active: Option<SessionKey>,
    pub selected_agent: Option<String>,
    /// Sorted by key.
    pub sessions: Vec<SessionSummary>,
    /// Screen text of the active session.
    pub screen: Option<String>,
}

impl<A: ProcessAdapter, B: TerminalBuffer> Controller<A, B> {
    pub fn snapshot(&self) -> Snapshot {
        let sessions = self
            .registry()
            .keys()
            .into_iter()
            .filter_map(|key| {
                let session = self.session(&key)?;
                Some(SessionSummary {
                    agent_id: session.agent_id().map(str::to_string),
                    status: session.status(),
                    exit_code: session.exit_code(),
                    pid: session.pid(),
                    visible: session.buffer().is_visible(),
                    key,
                })
            })
            .collect();

        Snapshot {
            active: self.active_key().cloned(),
            selected_agent: self.selected_agent().map(str::to_string),
            sessions,
            screen: self.active_session().map(|s| s.buffer().text()),
        }
    }

    /// Apply one host command. `Break` means the loop should stop.
    pub fn dispatch(&mut self, command: Command) -> ControlFlow<()> {
        let selected = match command {
            Command::Select(selection) => self.select(&selection).map(Some),
            Command::SelectWorktree(path) => self.select_worktree(&path),
            Command::OpenTab { worktree_path, agent_id } => {
                self.open_tab(&worktree_path, &agent_id).map(Some)
            }
            Command::ActivateTab { worktree_path, tab_id } => {
                self.activate_tab(&worktree_path, &tab_id).map(Some)
            }
            Command::CloseTab { worktree_path, tab_id } => self.close_tab(&worktree_path, &tab_id),
            Command::RespawnActive => Ok(self.respawn_active()),
            Command::DestroyAll => {
                self.destroy_all();
                Ok(None)
            }
            Command::SwitchWorkspace(env) => {
                self.switch_workspace(env);
                Ok(None)
            }
            Command::Input(bytes) => {
                self.input(&bytes);
                Ok(None)
            }
            Command::ViewportResized { cols, rows } => {
                self.viewport_resized(cols, rows);
                Ok(None)
            }
            Command::UpdateSettings(settings) => {
                self.set_settings(settings);
                Ok(None)
            }
            Command::SetWorkspaceEnv(env) => {
                self.set_workspace_env(env);
                Ok(None)
            }
            Command::Snapshot(reply) => {
                // The requester may have given up waiting.
                let _ = reply.send(self.snapshot());
                Ok(None)
            }
            Command::Shutdown => return ControlFlow::Break(()),
        };

        match selected {
            Ok(Some(outcome)) => log::debug!("selection: {outcome:?}"),
            Ok(None) => {}
            Err(e) => log::warn!("{e}"),
        }
        ControlFlow::Continue(())
    }
}

/// Drive `controller` from host commands, process events, and a layout tick
/// until [`Command::Shutdown`] arrives or every command sender is gone. All
/// sessions are destroyed on the way out.
pub async fn run_control_loop<A, B>(
    controller: &mut Controller<A, B>,
    commands: &mut CommandReceiver,
    events: &mut ProcessEventReceiver,
) where
    A: ProcessAdapter,
    B: TerminalBuffer,
{
    let mut layout = tokio::time::interval(LAYOUT_INTERVAL);
    layout.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    log::debug!("command channel closed");
                    break;
                };
                if controller.dispatch(command).is_break() {
                    log::debug!("shutdown requested");
                    break;
                }
            }
            Some(event) = events.recv() => {
                controller.handle_process_event(event);
            }
            _ = layout.tick() => {
                controller.layout_pass();
            }
        }
    }

    controller.destroy_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentDefinition, AgentRegistry};
    use crate::testing::{FakeAdapter, RecordingBuffer};
    use tandem_pty::{event_channel, PtyAdapter};
    use tandem_vt::VtTerminal;

    async fn snapshot(commands: &CommandSender) -> Snapshot {
        let (tx, rx) = oneshot::channel();
        commands.send(Command::Snapshot(tx)).unwrap();
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn test_loop_applies_commands_and_shuts_down() {
        let adapter = FakeAdapter::new();
        let mut controller: Controller<FakeAdapter, RecordingBuffer> =
            Controller::new(adapter.clone(), AgentRegistry::builtin(), RecordingBuffer::default);
        let (cmd_tx, mut cmd_rx) = command_channel();
        let (_event_tx, mut event_rx) = event_channel();

        let driver = async {
            cmd_tx
                .send(Command::Select(Selection::new("/wt", "t1", "claude")))
                .unwrap();
            cmd_tx.send(Command::Input(b"hi".to_vec())).unwrap();
            let snap = snapshot(&cmd_tx).await;
            cmd_tx.send(Command::Shutdown).unwrap();
            snap
        };
        let ((), snap) = tokio::join!(
            run_control_loop(&mut controller, &mut cmd_rx, &mut event_rx),
            driver
        );

        assert_eq!(snap.active, Some(SessionKey::new("/wt", "t1")));
        assert_eq!(snap.selected_agent.as_deref(), Some("claude"));
        assert_eq!(snap.sessions.len(), 1);
        assert_eq!(snap.sessions[0].status, SessionStatus::Running);
        assert!(snap.sessions[0].visible);
        assert_eq!(adapter.last().written(), b"hi");

        assert!(controller.registry().is_empty());
        assert_eq!(adapter.last().kills(), 1);
    }

    #[tokio::test]
    async fn test_loop_ends_when_senders_drop() {
        let adapter = FakeAdapter::new();
        let mut controller: Controller<FakeAdapter, RecordingBuffer> =
            Controller::new(adapter.clone(), AgentRegistry::builtin(), RecordingBuffer::default);
        let (cmd_tx, mut cmd_rx) = command_channel();
        let (_event_tx, mut event_rx) = event_channel();

        cmd_tx.send(Command::SelectWorktree("/wt".into())).unwrap();
        drop(cmd_tx);
        run_control_loop(&mut controller, &mut cmd_rx, &mut event_rx).await;

        assert_eq!(adapter.spawn_count(), 1);
        assert!(controller.registry().is_empty());
    }

    #[test]
    fn test_dispatch_reports_errors_without_stopping() {
        let mut controller: Controller<FakeAdapter, RecordingBuffer> =
            Controller::new(FakeAdapter::new(), AgentRegistry::builtin(), RecordingBuffer::default);

        let flow = controller.dispatch(Command::Select(Selection::new("/wt", "t1", "nope")));

        assert!(flow.is_continue());
        assert!(controller.dispatch(Command::Shutdown).is_break());
    }

    #[tokio::test]
    async fn test_real_process_output_and_exit() {
        let (event_tx, mut event_rx) = event_channel();
        let agents = AgentRegistry::new(vec![AgentDefinition::new("sh", "sh", "/bin/sh")
            .with_args(&["-c", "printf tandem-ok; exit 3"])
            .shell()]);
        let mut controller = Controller::new(PtyAdapter::new(event_tx), agents, || {
            VtTerminal::new(80, 24)
        });
        let (cmd_tx, mut cmd_rx) = command_channel();
        let cwd = std::env::temp_dir();

        let driver = async {
            cmd_tx
                .send(Command::Select(Selection::new(cwd.clone(), "t1", "sh")))
                .unwrap();
            let mut snap = Snapshot::default();
            for _ in 0..200 {
                tokio::time::sleep(Duration::from_millis(25)).await;
                snap = snapshot(&cmd_tx).await;
                if snap.sessions.first().map(|s| s.status) == Some(SessionStatus::Exited) {
                    break;
                }
            }
            cmd_tx.send(Command::Shutdown).unwrap();
            snap
        };
        let ((), snap) = tokio::join!(
            run_control_loop(&mut controller, &mut cmd_rx, &mut event_rx),
            driver
        );

        let session = &snap.sessions[0];
        assert_eq!(session.status, SessionStatus::Exited);
        assert_eq!(session.exit_code, Some(3));
        let screen = snap.screen.unwrap();
        assert!(screen.contains("tandem-ok"), "screen was {screen:?}");
        assert!(screen.contains("[Process exited with code 3]"));
    }
}
