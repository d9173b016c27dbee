use std::path::{Path, PathBuf};

use tandem_db::Settings;
use tandem_pty::{EnvMap, ProcessAdapter, ProcessEvent, ProcessId, SpawnError, SpawnRequest};
use thiserror::Error;

use crate::agents::{compute_args, AgentDefinition, AgentRegistry};
use crate::buffer::TerminalBuffer;
use crate::env;
use crate::registry::Registry;
use crate::session::{Session, SessionKey, SessionStatus};
use crate::tabs::TabBook;
use crate::visibility::Visibility;

/// What the user picked: a tab in a worktree, running an agent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    pub worktree_path: PathBuf,
    pub tab_id: String,
    pub agent_id: String,
}

impl Selection {
    pub fn new(worktree_path: impl Into<PathBuf>, tab_id: &str, agent_id: &str) -> Self {
        Self {
            worktree_path: worktree_path.into(),
            tab_id: tab_id.to_string(),
            agent_id: agent_id.to_string(),
        }
    }
}

/// How a selection was satisfied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectOutcome {
    /// A new process was started.
    Spawned(ProcessId),
    /// A spawn was attempted and failed; the buffer explains why.
    SpawnFailed,
    /// The existing session was shown as-is.
    Shown,
    /// The worktree changed onto a session already bound to another agent.
    /// That agent is now the selected one and nothing was respawned.
    AgentRestored(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectError {
    #[error("unknown agent: {0}")]
    UnknownAgent(String),
    #[error("no tab {tab_id} in {}", worktree_path.display())]
    UnknownTab { worktree_path: PathBuf, tab_id: String },
}

/// Drives sessions in response to user selections and process events.
///
/// Owns the registry, so everything here runs on one thread. Processes report
/// back through [`handle_process_event`](Self::handle_process_event).
pub struct Controller<A, B> {
    adapter: A,
    agents: AgentRegistry,
    registry: Registry<B>,
    visibility: Visibility,
    tabs: TabBook,
    settings: Settings,
    base_env: EnvMap,
    workspace_env: EnvMap,
    selected_agent: Option<String>,
    current_worktree: Option<PathBuf>,
}

impl<A: ProcessAdapter, B: TerminalBuffer> Controller<A, B> {
    pub fn new(adapter: A, agents: AgentRegistry, make_buffer: impl Fn() -> B + 'static) -> Self {
        Self {
            adapter,
            agents,
            registry: Registry::new(make_buffer),
            visibility: Visibility::new(),
            tabs: TabBook::new(),
            settings: Settings::default(),
            base_env: env::base_env(),
            workspace_env: EnvMap::new(),
            selected_agent: None,
            current_worktree: None,
        }
    }

    /// Replace the lowest environment layer.
    pub fn with_base_env(mut self, base_env: EnvMap) -> Self {
        self.base_env = base_env;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Applies to future spawns only.
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    /// Applies to future spawns only.
    pub fn set_workspace_env(&mut self, env: EnvMap) {
        self.workspace_env = env;
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn registry(&self) -> &Registry<B> {
        &self.registry
    }

    pub fn tabs(&self) -> &TabBook {
        &self.tabs
    }

    pub fn selected_agent(&self) -> Option<&str> {
        self.selected_agent.as_deref()
    }

    pub fn active_key(&self) -> Option<&SessionKey> {
        self.visibility.active()
    }

    pub fn active_session(&self) -> Option<&Session<B>> {
        self.registry.get(self.visibility.active()?)
    }

    pub fn session(&self, key: &SessionKey) -> Option<&Session<B>> {
        self.registry.get(key)
    }

    /// Show the selected session, spawning when it has never run or is bound
    /// to a different agent.
    pub fn select(&mut self, selection: &Selection) -> Result<SelectOutcome, SelectError> {
        let agent = self
            .agents
            .get(&selection.agent_id)
            .cloned()
            .ok_or_else(|| SelectError::UnknownAgent(selection.agent_id.clone()))?;

        let key = SessionKey::new(selection.worktree_path.clone(), selection.tab_id.clone());
        let worktree_changed =
            self.current_worktree.as_deref() != Some(selection.worktree_path.as_path());
        self.current_worktree = Some(selection.worktree_path.clone());

        let session = self.registry.get_or_create(&key);
        let previous_agent = session.agent_id().map(str::to_string);
        let ever_spawned = session.ever_spawned();
        let running = session.status() == SessionStatus::Running;
        self.visibility.show(&key, &mut self.registry);

        if worktree_changed && running {
            if let Some(previous) = previous_agent.as_ref().filter(|p| **p != agent.id) {
                log::debug!("{key}: keeping {previous} instead of switching to {}", agent.id);
                self.selected_agent = Some(previous.clone());
                self.tabs.touch(&key.worktree_path, &key.tab_id, previous);
                return Ok(SelectOutcome::AgentRestored(previous.clone()));
            }
        }

        self.selected_agent = Some(agent.id.clone());
        self.tabs.touch(&key.worktree_path, &key.tab_id, &agent.id);

        if !ever_spawned || previous_agent.as_deref() != Some(agent.id.as_str()) {
            return Ok(self.respawn(&key, &agent));
        }
        Ok(SelectOutcome::Shown)
    }

    /// Show the active tab of `worktree`, opening a default tab first when the
    /// worktree has none and settings allow it. `None` means nothing is shown.
    pub fn select_worktree(
        &mut self,
        worktree: &Path,
    ) -> Result<Option<SelectOutcome>, SelectError> {
        if self.tabs.tabs(worktree).is_empty() {
            if !self.settings.auto_default_tab {
                self.current_worktree = Some(worktree.to_path_buf());
                self.visibility.hide_all(&mut self.registry);
                return Ok(None);
            }
            let agent = self.default_agent()?;
            log::debug!("opening default {} tab in {}", agent.id, worktree.display());
            self.tabs.add(worktree, &agent.id, &agent.display_name);
        }

        let Some(tab) = self.tabs.active(worktree).cloned() else {
            return Ok(None);
        };
        self.select(&Selection::new(worktree, &tab.id, &tab.agent_id))
            .map(Some)
    }

    /// Add a tab running `agent_id` to `worktree` and show it.
    pub fn open_tab(
        &mut self,
        worktree: &Path,
        agent_id: &str,
    ) -> Result<SelectOutcome, SelectError> {
        let agent = self
            .agents
            .get(agent_id)
            .ok_or_else(|| SelectError::UnknownAgent(agent_id.to_string()))?;
        let tab = self.tabs.add(worktree, &agent.id, &agent.display_name);
        self.select(&Selection::new(worktree, &tab.id, &tab.agent_id))
    }

    pub fn activate_tab(
        &mut self,
        worktree: &Path,
        tab_id: &str,
    ) -> Result<SelectOutcome, SelectError> {
        let tab = self
            .tabs
            .set_active(worktree, tab_id)
            .cloned()
            .ok_or_else(|| SelectError::UnknownTab {
                worktree_path: worktree.to_path_buf(),
                tab_id: tab_id.to_string(),
            })?;
        self.select(&Selection::new(worktree, &tab.id, &tab.agent_id))
    }

    /// Destroy a tab's session and drop the tab. Closing the visible tab shows
    /// the worktree's new active tab, if one remains.
    pub fn close_tab(
        &mut self,
        worktree: &Path,
        tab_id: &str,
    ) -> Result<Option<SelectOutcome>, SelectError> {
        let key = SessionKey::new(worktree, tab_id);
        let was_active = self.visibility.active() == Some(&key);

        self.destroy(&key);
        self.tabs.remove(worktree, tab_id);

        if !was_active {
            return Ok(None);
        }
        match self.tabs.active(worktree).cloned() {
            Some(tab) => self
                .select(&Selection::new(worktree, &tab.id, &tab.agent_id))
                .map(Some),
            None => Ok(None),
        }
    }

    /// Restart the visible session with the selected agent. `None` when
    /// nothing is visible or no agent is known for it.
    pub fn respawn_active(&mut self) -> Option<SelectOutcome> {
        let key = self.visibility.active()?.clone();
        let agent_id = match &self.selected_agent {
            Some(id) => id.clone(),
            None => self.registry.get(&key)?.agent_id()?.to_string(),
        };
        let Some(agent) = self.agents.get(&agent_id).cloned() else {
            log::warn!("{key}: cannot respawn unknown agent {agent_id}");
            return None;
        };
        Some(self.respawn(&key, &agent))
    }

    pub fn destroy(&mut self, key: &SessionKey) -> bool {
        self.visibility.forget(key);
        self.registry.destroy(key)
    }

    /// End every session. Tabs are kept; revisiting one starts fresh.
    pub fn destroy_all(&mut self) -> usize {
        self.visibility.clear();
        self.current_worktree = None;
        let count = self.registry.destroy_all();
        if count > 0 {
            log::info!("destroyed {count} session(s)");
        }
        count
    }

    /// Leave the current workspace: end every session, forget its tabs, and
    /// use `env` as the override layer from now on.
    pub fn switch_workspace(&mut self, env: EnvMap) {
        self.destroy_all();
        self.tabs = TabBook::new();
        self.selected_agent = None;
        self.workspace_env = env;
    }

    /// Route process output or exit to its session. Events from processes no
    /// session holds anymore are dropped.
    pub fn handle_process_event(&mut self, event: ProcessEvent) -> Option<SessionKey> {
        let Some(key) = self.registry.find_by_process(event.id()) else {
            log::trace!("dropping event from stale process {}", event.id());
            return None;
        };
        let session = self.registry.get_mut(&key)?;

        match event {
            ProcessEvent::Data { bytes, .. } => {
                session.buffer_mut().write(&bytes);
                // Terminal query replies go straight back.
                session.forward_local_events();
            }
            ProcessEvent::Exit { code, .. } => {
                log::info!("{key}: process exited with code {code}");
                session.mark_exited(code);
                session.buffer_mut().write(exit_message(code).as_bytes());
            }
        }
        Some(key)
    }

    /// Keystrokes for the visible session.
    pub fn input(&mut self, bytes: &[u8]) -> bool {
        let Some(key) = self.visibility.active() else {
            return false;
        };
        let Some(session) = self.registry.get_mut(key) else {
            return false;
        };
        session.buffer_mut().key_input(bytes);
        session.forward_local_events();
        true
    }

    pub fn viewport_resized(&mut self, cols: u16, rows: u16) {
        if let Some(key) = self.visibility.viewport_resized(cols, rows, &mut self.registry) {
            if let Some(session) = self.registry.get_mut(&key) {
                session.forward_local_events();
            }
        }
    }

    /// Run deferred fit and focus for a newly shown session.
    pub fn layout_pass(&mut self) {
        if let Some(key) = self.visibility.layout_pass(&mut self.registry) {
            if let Some(session) = self.registry.get_mut(&key) {
                session.forward_local_events();
            }
        }
    }

    fn default_agent(&self) -> Result<AgentDefinition, SelectError> {
        self.agents
            .get(&self.settings.default_agent_id)
            .or_else(|| self.agents.first_shell())
            .cloned()
            .ok_or_else(|| SelectError::UnknownAgent(self.settings.default_agent_id.clone()))
    }

    /// Kill whatever runs in `key`, wipe the buffer, and launch `agent` there.
    fn respawn(&mut self, key: &SessionKey, agent: &AgentDefinition) -> SelectOutcome {
        let args = compute_args(agent, &self.settings);
        let env = env::resolve(&self.base_env, &self.settings.providers, &self.workspace_env);

        let Some(session) = self.registry.get_mut(key) else {
            return SelectOutcome::SpawnFailed;
        };
        session.release_process();
        session.buffer_mut().clear();
        session.buffer_mut().reset();
        session.buffer_mut().take_local_events();
        session.begin_spawn(&agent.id);

        let (cols, rows) = session.buffer().size();
        let request = SpawnRequest {
            command: agent.launch_command.clone(),
            args,
            cwd: key.worktree_path.clone(),
            env,
            cols,
            rows,
        };
        log::info!("{key}: spawning {} ({})", agent.id, agent.launch_command);

        match self.adapter.spawn(request) {
            Ok(process) => {
                let id = process.id();
                session.attach(process);
                SelectOutcome::Spawned(id)
            }
            Err(e) => {
                log::warn!("{key}: failed to spawn {}: {e}", agent.launch_command);
                let message = spawn_failure_message(&agent.launch_command, &e);
                session.buffer_mut().write(message.as_bytes());
                session.set_status(SessionStatus::Exited);
                SelectOutcome::SpawnFailed
            }
        }
    }
}

fn exit_message(code: u32) -> String {
    format!("\r\n\x1b[90m[Process exited with code {code}]\x1b[0m\r\n")
}

fn spawn_failure_message(command: &str, error: &SpawnError) -> String {
    format!(
        "\x1b[31mCould not start \"{command}\": {error}\x1b[0m\r\n\
         \x1b[90mCheck that \"{command}\" is installed and on your PATH.\x1b[0m\r\n"
    )
}
