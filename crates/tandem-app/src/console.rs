//! Line-oriented host: reads commands from stdin, forwards them to the control
//! loop, and persists settings and workspace overrides.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use rusqlite::Connection;
use tandem_db::Settings;
use tandem_pty::EnvMap;
use tandem_session::{AgentRegistry, Command, CommandSender, Selection, Snapshot, SessionStatus};
use tokio::sync::oneshot;

const HELP: &str = "\
commands:
  wt <worktree>                    show a worktree's active tab
  open <worktree> <agent>          open a new tab
  tab <worktree> <tab>             switch tabs
  select <worktree> <tab> <agent>  show a tab, switching its agent
  close <worktree> <tab>           close a tab
  send <text>                      type text and press enter
  resize <cols> <rows>             resize the viewport
  respawn                          restart the visible session
  destroy-all                      end every session
  ls | screen | agents             inspect state
  default-agent <agent>
  auto-tab on|off
  flag <agent> <flag> on|off
  extra <agent> [args...]
  provider <id> key|url <value>
  provider <id> on|off
  env <KEY>=<VALUE> | unenv <KEY>
  quit";

/// One parsed input line.
#[derive(Debug)]
pub enum Action {
    Send(Command),
    List,
    Screen,
    Agents,
    Help,
    Settings(SettingsEdit),
    Env(EnvEdit),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SettingsEdit {
    DefaultAgent(String),
    AutoDefaultTab(bool),
    Flag { agent: String, flag: String, enabled: bool },
    ExtraArgs { agent: String, args: String },
    ProviderKey { id: String, key: String },
    ProviderUrl { id: String, url: String },
    ProviderEnabled { id: String, enabled: bool },
}

impl SettingsEdit {
    pub fn apply(self, settings: &mut Settings) -> Result<()> {
        match self {
            SettingsEdit::DefaultAgent(agent) => settings.default_agent_id = agent,
            SettingsEdit::AutoDefaultTab(on) => settings.auto_default_tab = on,
            SettingsEdit::Flag { agent, flag, enabled } => {
                settings.agent_args.entry(agent).or_default().flags.insert(flag, enabled);
            }
            SettingsEdit::ExtraArgs { agent, args } => {
                settings.agent_args.entry(agent).or_default().extra_args = args;
            }
            SettingsEdit::ProviderKey { id, key } => provider(settings, &id)?.api_key = key,
            SettingsEdit::ProviderUrl { id, url } => provider(settings, &id)?.base_url = url,
            SettingsEdit::ProviderEnabled { id, enabled } => {
                provider(settings, &id)?.enabled = enabled
            }
        }
        Ok(())
    }
}

fn provider<'a>(
    settings: &'a mut Settings,
    id: &str,
) -> Result<&'a mut tandem_db::ProviderConfig> {
    settings
        .providers
        .iter_mut()
        .find(|p| p.id == id)
        .ok_or_else(|| anyhow!("unknown provider: {id}"))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnvEdit {
    Set(String, String),
    Unset(String),
}

impl EnvEdit {
    pub fn apply(self, env: &mut EnvMap) {
        match self {
            EnvEdit::Set(key, value) => {
                env.insert(key, value);
            }
            EnvEdit::Unset(key) => {
                env.remove(&key);
            }
        }
    }
}

fn on_off(word: &str) -> Result<bool> {
    match word {
        "on" => Ok(true),
        "off" => Ok(false),
        other => bail!("expected on or off, got {other:?}"),
    }
}

/// Parse one line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<Action>> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let args: Vec<&str> = rest.split_whitespace().collect();

    let action = match (word, args.as_slice()) {
        ("", _) => return Ok(None),
        ("wt", [path]) => Action::Send(Command::SelectWorktree(PathBuf::from(path))),
        ("open", [path, agent]) => Action::Send(Command::OpenTab {
            worktree_path: PathBuf::from(path),
            agent_id: agent.to_string(),
        }),
        ("tab", [path, tab]) => Action::Send(Command::ActivateTab {
            worktree_path: PathBuf::from(path),
            tab_id: tab.to_string(),
        }),
        ("select", [path, tab, agent]) => {
            Action::Send(Command::Select(Selection::new(*path, tab, agent)))
        }
        ("close", [path, tab]) => Action::Send(Command::CloseTab {
            worktree_path: PathBuf::from(path),
            tab_id: tab.to_string(),
        }),
        ("send", _) => Action::Send(Command::Input(format!("{rest}\r").into_bytes())),
        ("resize", [cols, rows]) => Action::Send(Command::ViewportResized {
            cols: cols.parse().context("invalid column count")?,
            rows: rows.parse().context("invalid row count")?,
        }),
        ("respawn", []) => Action::Send(Command::RespawnActive),
        ("destroy-all", []) => Action::Send(Command::DestroyAll),
        ("quit" | "exit", []) => Action::Send(Command::Shutdown),
        ("ls", []) => Action::List,
        ("screen", []) => Action::Screen,
        ("agents", []) => Action::Agents,
        ("help" | "?", _) => Action::Help,
        ("default-agent", [agent]) => Action::Settings(SettingsEdit::DefaultAgent(agent.to_string())),
        ("auto-tab", [on]) => Action::Settings(SettingsEdit::AutoDefaultTab(on_off(on)?)),
        ("flag", [agent, flag, on]) => Action::Settings(SettingsEdit::Flag {
            agent: agent.to_string(),
            flag: flag.to_string(),
            enabled: on_off(on)?,
        }),
        ("extra", [agent, extra @ ..]) => Action::Settings(SettingsEdit::ExtraArgs {
            agent: agent.to_string(),
            args: extra.join(" "),
        }),
        ("provider", [id, "key", key]) => Action::Settings(SettingsEdit::ProviderKey {
            id: id.to_string(),
            key: key.to_string(),
        }),
        ("provider", [id, "url", url]) => Action::Settings(SettingsEdit::ProviderUrl {
            id: id.to_string(),
            url: url.to_string(),
        }),
        ("provider", [id, on]) => Action::Settings(SettingsEdit::ProviderEnabled {
            id: id.to_string(),
            enabled: on_off(on)?,
        }),
        ("env", [pair]) => {
            let (key, value) = pair
                .split_once('=')
                .filter(|(key, _)| !key.is_empty())
                .ok_or_else(|| anyhow!("expected KEY=VALUE"))?;
            Action::Env(EnvEdit::Set(key.to_string(), value.to_string()))
        }
        ("unenv", [key]) => Action::Env(EnvEdit::Unset(key.to_string())),
        _ => bail!("unrecognized command: {line} (try help)"),
    };
    Ok(Some(action))
}

/// Owns the host side of the command channel plus the persisted configuration.
pub struct Console {
    commands: CommandSender,
    conn: Connection,
    settings: Settings,
    workspace_id: String,
    workspace_env: EnvMap,
    agents: AgentRegistry,
}

impl Console {
    pub fn new(
        commands: CommandSender,
        conn: Connection,
        settings: Settings,
        workspace_id: String,
        workspace_env: EnvMap,
        agents: AgentRegistry,
    ) -> Self {
        Self {
            commands,
            conn,
            settings,
            workspace_id,
            workspace_env,
            agents,
        }
    }

    /// Process lines until input ends or the user quits. Dropping the
    /// console closes the command channel.
    pub fn run(mut self, input: impl BufRead, mut out: impl Write) -> Result<()> {
        for line in input.lines() {
            let line = line.context("failed to read input")?;
            let action = match parse_line(&line) {
                Ok(Some(action)) => action,
                Ok(None) => continue,
                Err(e) => {
                    writeln!(out, "error: {e:#}")?;
                    continue;
                }
            };

            let quit = matches!(action, Action::Send(Command::Shutdown));
            if let Err(e) = self.perform(action, &mut out) {
                writeln!(out, "error: {e:#}")?;
            }
            if quit {
                break;
            }
        }
        Ok(())
    }

    fn perform(&mut self, action: Action, out: &mut impl Write) -> Result<()> {
        match action {
            Action::Send(command) => self.send(command)?,
            Action::List => print_sessions(&self.snapshot()?, out)?,
            Action::Screen => match self.snapshot()?.screen {
                Some(screen) => writeln!(out, "{screen}")?,
                None => writeln!(out, "(no active session)")?,
            },
            Action::Agents => {
                for agent in self.agents.list() {
                    writeln!(out, "{:<8} {:<12} {}", agent.id, agent.display_name, agent.launch_command)?;
                    for flag in &agent.known_flags {
                        writeln!(out, "         {:<32} {}", flag.flag, flag.description)?;
                    }
                }
            }
            Action::Help => writeln!(out, "{HELP}")?,
            Action::Settings(edit) => {
                edit.apply(&mut self.settings)?;
                tandem_db::settings::save_settings(&self.conn, &self.settings)?;
                self.send(Command::UpdateSettings(self.settings.clone()))?;
            }
            Action::Env(edit) => {
                edit.apply(&mut self.workspace_env);
                tandem_db::workspace_env::set_workspace_env(
                    &mut self.conn,
                    &self.workspace_id,
                    &self.workspace_env,
                )?;
                self.send(Command::SetWorkspaceEnv(self.workspace_env.clone()))?;
            }
        }
        Ok(())
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("control loop has stopped"))
    }

    fn snapshot(&self) -> Result<Snapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.blocking_recv().context("control loop has stopped")
    }
}

fn print_sessions(snapshot: &Snapshot, out: &mut impl Write) -> Result<()> {
    if snapshot.sessions.is_empty() {
        writeln!(out, "(no sessions)")?;
    }
    for session in &snapshot.sessions {
        let marker = if Some(&session.key) == snapshot.active.as_ref() { '*' } else { ' ' };
        let agent = session.agent_id.as_deref().unwrap_or("-");
        write!(out, "{marker} {:<40} {:<8} {}", session.key.to_string(), agent, session.status)?;
        match (session.status, session.exit_code, session.pid) {
            (SessionStatus::Exited, Some(code), _) => writeln!(out, " ({code})")?,
            (SessionStatus::Running, _, Some(pid)) => writeln!(out, " pid {pid}")?,
            _ => writeln!(out)?,
        }
    }
    Ok(())
}
