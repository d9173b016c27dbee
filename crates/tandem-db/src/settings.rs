use std::collections::BTreeMap;
use std::fmt;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// Settings key holding the JSON-encoded [`Settings`].
pub const SETTINGS_KEY: &str = "settings";

/// Agent used when a worktree gets its first tab and nothing else is configured.
pub const DEFAULT_AGENT_ID: &str = "shell";

pub fn get(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM settings WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// User-facing launch settings for agent sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_agent_id: String,
    /// Per-agent flag toggles and extra arguments, keyed by agent id.
    pub agent_args: BTreeMap<String, AgentArgs>,
    pub providers: Vec<ProviderConfig>,
    /// Open a tab for the default agent when a worktree with no tabs is selected.
    pub auto_default_tab: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_agent_id: DEFAULT_AGENT_ID.to_string(),
            agent_args: BTreeMap::new(),
            providers: ProviderConfig::builtin(),
            auto_default_tab: true,
        }
    }
}

impl Settings {
    pub fn agent_args(&self, agent_id: &str) -> Option<&AgentArgs> {
        self.agent_args.get(agent_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentArgs {
    /// Flag string -> enabled.
    pub flags: BTreeMap<String, bool>,
    /// Free-form, whitespace-separated.
    pub extra_args: String,
}

/// Credentials for one model provider, injected into agent environments.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub id: String,
    pub name: String,
    pub env_var_name: String,
    pub api_key: String,
    pub base_url: String,
    pub enabled: bool,
}

impl ProviderConfig {
    pub fn new(id: &str, name: &str, env_var_name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            env_var_name: env_var_name.to_string(),
            ..Self::default()
        }
    }

    /// Providers offered out of the box, all disabled.
    pub fn builtin() -> Vec<Self> {
        vec![
            Self::new("anthropic", "Anthropic", "ANTHROPIC_API_KEY"),
            Self::new("openai", "OpenAI", "OPENAI_API_KEY"),
            Self::new("google", "Google Gemini", "GEMINI_API_KEY"),
        ]
    }
}

// Keeps API keys out of logs.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = if self.api_key.is_empty() { "" } else { "<redacted>" };
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("env_var_name", &self.env_var_name)
            .field("api_key", &key)
            .field("base_url", &self.base_url)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Load settings, falling back to defaults when none were saved yet.
pub fn load_settings(conn: &Connection) -> crate::Result<Settings> {
    match get(conn, SETTINGS_KEY)? {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(Settings::default()),
    }
}

pub fn save_settings(conn: &Connection, settings: &Settings) -> crate::Result<()> {
    let json = serde_json::to_string(settings)?;
    set(conn, SETTINGS_KEY, &json)?;
    Ok(())
}
