use tandem_db::Settings;

/// Whether a definition launches a model-backed agent or a plain shell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentKind {
    Agent,
    Shell,
}

/// A command-line flag the agent understands, toggled from settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentFlag {
    pub flag: String,
    pub description: String,
}

impl AgentFlag {
    fn new(flag: &str, description: &str) -> Self {
        Self {
            flag: flag.to_string(),
            description: description.to_string(),
        }
    }
}

/// How to launch one kind of agent CLI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentDefinition {
    pub id: String,
    pub display_name: String,
    pub launch_command: String,
    pub base_args: Vec<String>,
    pub description: String,
    pub kind: AgentKind,
    /// Declared order is the order enabled flags are appended in.
    pub known_flags: Vec<AgentFlag>,
}

impl AgentDefinition {
    pub fn new(id: &str, display_name: &str, launch_command: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            launch_command: launch_command.to_string(),
            base_args: Vec::new(),
            description: String::new(),
            kind: AgentKind::Agent,
            known_flags: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: &[&str]) -> Self {
        self.base_args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_flags(mut self, flags: Vec<AgentFlag>) -> Self {
        self.known_flags = flags;
        self
    }

    pub fn shell(mut self) -> Self {
        self.kind = AgentKind::Shell;
        self
    }
}

/// The agents a user can pick from.
#[derive(Clone, Debug)]
pub struct AgentRegistry {
    agents: Vec<AgentDefinition>,
}

impl AgentRegistry {
    pub fn new(agents: Vec<AgentDefinition>) -> Self {
        Self { agents }
    }

    pub fn builtin() -> Self {
        Self::new(vec![
            AgentDefinition::new("claude", "Claude Code", "claude")
                .with_description("Anthropic's coding agent")
                .with_flags(vec![
                    AgentFlag::new("--dangerously-skip-permissions", "Skip permission prompts"),
                    AgentFlag::new("--continue", "Resume the most recent conversation"),
                    AgentFlag::new("--verbose", "Verbose output"),
                ]),
            AgentDefinition::new("codex", "Codex", "codex")
                .with_description("OpenAI's coding agent")
                .with_flags(vec![AgentFlag::new("--full-auto", "Run without approval prompts")]),
            AgentDefinition::new("gemini", "Gemini CLI", "gemini")
                .with_description("Google's coding agent")
                .with_flags(vec![
                    AgentFlag::new("--yolo", "Accept all actions automatically"),
                    AgentFlag::new("--sandbox", "Run tools in a sandbox"),
                ]),
            AgentDefinition::new("aider", "Aider", "aider")
                .with_description("AI pair programming in the terminal")
                .with_flags(vec![
                    AgentFlag::new("--yes-always", "Confirm every prompt"),
                    AgentFlag::new("--no-auto-commits", "Leave commits to the user"),
                ]),
            AgentDefinition::new("shell", "Shell", &default_shell())
                .with_description("Plain login shell")
                .shell(),
        ])
    }

    pub fn get(&self, id: &str) -> Option<&AgentDefinition> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn list(&self) -> &[AgentDefinition] {
        &self.agents
    }

    pub fn first_shell(&self) -> Option<&AgentDefinition> {
        self.agents.iter().find(|a| a.kind == AgentKind::Shell)
    }
}

/// Get the user's default shell.
pub fn default_shell() -> String {
    #[cfg(windows)]
    {
        "powershell.exe".to_string()
    }
    #[cfg(not(windows))]
    {
        std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
    }
}

/// Launch arguments for `agent`: base args, then enabled known flags in
/// declared order, then the whitespace-split extra args.
pub fn compute_args(agent: &AgentDefinition, settings: &Settings) -> Vec<String> {
    let mut args = agent.base_args.clone();
    let Some(config) = settings.agent_args(&agent.id) else {
        return args;
    };

    args.extend(
        agent
            .known_flags
            .iter()
            .filter(|f| config.flags.get(&f.flag).copied().unwrap_or(false))
            .map(|f| f.flag.clone()),
    );
    args.extend(config.extra_args.split_whitespace().map(str::to_string));
    args
}
