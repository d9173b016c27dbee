mod console;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tandem_pty::{event_channel, PtyAdapter};
use tandem_session::{command_channel, run_control_loop, AgentRegistry, Command, Controller};
use tandem_vt::VtTerminal;

use console::Console;

#[derive(Parser)]
#[command(name = "tandem")]
#[command(about = "Run AI coding agents side by side in per-worktree terminal tabs")]
#[command(version)]
struct Cli {
    /// Database file (defaults to ~/.tandem/tandem.db)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Workspace whose environment overrides apply
    #[arg(short, long, default_value = "default")]
    workspace: String,

    /// Worktree to show on startup
    #[arg(long)]
    worktree: Option<PathBuf>,

    /// Viewport width in columns
    #[arg(long, default_value_t = tandem_vt::DEFAULT_COLS)]
    cols: u16,

    /// Viewport height in rows
    #[arg(long, default_value_t = tandem_vt::DEFAULT_ROWS)]
    rows: u16,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db_path = match cli.db {
        Some(path) => path,
        None => tandem_home()?.join("tandem.db"),
    };
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let conn = tandem_db::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    let settings = tandem_db::settings::load_settings(&conn)?;
    let workspace_env = tandem_db::workspace_env::get_workspace_env(&conn, &cli.workspace)?;
    log::info!(
        "workspace {} with {} override(s), default agent {}",
        cli.workspace,
        workspace_env.len(),
        settings.default_agent_id
    );

    let agents = AgentRegistry::builtin();
    let (event_tx, mut event_rx) = event_channel();
    let (cols, rows) = (cli.cols, cli.rows);
    let mut controller = Controller::new(PtyAdapter::new(event_tx), agents.clone(), move || {
        VtTerminal::new(cols, rows)
    });
    controller.set_settings(settings.clone());
    controller.set_workspace_env(workspace_env.clone());
    controller.viewport_resized(cols, rows);

    let (cmd_tx, mut cmd_rx) = command_channel();
    if let Some(worktree) = cli.worktree {
        cmd_tx
            .send(Command::SelectWorktree(worktree))
            .map_err(|_| anyhow::anyhow!("command channel closed"))?;
    }

    let console = Console::new(cmd_tx, conn, settings, cli.workspace, workspace_env, agents);
    std::thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            if let Err(e) = console.run(stdin.lock(), std::io::stdout()) {
                log::error!("console stopped: {e:#}");
            }
        })
        .context("failed to spawn console thread")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to build runtime")?;
    runtime.block_on(run_control_loop(&mut controller, &mut cmd_rx, &mut event_rx));

    log::info!("all sessions ended");
    Ok(())
}

/// `~/.tandem`, where the database lives by default.
fn tandem_home() -> Result<PathBuf> {
    let home = std::env::var_os("HOME").context("could not determine home directory")?;
    Ok(PathBuf::from(home).join(".tandem"))
}
