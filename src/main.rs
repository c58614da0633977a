use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use storyforge::config::StoryforgeConfig;
use storyforge::store::SessionStatus;
use storyforge::telemetry::{LogSettings, init_tracing};

mod cmd;

#[derive(Parser)]
#[command(name = "storyforge")]
#[command(version, about = "Inspect and manage story-to-video pipeline sessions")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding storyforge.toml, the session database and lock files
    #[arg(long, global = true, env = "STORYFORGE_HOME")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List sessions, most recently updated first
    Sessions {
        /// Only show sessions with this status (running, paused, completed, failed)
        #[arg(short, long)]
        status: Option<SessionStatus>,
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show one session with its state summary
    Show { session_id: String },
    /// Print the full pipeline state as JSON
    State { session_id: String },
    /// List the checkpoints of a session
    Checkpoints {
        session_id: String,
        /// Include input and output summaries
        #[arg(long)]
        details: bool,
    },
    /// Delete a session and its checkpoints
    Delete {
        session_id: String,
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default storyforge.toml file
    Init,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = StoryforgeConfig::with_cli_args(cli.data_dir.clone(), cli.verbose)?;
    let _log_guard = init_tracing(&LogSettings::from_config(&config))?;

    match &cli.command {
        Commands::Sessions {
            status,
            limit,
            json,
        } => cmd::cmd_sessions(&config, *status, *limit, *json)?,
        Commands::Show { session_id } => cmd::cmd_show(&config, session_id)?,
        Commands::State { session_id } => cmd::cmd_state(&config, session_id)?,
        Commands::Checkpoints {
            session_id,
            details,
        } => cmd::cmd_checkpoints(&config, session_id, *details)?,
        Commands::Delete { session_id, force } => cmd::cmd_delete(&config, session_id, *force)?,
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
    }

    Ok(())
}
