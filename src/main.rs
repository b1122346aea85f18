use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use synforge::cmd::{cmd_config_show, cmd_reset, cmd_run, cmd_status};

#[derive(Parser)]
#[command(name = "orch")]
#[command(version, about = "Autonomous code-generation orchestrator")]
pub struct Cli {
    /// Project directory to operate on; defaults to the current directory.
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Auto-approve every command-sandbox confirmation prompt.
    #[arg(long, global = true)]
    pub yes: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Break a natural-language request into features and drive them to
    /// completion.
    Run { request: String },
    /// Print feature statuses from the persisted project state.
    Status,
    /// Soft-delete the project marker directory to trash.
    Reset {
        #[arg(long)]
        force: bool,
    },
    /// Configuration commands.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective merged configuration.
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let project_dir = match &cli.project_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("failed to get current directory")?,
    };

    match &cli.command {
        Commands::Run { request } => cmd_run(&project_dir, request, cli.yes).await?,
        Commands::Status => cmd_status(&project_dir)?,
        Commands::Reset { force } => cmd_reset(&project_dir, *force)?,
        Commands::Config { command } => match command {
            ConfigCommands::Show => cmd_config_show(&project_dir)?,
        },
    }

    Ok(())
}
