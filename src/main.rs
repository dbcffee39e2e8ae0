use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "clipforge")]
#[command(version, about = "Generative short-video pipeline orchestrator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit console logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline: hotspots → script → storyboard → images → video
    Run(RunArgs),
    /// Show tracked sessions, or one session in detail
    Sessions {
        /// Session id to show
        id: Option<String>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Args, Clone, Debug, Default)]
pub struct RunArgs {
    /// Topic keywords (comma-separated)
    #[arg(short, long)]
    pub keywords: Option<String>,

    /// Number of hotspots to fetch
    #[arg(short, long)]
    pub count: Option<u64>,

    /// Visual style for every prompt
    #[arg(short, long)]
    pub style: Option<String>,

    /// Target video length in seconds
    #[arg(short, long)]
    pub duration: Option<u64>,

    /// Concurrent image renders
    #[arg(long)]
    pub batch_size: Option<u64>,

    /// Skip regeneration of artifacts that fail the consistency check
    #[arg(long)]
    pub no_retry_failed: bool,

    /// Output video filename
    #[arg(short, long)]
    pub output: Option<String>,

    /// JSON file with pipeline parameters; flags override its values
    #[arg(long)]
    pub params: Option<PathBuf>,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default clipforge.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Run(args) => {
            let success = cmd::cmd_run(&project_dir, &cli, args).await?;
            if !success {
                std::process::exit(1);
            }
        }
        Commands::Sessions { id, json } => cmd::cmd_sessions(&project_dir, id.as_deref(), *json)?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}
