use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use draftsync::config::{CliOverrides, DraftsyncConfig};
use draftsync::logging::{LoggingOptions, init_logging};

mod cmd;

#[derive(Parser)]
#[command(name = "draftsync")]
#[command(version, about = "Keep project submission drafts in sync with the remote record store")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit diagnostics as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Remote base URL. Overrides draftsync.toml and DRAFTSYNC_BASE_URL.
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Signed-in user. Overrides draftsync.toml and DRAFTSYNC_USER_EMAIL.
    #[arg(long, global = true)]
    pub user_email: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the .draftsync directory with a default configuration
    Init,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Classify a remote failure and print the result as JSON
    Classify {
        /// HTTP status; omit for a failure without a response
        #[arg(long)]
        status: Option<u16>,
        /// Message body; repeat for a list of messages
        #[arg(long, default_value = "")]
        message: Vec<String>,
    },
    /// Inspect or discard a cached draft
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// Save a draft document explicitly
    Save {
        #[command(flatten)]
        draft: DraftArgs,
        /// Run a best-effort auto-save cycle through this step instead
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        step: Option<u8>,
    },
    /// Validate, save every step and submit a draft for publication
    Publish {
        #[command(flatten)]
        draft: DraftArgs,
    },
    /// Run one auto-save cycle through every step
    Sync {
        #[command(flatten)]
        draft: DraftArgs,
        /// Use an in-memory remote and print the calls that would be made
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(clap::Args, Clone)]
pub struct DraftArgs {
    /// Draft document (JSON)
    #[arg(long)]
    pub draft: PathBuf,
    /// Identity of a draft the remote side already holds
    #[arg(long)]
    pub draft_id: Option<String>,
    /// Cache session key; defaults to the draft file name
    #[arg(long)]
    pub session: Option<String>,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
}

#[derive(Subcommand, Clone)]
pub enum CacheCommands {
    /// Print the cached snapshot
    Show {
        #[arg(long)]
        session: String,
    },
    /// Delete the cached snapshot
    Discard {
        #[arg(long)]
        session: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    if let Commands::Init = cli.command {
        return cmd::cmd_init(&project_dir);
    }

    let config = DraftsyncConfig::new(project_dir)?
        .with_cli_overrides(CliOverrides {
            base_url: cli.base_url.clone(),
            user_email: cli.user_email.clone(),
            ..Default::default()
        })
        .with_verbose(cli.verbose);

    let _log_guard = init_logging(&LoggingOptions {
        verbose: cli.verbose,
        json: cli.log_json,
        log_dir: config.is_initialized().then(|| config.log_dir()),
    })?;

    match &cli.command {
        Commands::Init => {}
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
        Commands::Classify { status, message } => cmd::cmd_classify(*status, message)?,
        Commands::Cache { command } => cmd::cmd_cache(&config, command.clone())?,
        Commands::Save { draft, step } => cmd::cmd_save(&config, draft, *step).await?,
        Commands::Publish { draft } => cmd::cmd_publish(&config, draft).await?,
        Commands::Sync { draft, dry_run } => cmd::cmd_sync(&config, draft, *dry_run).await?,
    }

    Ok(())
}
