use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "autofix")]
#[command(version, about = "Autonomous repository maintenance: triage issues, generate fixes, heal the pipeline")]
pub struct Cli {
    /// Log at debug level regardless of RUST_LOG
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Repository working tree (defaults to GITHUB_WORKSPACE, then the current directory)
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify the triggering webhook event and act on it
    HandleEvent {
        /// Event payload (defaults to GITHUB_EVENT_PATH)
        #[arg(long)]
        event_path: Option<PathBuf>,
    },
    /// Run the fix pipeline for one issue
    Fix {
        #[arg(long)]
        issue: u64,
        /// Treat the issue as a feature request
        #[arg(long)]
        implement: bool,
    },
    /// Triage one issue
    Triage {
        #[arg(long)]
        issue: u64,
    },
    /// Run the project's checks and track failures as issues
    SelfTest {
        /// Name recorded in the self-test log
        #[arg(long, default_value = "scheduled")]
        check: String,
    },
    /// Restore missing or corrupted pipeline artifacts
    Recover,
    /// Print the automation state of an issue without changing anything
    Status {
        #[arg(long)]
        issue: u64,
    },
}

fn init_logging(cli: &Cli) {
    let filter = if cli.verbose {
        EnvFilter::new("autofix=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("autofix=info"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match cli.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = autofix::config::Config::load(cli.workspace.clone())?;
    tracing::debug!(?config, "Loaded configuration");

    match &cli.command {
        Commands::HandleEvent { event_path } => cmd::cmd_handle_event(&config, event_path.as_deref()).await?,
        Commands::Fix { issue, implement } => cmd::cmd_fix(&config, *issue, *implement).await?,
        Commands::Triage { issue } => cmd::cmd_triage(&config, *issue).await?,
        Commands::SelfTest { check } => cmd::cmd_self_test(&config, check).await?,
        Commands::Recover => cmd::cmd_recover(&config).await?,
        Commands::Status { issue } => cmd::cmd_status(&config, *issue).await?,
    }

    Ok(())
}
