//! monitor-study CLI entry point.

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use monitor_study::config::Config;
use monitor_study::llm::{Completer as _, CompletionClient};
use monitor_study::messaging::{ConsoleAdapter, MessagingDyn};
use monitor_study::monitor::Monitor;
use monitor_study::settings::PersistedToggle;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "monitor-study")]
#[command(about = "Watches group chat for configured members and talks them back into studying")]
struct Cli {
    /// Path to config file (optional)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Read events as JSON lines from stdin and write replies to stdout (default)
    Run,
    /// Print the persisted monitoring state
    Status,
    /// Send one message to the completion endpoint and print the reply
    Ask {
        /// Text to send as the user message
        text: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // A missing .env is fine; values may come from the real environment.
    let dotenv_path = dotenvy::dotenv().ok();

    // Logs go to stderr so stdout stays free for the console adapter.
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(path) = dotenv_path {
        tracing::debug!(path = %path.display(), "loaded .env");
    }

    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?
    } else {
        Config::load().with_context(|| "failed to load configuration from environment")?
    };

    tracing::info!(data_dir = %config.data_dir.display(), "configuration loaded");

    match cli.command.unwrap_or(Command::Run) {
        Command::Status => {
            let toggle = open_toggle(&config)?;
            let state = if toggle.is_enabled() { "enabled" } else { "disabled" };
            println!("monitoring {state} ({})", toggle.path().display());
            Ok(())
        }
        Command::Ask { text } => {
            let client = CompletionClient::new(&config.llm)?;
            let reply = client.complete(&text).await?;
            println!("{reply}");
            Ok(())
        }
        Command::Run => {
            let toggle = Arc::new(open_toggle(&config)?);
            run(config, toggle).await
        }
    }
}

fn open_toggle(config: &Config) -> anyhow::Result<PersistedToggle> {
    PersistedToggle::open(config.state_path(), config.monitor.enabled_by_default)
        .with_context(|| "failed to initialize monitoring state")
}

async fn run(config: Config, toggle: Arc<PersistedToggle>) -> anyhow::Result<()> {
    let completer = Arc::new(
        CompletionClient::new(&config.llm).with_context(|| "failed to build completion client")?,
    );
    tracing::info!(endpoint = completer.endpoint(), model = completer.model(), "completion client ready");

    let adapter: Arc<dyn MessagingDyn> = Arc::new(ConsoleAdapter::stdio());
    let inbound = adapter
        .start()
        .await
        .with_context(|| format!("failed to start {} adapter", adapter.name()))?;

    let monitor = Monitor::new(&config.monitor, toggle, completer, adapter.clone());

    tokio::select! {
        result = monitor.run(inbound) => {
            result?;
            tracing::info!("inbound stream ended");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    adapter.shutdown().await?;
    tracing::info!("monitor-study stopped");
    Ok(())
}
