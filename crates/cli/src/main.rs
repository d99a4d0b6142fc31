// crates/cli/src/main.rs
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use context_pack_client::{HttpBackend, PackBackend};
use tracing_subscriber::EnvFilter;

mod commands;
mod prompt;
mod render;
mod settings;

use settings::{FileSettings, FlagOverrides, Settings};

#[derive(Parser)]
#[command(name = "context-pack")]
#[command(about = "Follow and control Context Pack processing jobs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Backend base URL (overrides CONTEXT_PACK_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Bearer token (overrides CONTEXT_PACK_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Settings file (default: $CONFIG_DIR/context-pack/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a pack until every source finishes
    Watch {
        pack_id: String,

        /// Poll interval in milliseconds (overrides CONTEXT_PACK_POLL_MS)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Never ask on credit checks; print a hint instead. A source left
        /// ready for analysis keeps the watch running until it is started
        /// elsewhere (`context-pack start`) or Ctrl-C is pressed twice.
        #[arg(long)]
        no_prompt: bool,
    },

    /// Print the current status of every source once
    Status {
        pack_id: String,

        /// Print presentation views as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start analysis for a source
    Start {
        source_id: String,

        /// Analyze at most this many chunks
        #[arg(long)]
        max_chunks: Option<u32>,
    },

    /// Cancel processing for a source
    Cancel { source_id: String },

    /// Download a finished pack
    Download {
        pack_id: String,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,context_pack=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let file = match cli.config.clone().or_else(settings::default_path) {
        Some(path) => FileSettings::load(&path)?,
        None => FileSettings::default(),
    };
    let flags = FlagOverrides {
        api_url: cli.api_url.clone(),
        token: cli.token.clone(),
        poll_interval_ms: match &cli.command {
            Commands::Watch { interval_ms, .. } => *interval_ms,
            _ => None,
        },
    };
    let settings = Settings::resolve(file, |key| std::env::var(key).ok(), flags)?;
    tracing::debug!(api_url = %settings.client.base_url, "settings resolved");

    let backend: Arc<dyn PackBackend> =
        Arc::new(HttpBackend::new(settings.client.clone()).context("failed to create HTTP client")?);

    match cli.command {
        Commands::Watch {
            pack_id, no_prompt, ..
        } => commands::watch(backend, &pack_id, &settings.polling, !no_prompt).await,
        Commands::Status { pack_id, json } => commands::status(backend.as_ref(), &pack_id, json).await,
        Commands::Start {
            source_id,
            max_chunks,
        } => commands::start(backend.as_ref(), &source_id, max_chunks).await,
        Commands::Cancel { source_id } => commands::cancel(backend.as_ref(), &source_id).await,
        Commands::Download { pack_id, output } => {
            commands::download(backend, &pack_id, output.as_deref()).await
        }
    }
}
