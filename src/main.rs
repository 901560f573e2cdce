mod classify;
mod commands;
mod error;
mod llm;
mod pipeline;
mod records;
mod source;
mod state;
mod store;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use commands::Command;
use state::{AppState, EnrichConfig, StoreBackend, VocabularyPolicy};

#[derive(Parser, Debug)]
#[command(name = "post-enricher")]
#[command(about = "Incrementally label social-media posts with topics, subtopics and sentiment")]
#[command(version)]
struct Cli {
    /// Directory holding ledgers and enriched partitions; overrides ENRICH_DATA_DIR
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Storage backend: files | state
    #[arg(long, global = true)]
    store: Option<StoreBackend>,

    /// Posts per classifier request
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Seconds to wait for one classifier reply
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Vocabulary policy: empty | accumulate | seed-from-store
    #[arg(long, global = true)]
    vocabulary: Option<VocabularyPolicy>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn apply(&self, config: &mut EnrichConfig) {
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(store) = self.store {
            config.store = store;
        }
        if let Some(n) = self.batch_size {
            config.batch_size = n;
        }
        if let Some(secs) = self.timeout_secs {
            config.classify_timeout = Duration::from_secs(secs);
        }
        if let Some(policy) = self.vocabulary {
            config.vocabulary = policy;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load env
    let _ = dotenv::dotenv();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = EnrichConfig::from_env()?;
    cli.apply(&mut config);

    let state = AppState::open(config).await?;
    info!(
        data_dir = %state.config.data_dir.display(),
        store = ?state.config.store,
        "storage opened"
    );

    commands::dispatch(cli.command, state).await
}
