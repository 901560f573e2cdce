use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::error::EnrichError;
use crate::llm::LlmClient;
use crate::store::files::FileStore;
use crate::store::state::StateStore;
use crate::store::PartitionStore;

/// Where the topic/subtopic vocabulary handed to each batch comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VocabularyPolicy {
    /// Every batch starts from empty vocabularies. The default.
    Empty,
    /// Labels returned by earlier batches of the run feed later batches.
    Accumulate,
    /// Like `Accumulate`, seeded from recent Enriched Store partitions.
    SeedFromStore,
}

impl FromStr for VocabularyPolicy {
    type Err = EnrichError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "empty" => Ok(Self::Empty),
            "accumulate" => Ok(Self::Accumulate),
            "seed-from-store" | "seed_from_store" => Ok(Self::SeedFromStore),
            other => Err(EnrichError::Configuration(format!(
                "unknown vocabulary policy '{other}' (expected empty, accumulate, seed-from-store)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Ledger text file plus JSON Lines table per day.
    Files,
    /// cnidarium versioned key-value store.
    State,
}

impl FromStr for StoreBackend {
    type Err = EnrichError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "files" => Ok(Self::Files),
            "state" => Ok(Self::State),
            other => Err(EnrichError::Configuration(format!(
                "unknown store backend '{other}' (expected files, state)"
            ))),
        }
    }
}

/// Everything a run needs, resolved up front and passed in explicitly.
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    pub data_dir: PathBuf,
    pub source_path: Option<PathBuf>,
    pub batch_size: usize,
    pub classify_timeout: Duration,
    pub vocabulary: VocabularyPolicy,
    pub seed_lookback_days: u32,
    pub min_text_chars: usize,
    pub store: StoreBackend,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            source_path: None,
            batch_size: 50,
            classify_timeout: Duration::from_secs(120),
            vocabulary: VocabularyPolicy::Empty,
            seed_lookback_days: 7,
            min_text_chars: 3,
            store: StoreBackend::Files,
        }
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match dotenv::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{key}={raw}: {e}")),
        _ => Ok(None),
    }
}

impl EnrichConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(dir) = env_parse::<PathBuf>("ENRICH_DATA_DIR")? {
            config.data_dir = dir;
        }
        config.source_path = env_parse::<PathBuf>("ENRICH_SOURCE")?;
        if let Some(n) = env_parse::<usize>("ENRICH_BATCH_SIZE")? {
            config.batch_size = n;
        }
        if let Some(secs) = env_parse::<u64>("ENRICH_CLASSIFY_TIMEOUT_SECS")? {
            config.classify_timeout = Duration::from_secs(secs);
        }
        if let Some(policy) = env_parse::<VocabularyPolicy>("ENRICH_VOCABULARY")? {
            config.vocabulary = policy;
        }
        if let Some(days) = env_parse::<u32>("ENRICH_SEED_LOOKBACK_DAYS")? {
            config.seed_lookback_days = days;
        }
        if let Some(n) = env_parse::<usize>("ENRICH_MIN_TEXT_CHARS")? {
            config.min_text_chars = n;
        }
        if let Some(backend) = env_parse::<StoreBackend>("ENRICH_STORE")? {
            config.store = backend;
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EnrichError> {
        if self.batch_size == 0 {
            return Err(EnrichError::Configuration(
                "batch size must be at least 1".to_string(),
            ));
        }
        if self.classify_timeout.is_zero() {
            return Err(EnrichError::Configuration(
                "classify timeout must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct AppState {
    pub config: EnrichConfig,
    pub store: Arc<dyn PartitionStore>,
}

impl AppState {
    pub async fn open(config: EnrichConfig) -> Result<Self> {
        config.validate()?;
        let store: Arc<dyn PartitionStore> = match config.store {
            StoreBackend::Files => Arc::new(FileStore::new(&config.data_dir).await?),
            StoreBackend::State => Arc::new(
                StateStore::new(&config.data_dir.join("state"))
                    .await
                    .context("Failed to open state store")?,
            ),
        };
        Ok(Self { config, store })
    }

    pub fn llm(&self) -> Result<Arc<LlmClient>> {
        Ok(Arc::new(LlmClient::from_env()?))
    }
}
