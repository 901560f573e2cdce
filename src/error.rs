use std::io;

use chrono::NaiveDate;
use thiserror::Error;

/// Failures of an enrichment run.
///
/// Records the classifier judged irrelevant are not errors; they are counted
/// as discarded in the run report.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("source snapshot unavailable: {0}")]
    SourceUnavailable(String),
    /// `batch` is 1-based. Batches before it are durable.
    #[error("classification of batch {batch} failed after {persisted_batches} persisted batch(es): {reason}")]
    BatchClassificationFailure {
        batch: usize,
        persisted_batches: usize,
        reason: String,
    },
    #[error("ledger for {partition} is corrupt at line {line}: {reason}")]
    LedgerCorruption {
        partition: NaiveDate,
        line: usize,
        reason: String,
    },
    #[error("enriched store failure: {0}")]
    Store(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}
