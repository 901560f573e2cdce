pub mod files;
pub mod query;
pub mod state;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::EnrichError;
use crate::records::{EnrichedRecord, Fingerprint};

/// In-memory view of one day's processed-record ledger.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    seen: HashSet<Fingerprint>,
}

impl Ledger {
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.seen.contains(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn extend<'a>(&mut self, fingerprints: impl IntoIterator<Item = &'a Fingerprint>) {
        self.seen.extend(fingerprints.into_iter().cloned());
    }
}

impl FromIterator<Fingerprint> for Ledger {
    fn from_iter<I: IntoIterator<Item = Fingerprint>>(iter: I) -> Self {
        Self {
            seen: iter.into_iter().collect(),
        }
    }
}

/// Durable home of the Ledger and the Enriched Store, partitioned by day.
///
/// At most one run may write a given day at a time.
#[async_trait]
pub trait PartitionStore: Send + Sync {
    async fn load_ledger(&self, day: NaiveDate) -> Result<Ledger, EnrichError>;

    async fn load_rows(&self, day: NaiveDate) -> Result<Vec<EnrichedRecord>, EnrichError>;

    /// Persist one batch: its surviving rows, then every fingerprint the
    /// batch processed. Rows are upserted by fingerprint, so re-committing a
    /// batch never duplicates rows.
    async fn commit_batch(
        &self,
        day: NaiveDate,
        rows: &[EnrichedRecord],
        fingerprints: &[Fingerprint],
    ) -> Result<(), EnrichError>;

    /// Days with any persisted state, oldest first.
    async fn list_days(&self) -> Result<Vec<NaiveDate>, EnrichError>;
}

/// Upsert `incoming` into `existing` by fingerprint, keeping first-seen order.
pub fn merge_rows(existing: Vec<EnrichedRecord>, incoming: &[EnrichedRecord]) -> Vec<EnrichedRecord> {
    let mut rows = existing;
    let mut positions: HashMap<Fingerprint, usize> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| (row.fingerprint(), i))
        .collect();

    for row in incoming {
        match positions.get(&row.fingerprint()) {
            Some(&i) => rows[i] = row.clone(),
            None => {
                positions.insert(row.fingerprint(), rows.len());
                rows.push(row.clone());
            }
        }
    }
    rows
}
