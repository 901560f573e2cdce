use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use cnidarium::{StateDelta, StateRead, StateWrite, Storage};
use futures::StreamExt;
use tracing::debug;

use super::{Ledger, PartitionStore};
use crate::error::EnrichError;
use crate::records::{EnrichedRecord, Fingerprint};

// Key prefixes (no trailing slashes, per cnidarium convention)
const LEDGER_PREFIX: &str = "ledger";
const ROWS_PREFIX: &str = "enriched";

fn ledger_key(day: NaiveDate, fingerprint: &Fingerprint) -> String {
    format!("{}/{}/{}", LEDGER_PREFIX, day.format("%Y-%m-%d"), fingerprint)
}
fn row_key(day: NaiveDate, fingerprint: &Fingerprint) -> String {
    format!("{}/{}/{}", ROWS_PREFIX, day.format("%Y-%m-%d"), fingerprint)
}
fn day_prefix(prefix: &str, day: NaiveDate) -> String {
    format!("{}/{}/", prefix, day.format("%Y-%m-%d"))
}

fn store_err(e: anyhow::Error) -> EnrichError {
    EnrichError::Store(format!("{e:#}"))
}

/// Partitions kept in a cnidarium store. A batch's rows and fingerprints go
/// into a single `StateDelta`, so they become visible together or not at all.
///
/// Rows are keyed by fingerprint and come back in key order.
pub struct StateStore {
    storage: Storage,
}

impl StateStore {
    pub async fn new(data_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let prefixes = vec![LEDGER_PREFIX.to_string(), ROWS_PREFIX.to_string()];
        let storage = Storage::load(data_dir.to_path_buf(), prefixes).await?;
        Ok(Self { storage })
    }
}

#[async_trait]
impl PartitionStore for StateStore {
    async fn load_ledger(&self, day: NaiveDate) -> Result<Ledger, EnrichError> {
        let snapshot = self.storage.latest_snapshot();
        let prefix = day_prefix(LEDGER_PREFIX, day);
        let mut stream = Box::pin(snapshot.prefix_raw(&prefix));
        let mut ledger = Ledger::default();
        let mut line = 0;

        while let Some(entry) = stream.next().await {
            line += 1;
            let corrupt = |reason: String| EnrichError::LedgerCorruption {
                partition: day,
                line,
                reason,
            };
            let (key, _) = entry.map_err(|e| corrupt(format!("{e:#}")))?;
            let fingerprint = key
                .strip_prefix(&prefix)
                .and_then(Fingerprint::parse)
                .ok_or_else(|| corrupt(format!("bad ledger key {key:?}")))?;
            ledger.extend([&fingerprint]);
        }
        Ok(ledger)
    }

    async fn load_rows(&self, day: NaiveDate) -> Result<Vec<EnrichedRecord>, EnrichError> {
        let snapshot = self.storage.latest_snapshot();
        let mut stream = Box::pin(snapshot.prefix_raw(&day_prefix(ROWS_PREFIX, day)));
        let mut rows = Vec::new();

        while let Some(entry) = stream.next().await {
            let (key, value) = entry.map_err(store_err)?;
            let row = serde_json::from_slice::<EnrichedRecord>(&value)
                .map_err(|e| EnrichError::Store(format!("{key}: {e}")))?;
            rows.push(row);
        }
        Ok(rows)
    }

    async fn commit_batch(
        &self,
        day: NaiveDate,
        rows: &[EnrichedRecord],
        fingerprints: &[Fingerprint],
    ) -> Result<(), EnrichError> {
        let snapshot = self.storage.latest_snapshot();
        let mut delta = StateDelta::new(snapshot);

        for row in rows {
            let bytes = serde_json::to_vec(row)
                .map_err(|e| EnrichError::Store(format!("serialize row: {e}")))?;
            delta.put_raw(row_key(day, &row.fingerprint()), bytes);
        }
        for fingerprint in fingerprints {
            delta.put_raw(ledger_key(day, fingerprint), vec![1]);
        }

        self.storage.commit(delta).await.map_err(store_err)?;
        debug!(
            %day,
            rows = rows.len(),
            fingerprints = fingerprints.len(),
            "batch committed to state store"
        );
        Ok(())
    }

    async fn list_days(&self) -> Result<Vec<NaiveDate>, EnrichError> {
        let snapshot = self.storage.latest_snapshot();
        let mut days = BTreeSet::new();

        for prefix in [LEDGER_PREFIX, ROWS_PREFIX] {
            let mut stream = Box::pin(snapshot.prefix_raw(prefix));
            while let Some(entry) = stream.next().await {
                let (key, _) = entry.map_err(store_err)?;
                // Key format: "{prefix}/{day}/{fingerprint}"
                let day = key
                    .split('/')
                    .nth(1)
                    .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());
                if let Some(day) = day {
                    days.insert(day);
                }
            }
        }
        Ok(days.into_iter().collect())
    }
}
