use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{merge_rows, Ledger, PartitionStore};
use crate::error::EnrichError;
use crate::records::{EnrichedRecord, Fingerprint};

const LEDGER_DIR: &str = "processed_hashes";
const ROWS_DIR: &str = "enriched";

/// Plain-file partitions: `processed_hashes/<day>.txt` holds one hex digest
/// per line, `enriched/<day>.jsonl` one enriched row per line. Set-valued
/// columns are JSON arrays, so CSV readers cannot load these partitions.
///
/// Every write rewrites the whole partition file through a temp file and a
/// rename, so a crash leaves either the old or the new file.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub async fn new(root: &Path) -> Result<Self, EnrichError> {
        tokio::fs::create_dir_all(root.join(LEDGER_DIR)).await?;
        tokio::fs::create_dir_all(root.join(ROWS_DIR)).await?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn ledger_path(&self, day: NaiveDate) -> PathBuf {
        self.root
            .join(LEDGER_DIR)
            .join(format!("{}.txt", day.format("%Y-%m-%d")))
    }

    pub fn rows_path(&self, day: NaiveDate) -> PathBuf {
        self.root
            .join(ROWS_DIR)
            .join(format!("{}.jsonl", day.format("%Y-%m-%d")))
    }

    /// Ledger digests in file order.
    async fn read_ledger(&self, day: NaiveDate) -> Result<Vec<Fingerprint>, EnrichError> {
        let corrupt = |line: usize, reason: String| EnrichError::LedgerCorruption {
            partition: day,
            line,
            reason,
        };
        let contents = match tokio::fs::read_to_string(self.ledger_path(day)).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(corrupt(0, e.to_string())),
        };

        let mut fingerprints = Vec::new();
        for (i, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fingerprint = Fingerprint::parse(line)
                .ok_or_else(|| corrupt(i + 1, format!("not a hex digest: {line:?}")))?;
            fingerprints.push(fingerprint);
        }
        Ok(fingerprints)
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), EnrichError> {
    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn day_from_file_name(path: &Path) -> Option<NaiveDate> {
    let stem = path.file_stem()?.to_str()?;
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}

#[async_trait]
impl PartitionStore for FileStore {
    async fn load_ledger(&self, day: NaiveDate) -> Result<Ledger, EnrichError> {
        Ok(self.read_ledger(day).await?.into_iter().collect())
    }

    async fn load_rows(&self, day: NaiveDate) -> Result<Vec<EnrichedRecord>, EnrichError> {
        let path = self.rows_path(day);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str::<EnrichedRecord>(line).map_err(|e| {
                    EnrichError::Store(format!("{}:{}: {}", path.display(), i + 1, e))
                })
            })
            .collect()
    }

    async fn commit_batch(
        &self,
        day: NaiveDate,
        rows: &[EnrichedRecord],
        fingerprints: &[Fingerprint],
    ) -> Result<(), EnrichError> {
        if !rows.is_empty() {
            let merged = merge_rows(self.load_rows(day).await?, rows);
            let mut out = String::new();
            for row in &merged {
                let line = serde_json::to_string(row)
                    .map_err(|e| EnrichError::Store(format!("serialize row: {e}")))?;
                out.push_str(&line);
                out.push('\n');
            }
            write_atomic(&self.rows_path(day), out.as_bytes()).await?;
        }

        if !fingerprints.is_empty() {
            let mut existing = self.read_ledger(day).await?;
            let mut ledger: Ledger = existing.iter().cloned().collect();
            for fingerprint in fingerprints {
                if !ledger.contains(fingerprint) {
                    ledger.extend([fingerprint]);
                    existing.push(fingerprint.clone());
                }
            }
            let mut out = String::with_capacity(existing.len() * (Fingerprint::HEX_LEN + 1));
            for fingerprint in &existing {
                out.push_str(fingerprint.as_str());
                out.push('\n');
            }
            write_atomic(&self.ledger_path(day), out.as_bytes()).await?;
        }

        debug!(
            %day,
            rows = rows.len(),
            fingerprints = fingerprints.len(),
            "partition files rewritten"
        );
        Ok(())
    }

    async fn list_days(&self) -> Result<Vec<NaiveDate>, EnrichError> {
        let mut days = std::collections::BTreeSet::new();
        for dir in [LEDGER_DIR, ROWS_DIR] {
            let mut entries = tokio::fs::read_dir(self.root.join(dir)).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let is_partition = matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("txt") | Some("jsonl")
                );
                if let Some(day) = day_from_file_name(&path).filter(|_| is_partition) {
                    days.insert(day);
                }
            }
        }
        Ok(days.into_iter().collect())
    }
}
