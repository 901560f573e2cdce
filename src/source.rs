use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::EnrichError;

/// A snapshot row before deduplication and id assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRow {
    pub text: String,
    pub post_time: NaiveDate,
    pub scrape_time: NaiveDate,
}

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub rows: Vec<SnapshotRow>,
    /// Rows skipped for missing text or unparseable dates.
    pub dropped: usize,
}

/// Returns the full current table of posts on every call.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<Snapshot, EnrichError>;
}

/// Reads a JSON array or JSON Lines export of the post table.
pub struct FileSnapshotSource {
    path: PathBuf,
}

impl FileSnapshotSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl SnapshotSource for FileSnapshotSource {
    async fn fetch(&self) -> Result<Snapshot, EnrichError> {
        let unavailable =
            |reason: String| EnrichError::SourceUnavailable(format!("{}: {}", self.path.display(), reason));
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        let objects = parse_objects(&contents).map_err(unavailable)?;

        let mut snapshot = Snapshot::default();
        for (i, object) in objects.iter().enumerate() {
            match row_from_object(object) {
                Some(row) => snapshot.rows.push(row),
                None => {
                    warn!(row = i + 1, "dropping snapshot row without text or valid dates");
                    snapshot.dropped += 1;
                }
            }
        }
        info!(
            path = %self.path.display(),
            rows = snapshot.rows.len(),
            dropped = snapshot.dropped,
            "snapshot loaded"
        );
        Ok(snapshot)
    }
}

fn parse_objects(contents: &str) -> Result<Vec<Map<String, Value>>, String> {
    let values: Vec<Value> = if contents.trim_start().starts_with('[') {
        serde_json::from_str(contents).map_err(|e| e.to_string())?
    } else {
        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| serde_json::from_str(line).map_err(|e| format!("line {}: {}", i + 1, e)))
            .collect::<Result<_, _>>()?
    };

    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| match v {
            Value::Object(map) => Ok(map),
            _ => Err(format!("row {} is not an object", i + 1)),
        })
        .collect()
}

/// First present, non-null field among `keys`.
fn field<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| object.get(*k))
        .find(|v| !v.is_null())
}

fn row_from_object(object: &Map<String, Value>) -> Option<SnapshotRow> {
    let text = field(object, &["text", "tweetText"])?.as_str()?.to_string();
    let post_time = parse_day(field(object, &["postTime", "postTimeRaw"])?.as_str()?)?;
    let scrape_time = parse_day(field(object, &["scrapeTime", "scrapeTime_Date"])?.as_str()?)?;
    Some(SnapshotRow {
        text,
        post_time,
        scrape_time,
    })
}

/// Reduce a date or date-time string to its calendar date.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(day);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.date())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_parse_day_formats() {
        assert_eq!(parse_day("2024-01-01"), Some(day("2024-01-01")));
        assert_eq!(parse_day("2024-01-01T23:30:00+07:00"), Some(day("2024-01-01")));
        assert_eq!(parse_day("2024-01-01T10:00:00.000Z"), Some(day("2024-01-01")));
        assert_eq!(parse_day("2024-01-01 08:15:00"), Some(day("2024-01-01")));
        assert_eq!(parse_day("yesterday"), None);
    }

    #[tokio::test]
    async fn test_reads_jsonl_with_scraper_column_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posts.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"tweetText": "ระบบล่ม", "postTimeRaw": "2024-01-01T09:00:00+07:00", "scrapeTime": "2024-01-02T00:00:00Z"}"#,
                "\n\n",
                r#"{"text": "no date", "postTime": null, "scrapeTime": "2024-01-02"}"#,
                "\n",
                r#"{"text": "หอในดี", "postTime": "2024-01-01", "scrapeTime": "2024-01-02"}"#,
                "\n",
            ),
        )
        .unwrap();

        let snapshot = FileSnapshotSource::new(&path).fetch().await.unwrap();
        assert_eq!(snapshot.rows.len(), 2);
        assert_eq!(snapshot.dropped, 1);
        assert_eq!(snapshot.rows[0].text, "ระบบล่ม");
        assert_eq!(snapshot.rows[0].post_time, day("2024-01-01"));
        assert_eq!(snapshot.rows[1].scrape_time, day("2024-01-02"));
    }

    #[tokio::test]
    async fn test_reads_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posts.json");
        std::fs::write(
            &path,
            r#"[{"text": "a", "postTime": "2024-01-01", "scrapeTime": "2024-01-01"}]"#,
        )
        .unwrap();
        let snapshot = FileSnapshotSource::new(&path).fetch().await.unwrap();
        assert_eq!(snapshot.rows.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_or_broken_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let missing = FileSnapshotSource::new(dir.path().join("absent.jsonl"));
        assert!(matches!(
            missing.fetch().await,
            Err(EnrichError::SourceUnavailable(_))
        ));

        let path = dir.path().join("broken.jsonl");
        std::fs::write(&path, "{not json\n").unwrap();
        assert!(matches!(
            FileSnapshotSource::new(&path).fetch().await,
            Err(EnrichError::SourceUnavailable(_))
        ));
    }
}
