use std::collections::HashMap;

use tracing::warn;

use crate::records::{ClassificationResult, EnrichedRecord, SourceRecord};

#[derive(Debug, Default)]
pub struct Reconciled {
    pub rows: Vec<EnrichedRecord>,
    /// Results with no topic or no subtopic.
    pub discarded: usize,
    /// Results whose id matched no source record.
    pub unmatched: usize,
}

/// Join classifier results back onto their source records by id.
///
/// Results are flattened across batches and ordered by id. Rows missing a
/// topic or subtopic are dropped; the caller still marks their source
/// records processed.
pub fn reconcile(
    batches: impl IntoIterator<Item = Vec<ClassificationResult>>,
    records: &[SourceRecord],
) -> Reconciled {
    let mut results: Vec<ClassificationResult> = batches.into_iter().flatten().collect();
    results.sort_by_key(|r| r.id);

    let by_id: HashMap<u64, &SourceRecord> = records.iter().map(|r| (r.id, r)).collect();
    let mut out = Reconciled::default();

    for result in results {
        let Some(source) = by_id.get(&result.id) else {
            warn!(id = result.id, "classification result has no source record");
            out.unmatched += 1;
            continue;
        };
        if result.topic.is_empty() || result.subtopic.is_empty() {
            out.discarded += 1;
            continue;
        }
        out.rows.push(EnrichedRecord {
            topic: result.topic,
            subtopic: result.subtopic,
            sentiment: result.sentiment,
            text: source.text.clone(),
            post_time: source.post_time,
            scrape_time: source.scrape_time,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::NaiveDate;

    use super::*;
    use crate::records::Sentiment;

    fn source(id: u64, text: &str) -> SourceRecord {
        SourceRecord {
            id,
            text: text.to_string(),
            post_time: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            scrape_time: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        }
    }

    fn result(id: u64, topic: &[&str], subtopic: &[&str]) -> ClassificationResult {
        ClassificationResult {
            id,
            topic: topic.iter().map(|s| s.to_string()).collect(),
            subtopic: subtopic.iter().map(|s| s.to_string()).collect(),
            sentiment: BTreeSet::from([Sentiment::Negative]),
        }
    }

    #[test]
    fn test_join_recovers_source_metadata() {
        let records = vec![source(1, "ระบบลงทะเบียนล่ม"), source(2, "หอในดี")];
        let out = reconcile(
            vec![vec![result(2, &["หอพัก"], &["ไฟ"])], vec![result(1, &["ระบบ"], &["ล่ม"])]],
            &records,
        );
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.rows[0].text, "ระบบลงทะเบียนล่ม");
        assert_eq!(out.rows[0].scrape_time, records[0].scrape_time);
        assert_eq!(out.rows[1].text, "หอในดี");
    }

    #[test]
    fn test_empty_topic_or_subtopic_is_discarded() {
        let records = vec![source(1, "a"), source(2, "b"), source(3, "c")];
        let out = reconcile(
            vec![vec![
                result(1, &[], &[]),
                result(2, &["t"], &[]),
                result(3, &["t"], &["s"]),
            ]],
            &records,
        );
        assert_eq!(out.discarded, 2);
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].text, "c");
    }

    #[test]
    fn test_whole_batch_discarded_is_not_an_error() {
        let records = vec![source(1, "a")];
        let out = reconcile(vec![vec![result(1, &[], &[])]], &records);
        assert!(out.rows.is_empty());
        assert_eq!(out.discarded, 1);
    }

    #[test]
    fn test_unmatched_result_is_skipped() {
        let out = reconcile(vec![vec![result(9, &["t"], &["s"])]], &[source(1, "a")]);
        assert_eq!(out.unmatched, 1);
        assert!(out.rows.is_empty());
    }
}
