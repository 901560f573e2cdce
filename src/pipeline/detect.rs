use std::collections::HashSet;

use crate::records::SourceRecord;
use crate::source::SnapshotRow;
use crate::store::Ledger;

/// Drop rows whose text already appeared earlier in the snapshot, then
/// number the survivors 1..=n in snapshot order.
pub fn dedup_snapshot(rows: Vec<SnapshotRow>) -> Vec<SourceRecord> {
    let mut seen_text = HashSet::new();
    rows.into_iter()
        .filter(|row| seen_text.insert(row.text.clone()))
        .zip(1u64..)
        .map(|(row, id)| SourceRecord {
            id,
            text: row.text,
            post_time: row.post_time,
            scrape_time: row.scrape_time,
        })
        .collect()
}

/// Records whose fingerprint is not in the ledger, in input order.
pub fn unseen(records: &[SourceRecord], ledger: &Ledger) -> Vec<SourceRecord> {
    records
        .iter()
        .filter(|record| !ledger.contains(&record.fingerprint()))
        .cloned()
        .collect()
}

fn is_thai(c: char) -> bool {
    ('\u{0E00}'..='\u{0E7F}').contains(&c)
}

/// Symbol-only, very short or single-word texts never go to the classifier.
///
/// Thai is written without spaces between words, so a Thai text is only
/// judged by how many letters and digits it carries. Any other text with no
/// whitespace is a lone word ("555", "lol", "ok!").
pub fn is_fragment(text: &str, min_chars: usize) -> bool {
    let trimmed = text.trim();
    let letters = trimmed.chars().filter(|c| c.is_alphanumeric()).count();
    if letters == 0 || letters < min_chars {
        return true;
    }
    !trimmed.chars().any(char::is_whitespace) && !trimmed.chars().any(is_thai)
}
