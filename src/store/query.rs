use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::records::{EnrichedRecord, Sentiment};

/// Membership filter over the set-valued columns. Each non-empty set must
/// intersect the row's labels; empty sets match everything.
#[derive(Debug, Clone, Default)]
pub struct RowFilter {
    pub topics: BTreeSet<String>,
    pub subtopics: BTreeSet<String>,
    pub sentiments: BTreeSet<Sentiment>,
}

fn any_of<T: Ord>(wanted: &BTreeSet<T>, have: &BTreeSet<T>) -> bool {
    wanted.is_empty() || !wanted.is_disjoint(have)
}

impl RowFilter {
    pub fn matches(&self, row: &EnrichedRecord) -> bool {
        any_of(&self.topics, &row.topic)
            && any_of(&self.subtopics, &row.subtopic)
            && any_of(&self.sentiments, &row.sentiment)
    }

    pub fn apply<'a>(&self, rows: &'a [EnrichedRecord]) -> Vec<&'a EnrichedRecord> {
        rows.iter().filter(|row| self.matches(row)).collect()
    }
}

/// Per-label occurrence counts over a set of rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelCounts {
    pub topic: BTreeMap<String, usize>,
    pub subtopic: BTreeMap<String, usize>,
    pub sentiment: BTreeMap<String, usize>,
}

impl LabelCounts {
    pub fn tally<'a>(rows: impl IntoIterator<Item = &'a EnrichedRecord>) -> Self {
        let mut counts = Self::default();
        for row in rows {
            for t in &row.topic {
                *counts.topic.entry(t.clone()).or_default() += 1;
            }
            for s in &row.subtopic {
                *counts.subtopic.entry(s.clone()).or_default() += 1;
            }
            for s in &row.sentiment {
                *counts.sentiment.entry(s.as_str().to_string()).or_default() += 1;
            }
        }
        counts
    }
}

/// Distinct topics and subtopics seen across `rows`.
pub fn vocabulary<'a>(
    rows: impl IntoIterator<Item = &'a EnrichedRecord>,
) -> (BTreeSet<String>, BTreeSet<String>) {
    let mut topics = BTreeSet::new();
    let mut subtopics = BTreeSet::new();
    for row in rows {
        topics.extend(row.topic.iter().cloned());
        subtopics.extend(row.subtopic.iter().cloned());
    }
    (topics, subtopics)
}
