pub mod fingerprint;

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use fingerprint::Fingerprint;

/// One row of the upstream snapshot.
///
/// `id` is the row's 1-based position in the deduplicated snapshot. It is
/// re-derived on every run and only correlates a classifier response with
/// its request; cross-run identity is always the [`Fingerprint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    pub id: u64,
    pub text: String,
    pub post_time: NaiveDate,
    pub scrape_time: NaiveDate,
}

impl SourceRecord {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.text, self.post_time)
    }

    /// The `{id, text}` pair sent to the classifier.
    pub fn excerpt(&self) -> Excerpt {
        Excerpt {
            id: self.id,
            text: self.text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excerpt {
    pub id: u64,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
    Both,
}

impl Sentiment {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "positive" => Some(Self::Positive),
            "negative" => Some(Self::Negative),
            "neutral" => Some(Self::Neutral),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
            Self::Both => "both",
        }
    }
}

/// Labels the classifier assigned to one excerpt, keyed by the excerpt id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassificationResult {
    pub id: u64,
    pub topic: BTreeSet<String>,
    pub subtopic: BTreeSet<String>,
    pub sentiment: BTreeSet<Sentiment>,
}

/// One durable row of the Enriched Store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub topic: BTreeSet<String>,
    pub subtopic: BTreeSet<String>,
    pub sentiment: BTreeSet<Sentiment>,
    pub text: String,
    #[serde(rename = "postTime")]
    pub post_time: NaiveDate,
    #[serde(rename = "scrapeTime_Date")]
    pub scrape_time: NaiveDate,
}

impl EnrichedRecord {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.text, self.post_time)
    }
}
