pub mod batch;
pub mod detect;
pub mod reconcile;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use serde::Serialize;
use tracing::{info, warn};

use crate::classify::ClassifierGateway;
use crate::error::EnrichError;
use crate::llm::ChatBackend;
use crate::records::{ClassificationResult, Fingerprint, SourceRecord};
use crate::source::SnapshotSource;
use crate::state::{EnrichConfig, VocabularyPolicy};
use crate::store::{query, PartitionStore};

/// Orchestration states of one run. Batch numbers are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Snapshotting,
    Diffing,
    Batching,
    Classifying(usize),
    Reconciling(usize),
    Persisting(usize),
    Failed(usize),
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Snapshotting => write!(f, "snapshotting"),
            Self::Diffing => write!(f, "diffing"),
            Self::Batching => write!(f, "batching"),
            Self::Classifying(i) => write!(f, "classifying({i})"),
            Self::Reconciling(i) => write!(f, "reconciling({i})"),
            Self::Persisting(i) => write!(f, "persisting({i})"),
            Self::Failed(i) => write!(f, "failed({i})"),
        }
    }
}

/// Counts describing one successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub day: Option<NaiveDate>,
    pub snapshot_rows: usize,
    pub dropped_rows: usize,
    pub candidates: usize,
    pub unseen: usize,
    pub fragments: usize,
    pub batches_planned: usize,
    pub batches_persisted: usize,
    pub classified: usize,
    pub persisted_rows: usize,
    pub discarded: usize,
}

struct Vocabulary {
    policy: VocabularyPolicy,
    topics: BTreeSet<String>,
    subtopics: BTreeSet<String>,
}

impl Vocabulary {
    fn absorb(&mut self, results: &[ClassificationResult]) {
        if self.policy == VocabularyPolicy::Empty {
            return;
        }
        for result in results {
            self.topics.extend(result.topic.iter().cloned());
            self.subtopics.extend(result.subtopic.iter().cloned());
        }
    }
}

pub struct Pipeline {
    config: EnrichConfig,
    source: Arc<dyn SnapshotSource>,
    gateway: ClassifierGateway,
    store: Arc<dyn PartitionStore>,
}

impl Pipeline {
    pub fn new(
        config: EnrichConfig,
        source: Arc<dyn SnapshotSource>,
        backend: Arc<dyn ChatBackend>,
        store: Arc<dyn PartitionStore>,
    ) -> Self {
        let gateway = ClassifierGateway::new(backend, config.classify_timeout);
        Self {
            config,
            source,
            gateway,
            store,
        }
    }

    /// Enrich every post of the current snapshot not yet in `day`'s ledger.
    ///
    /// Batches are classified and persisted one at a time. When a batch
    /// fails, earlier batches stay persisted and the failing batch plus all
    /// later ones are left for the next run.
    pub async fn run(&self, day: NaiveDate) -> Result<RunReport, EnrichError> {
        self.config.validate()?;
        let mut state = RunState::Idle;
        let mut report = RunReport {
            day: Some(day),
            ..Default::default()
        };

        transition(&mut state, RunState::Snapshotting);
        let snapshot = self.source.fetch().await?;
        report.snapshot_rows = snapshot.rows.len();
        report.dropped_rows = snapshot.dropped;

        transition(&mut state, RunState::Diffing);
        let ledger = self.store.load_ledger(day).await?;
        let records = detect::dedup_snapshot(snapshot.rows);
        report.candidates = records.len();
        let unseen = detect::unseen(&records, &ledger);
        report.unseen = unseen.len();
        info!(
            %day,
            candidates = report.candidates,
            ledger = ledger.len(),
            unseen = report.unseen,
            "snapshot diffed against ledger"
        );

        let (fragments, to_classify): (Vec<SourceRecord>, Vec<SourceRecord>) = unseen
            .into_iter()
            .partition(|r| detect::is_fragment(&r.text, self.config.min_text_chars));
        report.fragments = fragments.len();
        if !fragments.is_empty() {
            let fingerprints: Vec<Fingerprint> =
                fragments.iter().map(SourceRecord::fingerprint).collect();
            self.store.commit_batch(day, &[], &fingerprints).await?;
            info!(fragments = fragments.len(), "fragments marked processed without classification");
        }

        transition(&mut state, RunState::Batching);
        let batches = batch::batches(&to_classify, self.config.batch_size);
        report.batches_planned = batches.len();
        if batches.is_empty() {
            info!(%day, "no new posts to classify");
            transition(&mut state, RunState::Idle);
            return Ok(report);
        }

        let mut vocabulary = self.initial_vocabulary(day).await?;

        for (i, batch) in batches.into_iter().enumerate() {
            let number = i + 1;

            transition(&mut state, RunState::Classifying(number));
            let excerpts: Vec<_> = batch.iter().map(SourceRecord::excerpt).collect();
            let results = match self
                .gateway
                .classify(&excerpts, &vocabulary.topics, &vocabulary.subtopics)
                .await
            {
                Ok(results) => results,
                Err(e) => {
                    transition(&mut state, RunState::Failed(number));
                    warn!(
                        batch = number,
                        of = report.batches_planned,
                        error = %e,
                        "batch classification failed; remaining batches left for next run"
                    );
                    return Err(EnrichError::BatchClassificationFailure {
                        batch: number,
                        persisted_batches: report.batches_persisted,
                        reason: e.to_string(),
                    });
                }
            };
            report.classified += results.len();
            vocabulary.absorb(&results);

            transition(&mut state, RunState::Reconciling(number));
            let reconciled = reconcile::reconcile([results], batch);

            transition(&mut state, RunState::Persisting(number));
            let fingerprints: Vec<Fingerprint> =
                batch.iter().map(SourceRecord::fingerprint).collect();
            self.store
                .commit_batch(day, &reconciled.rows, &fingerprints)
                .await?;

            report.batches_persisted += 1;
            report.persisted_rows += reconciled.rows.len();
            report.discarded += reconciled.discarded;
            info!(
                batch = number,
                of = report.batches_planned,
                records = batch.len(),
                rows = reconciled.rows.len(),
                discarded = reconciled.discarded,
                unmatched = reconciled.unmatched,
                "batch persisted"
            );
        }

        transition(&mut state, RunState::Idle);
        Ok(report)
    }

    async fn initial_vocabulary(&self, day: NaiveDate) -> Result<Vocabulary, EnrichError> {
        let policy = self.config.vocabulary;
        let mut vocabulary = Vocabulary {
            policy,
            topics: BTreeSet::new(),
            subtopics: BTreeSet::new(),
        };
        if policy != VocabularyPolicy::SeedFromStore {
            return Ok(vocabulary);
        }

        let earliest = day
            .checked_sub_days(Days::new(self.config.seed_lookback_days.into()))
            .unwrap_or(NaiveDate::MIN);
        for seed_day in self.store.list_days().await? {
            if seed_day < earliest || seed_day > day {
                continue;
            }
            let rows = self.store.load_rows(seed_day).await?;
            let (topics, subtopics) = query::vocabulary(&rows);
            vocabulary.topics.extend(topics);
            vocabulary.subtopics.extend(subtopics);
        }
        info!(
            topics = vocabulary.topics.len(),
            subtopics = vocabulary.subtopics.len(),
            "vocabulary seeded from enriched store"
        );
        Ok(vocabulary)
    }
}

fn transition(state: &mut RunState, next: RunState) {
    tracing::debug!(from = %state, to = %next, "run state");
    *state = next;
}
