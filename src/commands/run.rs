use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use chrono::NaiveDate;
use tracing::info;

use crate::error::EnrichError;
use crate::pipeline::Pipeline;
use crate::source::FileSnapshotSource;
use crate::state::AppState;

/// One enrichment run over the current snapshot.
pub async fn run(state: AppState, source: Option<PathBuf>, day: NaiveDate) -> anyhow::Result<()> {
    let source_path = source
        .or_else(|| state.config.source_path.clone())
        .context("No snapshot source: pass --source or set ENRICH_SOURCE")?;
    let llm = state.llm()?;
    info!(model = llm.model(), endpoint = llm.base_url(), "classifier configured");

    let pipeline = Pipeline::new(
        state.config.clone(),
        Arc::new(FileSnapshotSource::new(&source_path)),
        llm,
        state.store.clone(),
    );

    match pipeline.run(day).await {
        Ok(report) => {
            info!(
                %day,
                unseen = report.unseen,
                batches = report.batches_persisted,
                rows = report.persisted_rows,
                discarded = report.discarded,
                "run complete"
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => Err(with_resume_hint(day, e)),
    }
}

/// Batch failures are reported once, by the caller, with a note on where
/// the next run picks up.
fn with_resume_hint(day: NaiveDate, e: EnrichError) -> anyhow::Error {
    match e {
        EnrichError::BatchClassificationFailure { batch, .. } => anyhow::Error::new(e).context(
            format!("run for {day} stopped; the next run resumes from batch {batch}"),
        ),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_failure_carries_resume_hint() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let err = with_resume_hint(
            day,
            EnrichError::BatchClassificationFailure {
                batch: 2,
                persisted_batches: 1,
                reason: "timed out".to_string(),
            },
        );
        let rendered = format!("{err:#}");
        assert!(rendered.starts_with("run for 2024-01-01 stopped; the next run resumes from batch 2: "));
        assert!(rendered.contains("timed out"));
        assert!(matches!(
            err.downcast_ref::<EnrichError>(),
            Some(EnrichError::BatchClassificationFailure { batch: 2, .. })
        ));
    }

    #[test]
    fn test_other_errors_pass_through() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let err = with_resume_hint(day, EnrichError::SourceUnavailable("gone".to_string()));
        assert!(!format!("{err:#}").contains("resumes"));
    }
}
