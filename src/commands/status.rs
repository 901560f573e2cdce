use chrono::NaiveDate;

use crate::store::query::vocabulary;
use crate::state::AppState;

/// Show ledger and enriched-store totals for a day
pub async fn status(state: &AppState, day: NaiveDate) -> anyhow::Result<()> {
    let ledger = state.store.load_ledger(day).await?;
    let rows = state.store.load_rows(day).await?;
    let (topics, subtopics) = vocabulary(&rows);
    let days = state.store.list_days().await?;

    println!("Partition {day}");
    println!("  processed posts: {}", ledger.len());
    println!("  enriched rows:   {}", rows.len());
    println!("  topics:          {}", topics.len());
    println!("  subtopics:       {}", subtopics.len());
    println!("  partitions on disk: {}", days.len());
    if ledger.is_empty() {
        println!("No run has processed {day} yet.");
    }
    Ok(())
}
