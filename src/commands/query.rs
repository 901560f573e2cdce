use chrono::NaiveDate;

use crate::state::AppState;
use crate::store::query::{LabelCounts, RowFilter};

/// Print matching rows as JSON Lines, or their label counts.
pub async fn query(
    state: &AppState,
    day: NaiveDate,
    filter: &RowFilter,
    counts: bool,
) -> anyhow::Result<()> {
    let rows = state.store.load_rows(day).await?;
    let matched = filter.apply(&rows);

    if counts {
        let tally = LabelCounts::tally(matched.iter().copied());
        println!("{}", serde_json::to_string_pretty(&tally)?);
        return Ok(());
    }

    if matched.is_empty() {
        eprintln!("No enriched rows for {day} match the filter.");
        return Ok(());
    }
    for row in matched {
        println!("{}", serde_json::to_string(row)?);
    }
    Ok(())
}
