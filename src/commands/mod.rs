mod config;
mod query;
mod run;
mod status;

use chrono::NaiveDate;
use clap::{Args, Subcommand};

use crate::records::Sentiment;
use crate::state::AppState;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Enrich posts the day's ledger has not seen yet
    Run {
        /// Snapshot file (JSON array or JSON Lines); overrides ENRICH_SOURCE
        #[arg(long)]
        source: Option<std::path::PathBuf>,
        #[command(flatten)]
        day: DayArg,
    },
    /// Show ledger and enriched-store totals for a day
    Status {
        #[command(flatten)]
        day: DayArg,
    },
    /// Filter a day's enriched rows by label membership
    Query {
        #[command(flatten)]
        day: DayArg,
        /// Keep rows having any of these topics
        #[arg(long = "topic")]
        topics: Vec<String>,
        /// Keep rows having any of these subtopics
        #[arg(long = "subtopic")]
        subtopics: Vec<String>,
        /// Keep rows having any of these sentiments
        #[arg(long = "sentiment", value_parser = parse_sentiment)]
        sentiments: Vec<Sentiment>,
        /// Print label counts instead of rows
        #[arg(long)]
        counts: bool,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Args, Debug)]
pub struct DayArg {
    /// Day partition (YYYY-MM-DD); defaults to today
    #[arg(long)]
    day: Option<NaiveDate>,
}

impl DayArg {
    pub fn resolve(&self) -> NaiveDate {
        self.day
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}

fn parse_sentiment(raw: &str) -> Result<Sentiment, String> {
    Sentiment::parse(raw)
        .ok_or_else(|| format!("'{raw}' is not one of positive, negative, neutral, both"))
}

pub async fn dispatch(command: Command, state: AppState) -> anyhow::Result<()> {
    match command {
        Command::Run { source, day } => run::run(state, source, day.resolve()).await,
        Command::Status { day } => status::status(&state, day.resolve()).await,
        Command::Query {
            day,
            topics,
            subtopics,
            sentiments,
            counts,
        } => {
            let filter = crate::store::query::RowFilter {
                topics: topics.into_iter().collect(),
                subtopics: subtopics.into_iter().collect(),
                sentiments: sentiments.into_iter().collect(),
            };
            query::query(&state, day.resolve(), &filter, counts).await
        }
        Command::Config => config::config(&state),
    }
}
