//! Statistics from the durable store
//!
//! This module provides functionality for extracting and displaying
//! stored article counts and the latest run.

use crate::storage::{RunRecord, Storage};
use crate::HarvestError;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

/// Window of the "recent" article count
const RECENT_WINDOW_HOURS: i64 = 24;

/// Store statistics summary
#[derive(Debug, Clone)]
pub struct StoreStatistics {
    /// Total number of stored articles
    pub total_articles: u64,

    /// Articles extracted in the last 24 hours
    pub last_24h: u64,

    /// Stored articles per source id
    pub per_source: BTreeMap<String, u64>,

    /// Most recent run, if any
    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
pub fn load_statistics(storage: &dyn Storage) -> Result<StoreStatistics, HarvestError> {
    load_statistics_at(storage, Utc::now())
}

/// Loads statistics with the recent window ending at `now`
pub fn load_statistics_at(
    storage: &dyn Storage,
    now: DateTime<Utc>,
) -> Result<StoreStatistics, HarvestError> {
    Ok(StoreStatistics {
        total_articles: storage.count_articles()?,
        last_24h: storage.count_since(now - Duration::hours(RECENT_WINDOW_HOURS))?,
        per_source: storage.count_by_source()?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Formats statistics for display
pub fn format_statistics(stats: &StoreStatistics) -> String {
    let mut out = String::new();

    out.push_str("=== Stored Articles ===\n\n");
    out.push_str(&format!("Total: {}\n", stats.total_articles));
    out.push_str(&format!("Last 24h: {}\n\n", stats.last_24h));

    if !stats.per_source.is_empty() {
        out.push_str("Per source:\n");
        let width = stats.per_source.keys().map(String::len).max().unwrap_or(0);
        for (source, count) in &stats.per_source {
            let share = if stats.total_articles > 0 {
                (*count as f64 / stats.total_articles as f64) * 100.0
            } else {
                0.0
            };
            out.push_str(&format!(
                "  {:<width$}  {} ({:.1}%)\n",
                source,
                count,
                share,
                width = width
            ));
        }
        out.push('\n');
    }

    match &stats.latest_run {
        Some(run) => {
            out.push_str(&format!(
                "Latest run: #{} ({}, {}) started {}",
                run.id,
                run.mode,
                run.status.to_db_string(),
                run.started_at
            ));
            if let Some(finished) = &run.finished_at {
                out.push_str(&format!(", finished {}", finished));
            }
            out.push_str(&format!(", {} inserted\n", run.inserted));
        }
        None => out.push_str("No runs recorded\n"),
    }

    out
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &StoreStatistics) {
    print!("{}", format_statistics(stats));
}
