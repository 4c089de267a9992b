//! Run entry points
//!
//! A run crawls one source or every enabled source, sequentially, against
//! one durable store and one processed-URL index. A failing source is
//! logged and skipped; the remaining sources still run. A run over every
//! source that is not interrupted ends with a consolidated export of the
//! last week's records.

use crate::config::{Config, SourceProfile};
use crate::crawler::coordinator::{
    lock_state, shutdown_requested, CrawlState, ExportSettings, SharedState, SourceCrawler,
    SourceStats,
};
use crate::crawler::fetcher::{build_http_client, Fetcher, RetryPolicy};
use crate::output::Sink;
use crate::state::ProcessedIndex;
use crate::storage::{open_storage, RunStatus, Storage};
use crate::HarvestError;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Days of records covered by the consolidated export
const CONSOLIDATION_WINDOW_DAYS: i64 = 7;

/// How a source's frontier is seeded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Base URL plus sitemaps; walks the whole site up to the page budget
    Full,
    /// Homepage, entry paths and dated archives of the last few days
    Incremental,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "incremental" => Ok(Self::Incremental),
            other => Err(format!(
                "unknown mode '{}', expected 'full' or 'incremental'",
                other
            )),
        }
    }
}

/// Which sources a run covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTarget {
    /// Every enabled source, in configuration order
    All,
    /// One source by id, whether enabled or not
    Source(String),
}

impl FromStr for RunTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("source id cannot be empty".to_string());
        }
        if s.eq_ignore_ascii_case("all") {
            Ok(Self::All)
        } else {
            Ok(Self::Source(s.to_string()))
        }
    }
}

/// Outcome of a run
#[derive(Debug, Clone)]
pub struct RunResult {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Records newly written to the store, across all sources
    pub inserted_count: u64,
    /// Stats of every source that completed or was interrupted
    pub per_source: BTreeMap<String, SourceStats>,
    /// Sources whose crawl failed outright
    pub failed_sources: Vec<String>,
    pub interrupted: bool,
}

impl RunResult {
    /// Inserted record count per source id
    pub fn per_source_counts(&self) -> BTreeMap<String, u64> {
        self.per_source
            .iter()
            .map(|(id, stats)| (id.clone(), stats.inserted))
            .collect()
    }

    fn status(&self) -> RunStatus {
        if self.interrupted {
            RunStatus::Interrupted
        } else if self.per_source.is_empty() && !self.failed_sources.is_empty() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        }
    }
}

/// Runs a crawl and stops early on Ctrl-C
///
/// On interrupt the in-flight pages finish, the processed index is flushed
/// and the partial records are exported before the result is returned.
///
/// # Example
///
/// ```no_run
/// use news_harvest::config::load_config;
/// use news_harvest::{run, RunMode, RunTarget};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("harvest.toml"))?;
/// let result = run(&config, RunTarget::All, RunMode::Incremental).await?;
/// println!("{} new articles", result.inserted_count);
/// # Ok(())
/// # }
/// ```
pub async fn run(
    config: &Config,
    target: RunTarget,
    mode: RunMode,
) -> Result<RunResult, HarvestError> {
    let (tx, rx) = watch::channel(false);
    let listener = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("Interrupt received, finishing in-flight pages");
                let _ = tx.send(true);
            }
            Err(e) => tracing::warn!("Cannot listen for interrupts: {}", e),
        }
        // A dropped sender would wake every `changed()` wait early
        std::future::pending::<()>().await;
    });

    let result = run_with_shutdown(config, target, mode, rx).await;
    listener.abort();
    result
}

/// Runs a crawl that stops early once `shutdown` carries `true`
pub async fn run_with_shutdown(
    config: &Config,
    target: RunTarget,
    mode: RunMode,
    shutdown: watch::Receiver<bool>,
) -> Result<RunResult, HarvestError> {
    let profiles = select_profiles(config, &target)?;

    let storage = open_storage(Path::new(&config.run.database_path))?;
    let index = ProcessedIndex::load_snapshot(&config.run.state_path, config.run.flush_every)?;
    tracing::info!(
        "Loaded {} processed URLs from {}",
        index.len(),
        config.run.state_path
    );

    let consolidate = target == RunTarget::All;
    run_sources(config, &profiles, mode, consolidate, storage, index, shutdown).await
}

fn select_profiles(config: &Config, target: &RunTarget) -> Result<Vec<SourceProfile>, HarvestError> {
    let profiles: Vec<SourceProfile> = match target {
        RunTarget::All => config.enabled_sources().cloned().collect(),
        RunTarget::Source(id) => {
            let profile = config
                .source(id)
                .ok_or_else(|| HarvestError::UnknownSource(id.clone()))?;
            vec![profile.clone()]
        }
    };

    if profiles.is_empty() {
        tracing::warn!("No enabled sources to crawl");
    }
    Ok(profiles)
}

async fn run_sources<S: Storage + 'static>(
    config: &Config,
    profiles: &[SourceProfile],
    mode: RunMode,
    consolidate: bool,
    mut storage: S,
    index: ProcessedIndex,
    mut shutdown: watch::Receiver<bool>,
) -> Result<RunResult, HarvestError> {
    let started_at = Utc::now();
    let run_id = storage.create_run(&config.fingerprint, mode.as_str())?;
    tracing::info!(
        "Starting run {} ({} mode, {} sources)",
        run_id,
        mode,
        profiles.len()
    );

    let client = build_http_client(&config.user_agent, &config.fetcher)?;
    let fetcher = Arc::new(Fetcher::new(client, RetryPolicy::from_config(&config.fetcher)));

    let exports = ExportSettings {
        dir: PathBuf::from(&config.run.export_dir),
        formats: config.run.export_formats.clone(),
    };

    let state: SharedState<S> = Arc::new(Mutex::new(CrawlState::new(index, Sink::new(storage))));

    let mut result = RunResult {
        started_at,
        finished_at: started_at,
        inserted_count: 0,
        per_source: BTreeMap::new(),
        failed_sources: Vec::new(),
        interrupted: false,
    };

    for (position, profile) in profiles.iter().enumerate() {
        if position > 0 {
            let delay = config.run.inter_source_delay();
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_requested(&mut shutdown) => {}
                }
            }
        }

        if *shutdown.borrow() {
            result.interrupted = true;
            break;
        }

        tracing::info!("Crawling source '{}' ({})", profile.id, profile.display_name());

        let outcome = match SourceCrawler::new(profile, Arc::clone(&fetcher)) {
            Ok(crawler) => {
                crawler
                    .crawl(
                        &state,
                        mode,
                        config.run.incremental_days,
                        &exports,
                        &mut shutdown,
                    )
                    .await
            }
            Err(e) => Err(e.into()),
        };

        match outcome {
            Ok(report) => {
                result.inserted_count += report.stats.inserted;
                result.per_source.insert(profile.id.clone(), report.stats);
                if report.interrupted {
                    result.interrupted = true;
                    break;
                }
            }
            Err(e) => {
                tracing::error!("Source '{}' failed: {}", profile.id, e);
                result.failed_sources.push(profile.id.clone());
            }
        }
    }

    result.finished_at = Utc::now();

    {
        let mut st = lock_state(&state);
        st.flush_index();

        if consolidate && !result.interrupted {
            let now = Utc::now();
            let since = now - Duration::days(CONSOLIDATION_WINDOW_DAYS);
            for format in &exports.formats {
                match st.sink.export_consolidated(*format, &exports.dir, since, now) {
                    Ok(Some(_)) => {}
                    Ok(None) => tracing::debug!("No recent records to consolidate"),
                    Err(e) => tracing::error!("Consolidated {} export failed: {}", format, e),
                }
            }
        }

        let status = result.status();
        if let Err(e) = st
            .sink
            .storage_mut()
            .finish_run(run_id, status, result.inserted_count)
        {
            tracing::error!("Failed to record end of run {}: {}", run_id, e);
        }
    }

    tracing::info!(
        "Run {} finished: {} inserted across {} sources ({} failed){}",
        run_id,
        result.inserted_count,
        result.per_source.len(),
        result.failed_sources.len(),
        if result.interrupted { ", interrupted" } else { "" }
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_mode_parse() {
        assert_eq!("full".parse::<RunMode>().unwrap(), RunMode::Full);
        assert_eq!("Incremental".parse::<RunMode>().unwrap(), RunMode::Incremental);
        assert!("weekly".parse::<RunMode>().is_err());
        assert_eq!(RunMode::Incremental.to_string(), "incremental");
    }

    #[test]
    fn test_run_target_parse() {
        assert_eq!("all".parse::<RunTarget>().unwrap(), RunTarget::All);
        assert_eq!("ALL".parse::<RunTarget>().unwrap(), RunTarget::All);
        assert_eq!(
            "diario".parse::<RunTarget>().unwrap(),
            RunTarget::Source("diario".to_string())
        );
        assert!("  ".parse::<RunTarget>().is_err());
    }

    fn result_with(per_source: &[(&str, u64)], failed: &[&str], interrupted: bool) -> RunResult {
        let now = Utc::now();
        RunResult {
            started_at: now,
            finished_at: now,
            inserted_count: per_source.iter().map(|(_, n)| n).sum(),
            per_source: per_source
                .iter()
                .map(|(id, n)| {
                    (
                        id.to_string(),
                        SourceStats {
                            inserted: *n,
                            ..Default::default()
                        },
                    )
                })
                .collect(),
            failed_sources: failed.iter().map(|s| s.to_string()).collect(),
            interrupted,
        }
    }

    #[test]
    fn test_per_source_counts() {
        let result = result_with(&[("a", 3), ("b", 0)], &[], false);
        let counts = result.per_source_counts();
        assert_eq!(counts.get("a"), Some(&3));
        assert_eq!(counts.get("b"), Some(&0));
        assert_eq!(result.inserted_count, 3);
    }

    #[test]
    fn test_run_status() {
        assert_eq!(result_with(&[("a", 1)], &["b"], false).status(), RunStatus::Completed);
        assert_eq!(result_with(&[], &["b"], false).status(), RunStatus::Failed);
        assert_eq!(result_with(&[("a", 1)], &[], true).status(), RunStatus::Interrupted);
        assert_eq!(result_with(&[], &[], false).status(), RunStatus::Completed);
    }

    #[test]
    fn test_unknown_source_is_an_error() {
        let config = crate::config::parse_config(
            r#"
            [run]
            state-path = "state/processed.txt"
            database-path = "data/news.db"
            export-dir = "exports"

            [user-agent]
            crawler-name = "TestBot"
            crawler-version = "1.0"
            contact-url = "https://example.com/bot"

            [[source]]
            id = "diario"
            base-url = "https://diario.example/"
            "#,
        )
        .unwrap();

        assert!(matches!(
            select_profiles(&config, &RunTarget::Source("nope".to_string())),
            Err(HarvestError::UnknownSource(id)) if id == "nope"
        ));
        assert_eq!(select_profiles(&config, &RunTarget::All).unwrap().len(), 1);
    }
}
