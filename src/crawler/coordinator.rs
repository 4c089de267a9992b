//! Per-source crawl coordination
//!
//! This module contains the crawl loop for one source profile:
//! - Seeding the frontier for the requested discovery mode
//! - Handing frontier batches to a bounded pool of workers
//! - Routing fetched documents into link discovery or extraction
//! - Updating the frontier, processed index and sink under one lock
//! - Flushing the index and exporting the source's records at the end

use crate::article::ArticleRecord;
use crate::config::SourceProfile;
use crate::crawler::classifier::{Classifier, UrlKind};
use crate::crawler::fetcher::{FetchedPage, Fetcher};
use crate::crawler::frontier::{FrontierEntry, Frontier};
use crate::crawler::parser::{extract_links, extract_sitemap_locs};
use crate::crawler::runner::RunMode;
use crate::extract::{ArticleExtractor, ExtractionError};
use crate::output::{AppendOutcome, ExportFormat, Sink};
use crate::state::{PageOutcome, ProcessedIndex};
use crate::storage::Storage;
use crate::url::normalize_url;
use crate::{ConfigError, HarvestError};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use scraper::Html;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use url::Url;

/// Sitemap paths probed in full mode when a profile lists none
pub const DEFAULT_SITEMAP_PATHS: &[&str] = &[
    "/sitemap.xml",
    "/sitemap_index.xml",
    "/news-sitemap.xml",
    "/sitemap-news.xml",
];

/// Frontier entries handed out per batch, per worker
const BATCH_PER_WORKER: usize = 4;

/// Counters for one source's crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Pages fetched successfully, of any kind
    pub pages_fetched: u64,
    /// Listing and sitemap pages mined for links
    pub discovery_pages: u64,
    /// URLs added to the frontier from discovered links
    pub links_queued: u64,
    /// Records produced by the extraction pipeline
    pub articles_extracted: u64,
    pub inserted: u64,
    /// Records whose URL the store already held
    pub already_stored: u64,
    /// Article URLs skipped because the processed index knew them
    pub skipped_processed: u64,
    pub duplicate_content: u64,
    pub rejected: u64,
    pub fetch_failed: u64,
    pub sink_failed: u64,
    /// Pages dropped mid-fetch by an interrupt
    pub abandoned: u64,
}

impl SourceStats {
    /// Counts one page outcome
    pub fn record(&mut self, outcome: PageOutcome) {
        match outcome {
            PageOutcome::Discovered => self.discovery_pages += 1,
            PageOutcome::Stored => self.inserted += 1,
            PageOutcome::AlreadyStored => self.already_stored += 1,
            PageOutcome::SkippedProcessed => self.skipped_processed += 1,
            PageOutcome::DuplicateContent => self.duplicate_content += 1,
            PageOutcome::Rejected => self.rejected += 1,
            PageOutcome::FetchFailed => self.fetch_failed += 1,
            PageOutcome::SinkFailed => self.sink_failed += 1,
            PageOutcome::Abandoned => self.abandoned += 1,
        }
    }

    /// Total URL and content duplicates
    pub fn duplicates(&self) -> u64 {
        self.already_stored + self.skipped_processed + self.duplicate_content
    }
}

/// Mutable run state shared by every worker
///
/// One coarse lock guards all of it; workers hold the guard only for
/// in-memory updates and the single-row store write, never across `.await`.
pub(crate) struct CrawlState<S: Storage> {
    pub frontier: Frontier,
    pub index: ProcessedIndex,
    pub sink: Sink<S>,
    pub stats: SourceStats,
}

impl<S: Storage> CrawlState<S> {
    pub fn new(index: ProcessedIndex, sink: Sink<S>) -> Self {
        Self {
            frontier: Frontier::new(0),
            index,
            sink,
            stats: SourceStats::default(),
        }
    }

    /// Resets per-source state before the next source is crawled
    pub fn begin_source(&mut self, page_budget: usize) {
        self.frontier = Frontier::new(page_budget);
        self.stats = SourceStats::default();
        self.sink.finish_batch();
    }

    /// Flushes the processed index, logging instead of failing
    pub fn flush_index(&mut self) {
        match self.index.persist_snapshot() {
            Ok(0) => {}
            Ok(n) => tracing::debug!("Flushed {} processed URLs", n),
            Err(e) => tracing::error!("Failed to flush processed URL index: {}", e),
        }
    }
}

pub(crate) type SharedState<S> = Arc<Mutex<CrawlState<S>>>;

/// Locks the shared state, recovering the data if a worker panicked
pub(crate) fn lock_state<S: Storage>(state: &Mutex<CrawlState<S>>) -> MutexGuard<'_, CrawlState<S>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Where a source's exports go
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub dir: PathBuf,
    pub formats: Vec<ExportFormat>,
}

/// Result of one source's crawl
#[derive(Debug, Clone)]
pub struct SourceReport {
    pub stats: SourceStats,
    /// True if the crawl stopped early on an interrupt
    pub interrupted: bool,
}

/// What a fetched document yielded, computed without holding the lock
struct PageAnalysis {
    links: Vec<(Url, UrlKind)>,
    extraction: Option<Result<ArticleRecord, ExtractionError>>,
}

/// Immutable per-source machinery shared by the workers
struct SourceContext {
    source_id: String,
    classifier: Classifier,
    extractor: ArticleExtractor,
    fetcher: Arc<Fetcher>,
    worker_delay: Duration,
}

/// Crawls one source profile
pub struct SourceCrawler {
    profile: SourceProfile,
    context: Arc<SourceContext>,
}

impl SourceCrawler {
    /// Compiles the profile's classification and extraction rules
    pub fn new(profile: &SourceProfile, fetcher: Arc<Fetcher>) -> Result<Self, ConfigError> {
        let context = SourceContext {
            source_id: profile.id.clone(),
            classifier: Classifier::from_profile(profile)?,
            extractor: ArticleExtractor::from_profile(profile)?,
            fetcher,
            worker_delay: profile.per_worker_delay(),
        };

        Ok(Self {
            profile: profile.clone(),
            context: Arc::new(context),
        })
    }

    /// Seed URLs for a discovery mode
    ///
    /// Full mode seeds the base URL plus sitemaps. Incremental mode seeds
    /// the base URL, the profile's extra entry paths, and the dated archive
    /// listings of the last `days` days ending at `today`.
    pub fn seed_urls(&self, mode: RunMode, today: NaiveDate, days: u32) -> Vec<(Url, UrlKind)> {
        let base = self.context.classifier.base_url();
        let mut seeds = Vec::new();

        let mut push = |path: &str, kind: UrlKind| match base.join(path) {
            Ok(joined) => match normalize_url(joined.as_str()) {
                Ok(url) => seeds.push((url, kind)),
                Err(e) => tracing::warn!("Skipping seed {}: {}", joined, e),
            },
            Err(e) => tracing::warn!("Skipping seed path {}: {}", path, e),
        };

        push(base.as_str(), UrlKind::Category);

        match mode {
            RunMode::Full => {
                if self.profile.sitemaps.is_empty() {
                    for path in DEFAULT_SITEMAP_PATHS {
                        push(path, UrlKind::Sitemap);
                    }
                } else {
                    for path in &self.profile.sitemaps {
                        push(path, UrlKind::Sitemap);
                    }
                }
            }
            RunMode::Incremental => {
                for path in &self.profile.entry_paths {
                    push(path, UrlKind::Category);
                }
                for offset in 0..days {
                    let day = today - ChronoDuration::days(i64::from(offset));
                    let path = day.format(&self.profile.archive_path_format).to_string();
                    push(&path, UrlKind::Category);
                }
            }
        }

        seeds
    }

    /// Runs the crawl loop for this source until the frontier is exhausted,
    /// the page budget is spent, or `shutdown` flips to true
    ///
    /// The processed index is flushed and the source's records exported
    /// before returning, interrupted or not.
    pub(crate) async fn crawl<S: Storage + 'static>(
        &self,
        state: &SharedState<S>,
        mode: RunMode,
        incremental_days: u32,
        exports: &ExportSettings,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SourceReport, HarvestError> {
        let started = Instant::now();
        let source_id = self.context.source_id.as_str();
        let workers = self.profile.max_workers.max(1);
        let semaphore = Arc::new(Semaphore::new(workers));

        {
            let mut st = lock_state(state);
            st.begin_source(self.profile.max_pages);
            for (url, kind) in self.seed_urls(mode, Utc::now().date_naive(), incremental_days) {
                if let Err(rejection) = st.frontier.seed(url.clone(), kind) {
                    tracing::debug!("Seed {} not queued: {:?}", url, rejection);
                }
            }
            tracing::info!(
                "[{}] Seeded {} URLs ({} mode, budget {} pages)",
                source_id,
                st.frontier.len(),
                mode,
                self.profile.max_pages
            );
        }

        let mut interrupted = false;
        let mut batches = 0u64;

        loop {
            if *shutdown.borrow() {
                interrupted = true;
                break;
            }

            let batch = lock_state(state)
                .frontier
                .pop_batch(workers * BATCH_PER_WORKER);
            if batch.is_empty() {
                break;
            }

            let mut tasks = JoinSet::new();
            for entry in batch {
                let permit = tokio::select! {
                    permit = semaphore.clone().acquire_owned() => {
                        permit.map_err(|e| HarvestError::Worker(e.to_string()))?
                    }
                    _ = shutdown_requested(shutdown) => {
                        interrupted = true;
                        break;
                    }
                };
                let context = Arc::clone(&self.context);
                let state = Arc::clone(state);
                let worker_shutdown = shutdown.clone();

                tasks.spawn(async move {
                    let _permit = permit;
                    let outcome = process_entry(&context, &state, entry, worker_shutdown).await;
                    lock_state(&state).stats.record(outcome);
                });
            }

            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::error!("[{}] Worker task failed: {}", source_id, e);
                }
            }

            if interrupted {
                break;
            }

            batches += 1;
            {
                let st = lock_state(state);
                let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);
                tracing::info!(
                    "[{}] Progress: {} pages dispatched, {} queued, {} inserted, {:.2} pages/sec",
                    source_id,
                    st.frontier.dispatched(),
                    st.frontier.len(),
                    st.stats.inserted,
                    st.frontier.dispatched() as f64 / elapsed
                );
                if st.frontier.is_exhausted() {
                    break;
                }
            }

            let delay = self.profile.politeness_delay();
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_requested(shutdown) => {}
                }
            }
        }

        if interrupted {
            tracing::warn!("[{}] Interrupted, flushing partial results", source_id);
        }

        let stats = {
            let mut st = lock_state(state);
            st.flush_index();

            let now = Utc::now();
            for format in &exports.formats {
                if let Err(e) = st.sink.export_batch(*format, &exports.dir, source_id, now) {
                    tracing::error!("[{}] {} export failed: {}", source_id, format, e);
                }
            }
            st.sink.finish_batch();
            st.stats.clone()
        };

        tracing::info!(
            "[{}] Finished in {:.1}s after {} batches: {} fetched, {} extracted, {} inserted, \
             {} duplicates, {} rejected, {} fetch failures",
            source_id,
            started.elapsed().as_secs_f64(),
            batches,
            stats.pages_fetched,
            stats.articles_extracted,
            stats.inserted,
            stats.duplicates(),
            stats.rejected,
            stats.fetch_failed
        );

        Ok(SourceReport { stats, interrupted })
    }
}

/// Resolves once `shutdown` carries `true`
///
/// Never resolves when the sender is gone without having asked for a stop.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Fetches one frontier entry and applies its result to the shared state
///
/// An interrupt abandons the wait and the fetch, retries included; the
/// entry is left unprocessed.
async fn process_entry<S: Storage>(
    context: &SourceContext,
    state: &Mutex<CrawlState<S>>,
    entry: FrontierEntry,
    mut shutdown: watch::Receiver<bool>,
) -> PageOutcome {
    let known = entry.kind.is_extractable() && lock_state(state).index.is_processed(entry.url.as_str());
    if known {
        tracing::debug!("Already processed: {}", entry.url);
        return PageOutcome::SkippedProcessed;
    }

    let fetch = async {
        if !context.worker_delay.is_zero() {
            tokio::time::sleep(context.worker_delay).await;
        }
        context.fetcher.fetch(&entry.url).await
    };

    let fetched = tokio::select! {
        fetched = fetch => fetched,
        _ = shutdown_requested(&mut shutdown) => {
            tracing::debug!("Abandoned {} on interrupt", entry.url);
            return PageOutcome::Abandoned;
        }
    };

    let page = match fetched {
        Ok(page) => page,
        Err(e) => {
            tracing::warn!("Giving up on {}: {}", entry.url, e);
            return PageOutcome::FetchFailed;
        }
    };

    let analysis = analyze_page(context, &entry, &page, Utc::now());

    let mut st = lock_state(state);
    st.stats.pages_fetched += 1;

    for (url, kind) in analysis.links {
        if kind.is_extractable() && st.index.is_processed(url.as_str()) {
            if !st.frontier.is_visited(&url) {
                st.frontier.mark_visited(&url);
                st.stats.skipped_processed += 1;
            }
            continue;
        }
        if st.frontier.push_discovered(url, kind, entry.depth).is_ok() {
            st.stats.links_queued += 1;
        }
    }

    let Some(extraction) = analysis.extraction else {
        return PageOutcome::Discovered;
    };

    let record = match extraction {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!("Rejected {}: {}", entry.url, e);
            return PageOutcome::Rejected;
        }
    };
    st.stats.articles_extracted += 1;

    let hash = record.content_hash.clone();
    let outcome = if st.index.is_duplicate_content(&hash) {
        tracing::debug!("Duplicate content at {}", record.url);
        PageOutcome::DuplicateContent
    } else {
        match st.sink.append_record(record) {
            AppendOutcome::Inserted => PageOutcome::Stored,
            AppendOutcome::AlreadyStored => PageOutcome::AlreadyStored,
            AppendOutcome::Failed => PageOutcome::SinkFailed,
        }
    };

    if outcome.marks_processed() {
        st.index.mark_processed(entry.url.as_str(), Some(&hash));
        if st.index.needs_flush() {
            st.flush_index();
        }
    }

    outcome
}

/// Parses a fetched document into links to follow and, for article
/// candidates, an extraction result
fn analyze_page(
    context: &SourceContext,
    entry: &FrontierEntry,
    page: &FetchedPage,
    now: DateTime<Utc>,
) -> PageAnalysis {
    let classify = |urls: Vec<Url>| -> Vec<(Url, UrlKind)> {
        urls.into_iter()
            .map(|url| {
                let kind = context.classifier.classify(&url);
                (url, kind)
            })
            .filter(|(_, kind)| kind.should_enqueue())
            .collect()
    };

    if entry.kind == UrlKind::Sitemap || page.is_xml() {
        let locs = extract_sitemap_locs(&page.body, &page.final_url);
        tracing::debug!("Sitemap {} lists {} URLs", entry.url, locs.len());
        return PageAnalysis {
            links: classify(locs),
            extraction: None,
        };
    }

    let document = Html::parse_document(&page.body);

    if entry.kind.is_extractable() {
        return PageAnalysis {
            links: Vec::new(),
            extraction: Some(context.extractor.extract(&document, &entry.url, now)),
        };
    }

    PageAnalysis {
        links: classify(extract_links(&document, &page.final_url)),
        extraction: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldSelectors;

    fn profile() -> SourceProfile {
        SourceProfile {
            id: "diario".to_string(),
            name: None,
            base_url: "https://diario.example/".to_string(),
            enabled: true,
            delay_seconds: 0.0,
            include_patterns: vec![],
            exclude_patterns: vec![],
            pagination_patterns: vec![],
            category_patterns: vec![],
            field_selectors: FieldSelectors::default(),
            max_pages: 10,
            max_workers: 2,
            sitemaps: vec![],
            entry_paths: vec!["/ultimas/".to_string()],
            archive_path_format: "%Y/%m/%d/".to_string(),
            category_path_segments: vec![],
        }
    }

    fn crawler(profile: &SourceProfile) -> SourceCrawler {
        let client = reqwest::Client::new();
        let fetcher = Arc::new(Fetcher::new(client, Default::default()));
        SourceCrawler::new(profile, fetcher).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_full_mode_seeds_default_sitemaps() {
        let seeds = crawler(&profile()).seed_urls(RunMode::Full, day(2024, 3, 15), 5);

        assert_eq!(seeds[0].0.as_str(), "https://diario.example/");
        assert_eq!(seeds[0].1, UrlKind::Category);
        let sitemaps: Vec<&str> = seeds
            .iter()
            .filter(|(_, kind)| *kind == UrlKind::Sitemap)
            .map(|(url, _)| url.path())
            .collect();
        assert_eq!(sitemaps, DEFAULT_SITEMAP_PATHS.to_vec());
    }

    #[test]
    fn test_full_mode_uses_configured_sitemaps() {
        let mut p = profile();
        p.sitemaps = vec!["/mapa.xml".to_string()];
        let seeds = crawler(&p).seed_urls(RunMode::Full, day(2024, 3, 15), 5);

        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[1].0.as_str(), "https://diario.example/mapa.xml");
    }

    #[test]
    fn test_incremental_mode_seeds_distinct_archive_days() {
        let seeds = crawler(&profile()).seed_urls(RunMode::Incremental, day(2024, 3, 2), 3);
        let urls: Vec<&str> = seeds.iter().map(|(url, _)| url.as_str()).collect();

        assert_eq!(
            urls,
            vec![
                "https://diario.example/",
                "https://diario.example/ultimas/",
                "https://diario.example/2024/03/02/",
                "https://diario.example/2024/03/01/",
                "https://diario.example/2024/02/29/",
            ]
        );
        assert!(seeds.iter().all(|(_, kind)| *kind == UrlKind::Category));
    }

    #[test]
    fn test_stats_record_outcomes() {
        let mut stats = SourceStats::default();
        stats.record(PageOutcome::Stored);
        stats.record(PageOutcome::Stored);
        stats.record(PageOutcome::DuplicateContent);
        stats.record(PageOutcome::AlreadyStored);
        stats.record(PageOutcome::FetchFailed);
        stats.record(PageOutcome::Abandoned);

        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.duplicates(), 2);
        assert_eq!(stats.fetch_failed, 1);
        assert_eq!(stats.abandoned, 1);
    }

    #[tokio::test]
    async fn test_shutdown_requested_resolves_only_on_true() {
        let wait = Duration::from_millis(50);

        let (tx, mut rx) = watch::channel(false);
        tx.send(false).unwrap();
        assert!(tokio::time::timeout(wait, shutdown_requested(&mut rx)).await.is_err());

        tx.send(true).unwrap();
        assert!(tokio::time::timeout(wait, shutdown_requested(&mut rx)).await.is_ok());
        drop(tx);
        assert!(tokio::time::timeout(wait, shutdown_requested(&mut rx)).await.is_ok());

        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        assert!(tokio::time::timeout(wait, shutdown_requested(&mut rx)).await.is_err());
    }

    #[test]
    fn test_listing_page_yields_classified_links() {
        let p = profile();
        let crawler = crawler(&p);
        let entry = FrontierEntry {
            url: Url::parse("https://diario.example/").unwrap(),
            kind: UrlKind::Category,
            depth: 0,
        };
        let page = FetchedPage {
            final_url: entry.url.clone(),
            status: 200,
            content_type: Some("text/html".to_string()),
            body: r#"<html><body>
                <a href="/2024/03/15/gran-nota/">nota</a>
                <a href="/page/2/">siguiente</a>
                <a href="/wp-admin/">admin</a>
                <a href="https://otro.example/2024/03/15/ajena/">fuera</a>
            </body></html>"#
                .to_string(),
        };

        let analysis = analyze_page(&crawler.context, &entry, &page, Utc::now());
        assert!(analysis.extraction.is_none());

        let kinds: Vec<(&str, UrlKind)> = analysis
            .links
            .iter()
            .map(|(url, kind)| (url.path(), *kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("/2024/03/15/gran-nota/", UrlKind::Article),
                ("/page/2/", UrlKind::Pagination),
            ]
        );
    }

    #[test]
    fn test_article_page_is_extracted_not_mined() {
        let p = profile();
        let crawler = crawler(&p);
        let entry = FrontierEntry {
            url: Url::parse("https://diario.example/2024/03/15/gran-nota/").unwrap(),
            kind: UrlKind::Article,
            depth: 1,
        };
        let page = FetchedPage {
            final_url: entry.url.clone(),
            status: 200,
            content_type: Some("text/html; charset=utf-8".to_string()),
            body: r#"<html><head><title>Gran nota</title></head><body>
                <h1 class="entry-title">Gran nota</h1>
                <div class="entry-content">
                  <p>Primer párrafo con suficiente texto para superar el mínimo exigido.</p>
                  <a href="/2024/03/14/otra-nota/">otra</a>
                </div>
            </body></html>"#
                .to_string(),
        };

        let analysis = analyze_page(&crawler.context, &entry, &page, Utc::now());
        assert!(analysis.links.is_empty());

        let record = analysis.extraction.unwrap().unwrap();
        assert_eq!(record.title, "Gran nota");
        assert_eq!(record.source_id, "diario");
        assert_eq!(record.url, entry.url.as_str());
    }

    #[test]
    fn test_sitemap_locs_are_classified() {
        let p = profile();
        let crawler = crawler(&p);
        let entry = FrontierEntry {
            url: Url::parse("https://diario.example/sitemap.xml").unwrap(),
            kind: UrlKind::Sitemap,
            depth: 0,
        };
        let page = FetchedPage {
            final_url: entry.url.clone(),
            status: 200,
            content_type: Some("application/xml".to_string()),
            body: r#"<?xml version="1.0"?>
                <sitemapindex>
                  <sitemap><loc>https://diario.example/sitemap-posts.xml</loc></sitemap>
                  <url><loc>https://diario.example/2024/03/15/gran-nota/</loc></url>
                </sitemapindex>"#
                .to_string(),
        };

        let analysis = analyze_page(&crawler.context, &entry, &page, Utc::now());
        let kinds: Vec<UrlKind> = analysis.links.iter().map(|(_, kind)| *kind).collect();
        assert_eq!(kinds, vec![UrlKind::Sitemap, UrlKind::Article]);
    }
}
