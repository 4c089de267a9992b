use crate::output::ExportFormat;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for News-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub run: RunConfig,

    #[serde(default)]
    pub fetcher: FetcherConfig,

    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,

    /// Source profiles, one per `[[source]]` table
    #[serde(rename = "source", default)]
    pub sources: Vec<SourceProfile>,

    /// SHA-256 of the file this configuration was loaded from
    #[serde(skip)]
    pub fingerprint: String,
}

impl Config {
    /// Looks up a source profile by id
    pub fn source(&self, id: &str) -> Option<&SourceProfile> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// Iterates over the enabled source profiles in file order
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceProfile> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

/// Run-wide settings: where state lives and how often it is flushed
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Line-delimited processed-URL index
    #[serde(rename = "state-path")]
    pub state_path: String,

    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory receiving per-source CSV/JSON exports
    #[serde(rename = "export-dir")]
    pub export_dir: String,

    /// Flush the processed-URL index every N processed records
    #[serde(rename = "flush-every", default = "default_flush_every")]
    pub flush_every: usize,

    /// Pause between two sources (seconds)
    #[serde(
        rename = "inter-source-delay-seconds",
        default = "default_inter_source_delay"
    )]
    pub inter_source_delay_seconds: f64,

    /// Number of dated archive days seeded in incremental mode
    #[serde(rename = "incremental-days", default = "default_incremental_days")]
    pub incremental_days: u32,

    #[serde(rename = "export-formats", default = "default_export_formats")]
    pub export_formats: Vec<ExportFormat>,
}

impl RunConfig {
    pub fn inter_source_delay(&self) -> Duration {
        Duration::from_secs_f64(self.inter_source_delay_seconds)
    }
}

/// HTTP retry and timeout behavior
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// Attempts available for transient failures (timeouts, 5xx, connection errors)
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(rename = "timeout-seconds", default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Base wait after an HTTP 429; the n-th consecutive 429 waits n times this
    #[serde(rename = "rate-limit-base-seconds", default = "default_rate_limit_base")]
    pub rate_limit_base_seconds: f64,

    /// Hard cap on 429 waits for a single URL
    #[serde(rename = "max-rate-limit-waits", default = "default_max_rate_limit_waits")]
    pub max_rate_limit_waits: u32,

    /// Retry attempt i sleeps `backoff_unit_seconds * 2^i`
    #[serde(rename = "backoff-unit-seconds", default = "default_backoff_unit")]
    pub backoff_unit_seconds: f64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout_seconds: default_timeout_seconds(),
            rate_limit_base_seconds: default_rate_limit_base(),
            max_rate_limit_waits: default_max_rate_limit_waits(),
            backoff_unit_seconds: default_backoff_unit(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,
}

/// Static per-site crawl and extraction configuration
///
/// A profile is immutable for the duration of a run.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceProfile {
    /// Stable identifier, stored with every record
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    pub base_url: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Politeness delay (seconds) between discovery batches
    #[serde(default = "default_delay_seconds")]
    pub delay_seconds: f64,

    /// URL regexes that mark an article; first match wins
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// URL regexes that reject a URL outright, before any inclusion rule
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    #[serde(default)]
    pub pagination_patterns: Vec<String>,

    #[serde(default)]
    pub category_patterns: Vec<String>,

    #[serde(default)]
    pub field_selectors: FieldSelectors,

    /// Page budget for one run of this source
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Sitemap paths seeded in full-discovery mode
    #[serde(default)]
    pub sitemaps: Vec<String>,

    /// Extra entry points seeded in incremental mode
    #[serde(default)]
    pub entry_paths: Vec<String>,

    /// `strftime` pattern of dated archive paths
    #[serde(default = "default_archive_path_format")]
    pub archive_path_format: String,

    /// Path markers whose following segment names the category
    #[serde(default = "default_category_path_segments")]
    pub category_path_segments: Vec<String>,
}

impl SourceProfile {
    /// Human readable name, falling back to the id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Politeness delay between discovery batches
    pub fn politeness_delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay_seconds)
    }

    /// Delay each worker observes before a request, so the aggregate
    /// request rate stays bounded regardless of the worker count
    pub fn per_worker_delay(&self) -> Duration {
        let workers = self.max_workers.max(1) as f64;
        Duration::from_secs_f64(self.delay_seconds / workers)
    }
}

/// Per-field CSS selector cascades, in priority order
///
/// Selectors listed here are tried before the built-in defaults for the field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldSelectors {
    #[serde(default)]
    pub title: Vec<String>,
    #[serde(default)]
    pub date: Vec<String>,
    #[serde(default)]
    pub content: Vec<String>,
    #[serde(default)]
    pub summary: Vec<String>,
    #[serde(default)]
    pub author: Vec<String>,
    #[serde(default)]
    pub category: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

impl FieldSelectors {
    /// All configured selectors paired with their field name
    pub fn iter_all(&self) -> impl Iterator<Item = (&'static str, &String)> {
        [
            ("title", &self.title),
            ("date", &self.date),
            ("content", &self.content),
            ("summary", &self.summary),
            ("author", &self.author),
            ("category", &self.category),
            ("tags", &self.tags),
            ("images", &self.images),
        ]
        .into_iter()
        .flat_map(|(field, list)| list.iter().map(move |s| (field, s)))
    }
}

fn default_true() -> bool {
    true
}

fn default_flush_every() -> usize {
    10
}

fn default_inter_source_delay() -> f64 {
    5.0
}

fn default_incremental_days() -> u32 {
    5
}

fn default_export_formats() -> Vec<ExportFormat> {
    vec![ExportFormat::Csv, ExportFormat::Json]
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_rate_limit_base() -> f64 {
    5.0
}

fn default_max_rate_limit_waits() -> u32 {
    5
}

fn default_backoff_unit() -> f64 {
    1.0
}

fn default_delay_seconds() -> f64 {
    2.0
}

fn default_max_pages() -> usize {
    50
}

fn default_max_workers() -> usize {
    5
}

fn default_archive_path_format() -> String {
    "%Y/%m/%d/".to_string()
}

fn default_category_path_segments() -> Vec<String> {
    ["categoria", "category", "seccion", "section"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
