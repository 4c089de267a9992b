//! Crawler module for discovering and processing article pages
//!
//! This module contains the core crawling logic, including:
//! - Link classification and the per-source frontier
//! - HTTP fetching with retry logic
//! - Link and sitemap discovery
//! - Per-source crawl coordination and the run entry points

mod classifier;
mod coordinator;
mod fetcher;
mod frontier;
mod parser;
mod runner;

pub use classifier::{Classifier, UrlKind};
pub use coordinator::{SourceCrawler, SourceReport, SourceStats, DEFAULT_SITEMAP_PATHS};
pub use fetcher::{build_http_client, decode_body, FetchError, FetchedPage, Fetcher, RetryPolicy};
pub use frontier::{Frontier, FrontierEntry, Rejection};
pub use parser::{extract_links, extract_sitemap_locs, parse_links};
pub use runner::{run, run_with_shutdown, RunMode, RunResult, RunTarget};
