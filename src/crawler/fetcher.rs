//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - Retry logic for transient failures and rate limiting
//! - Character set detection and decoding of response bodies
//! - Error classification

use crate::config::{FetcherConfig, UserAgentConfig};
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use regex::bytes::Regex;
use reqwest::{header::CONTENT_TYPE, redirect::Policy, Client};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Only the head of a document is searched for a declared charset
const CHARSET_SNIFF_LIMIT: usize = 2048;

/// Errors produced while fetching a page
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("unreachable after {attempts} attempts: {reason}")]
    Unreachable { attempts: u32, reason: String },
}

impl FetchError {
    /// Returns true if the request may succeed when simply repeated
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::ConnectionFailed(_) | Self::Body(_) => true,
            Self::HttpStatus(code) => (500..=599).contains(code),
            Self::Unreachable { .. } => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::HttpStatus(429))
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if let Some(status) = e.status() {
            Self::HttpStatus(status.as_u16())
        } else {
            Self::ConnectionFailed(e.to_string())
        }
    }
}

/// A successfully fetched and decoded page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub final_url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl FetchedPage {
    /// Returns true if the response looks like an XML document
    pub fn is_xml(&self) -> bool {
        match &self.content_type {
            Some(ct) => ct.contains("xml") && !ct.contains("xhtml"),
            None => self.body.trim_start().starts_with("<?xml"),
        }
    }
}

/// How a failing request is repeated
///
/// | Condition                         | Action                                       |
/// |-----------------------------------|----------------------------------------------|
/// | HTTP 429                          | wait `rate_limit_base * n`, budget untouched |
/// | timeout, 5xx, connection failure  | wait `backoff_unit * 2^i`, consumes budget   |
/// | any other 4xx                     | fail immediately                             |
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub rate_limit_base: Duration,
    pub max_rate_limit_waits: u32,
    pub backoff_unit: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &FetcherConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            rate_limit_base: Duration::from_secs_f64(config.rate_limit_base_seconds),
            max_rate_limit_waits: config.max_rate_limit_waits,
            backoff_unit: Duration::from_secs_f64(config.backoff_unit_seconds),
        }
    }

    /// Sleep before retry attempt `i` (0-based) after a transient failure
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Sleep after the `n`-th consecutive rate-limit response (1-based)
    pub fn rate_limit_delay(&self, n: u32) -> Duration {
        self.rate_limit_base.saturating_mul(n.max(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetcherConfig::default())
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use news_harvest::config::{FetcherConfig, UserAgentConfig};
/// use news_harvest::crawler::build_http_client;
///
/// let ua = UserAgentConfig {
///     crawler_name: "NewsHarvest".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.com/about".to_string(),
/// };
///
/// let client = build_http_client(&ua, &FetcherConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    fetcher: &FetcherConfig,
) -> Result<Client, reqwest::Error> {
    // Format: CrawlerName/Version (+ContactURL)
    let agent = format!(
        "{}/{} (+{})",
        user_agent.crawler_name, user_agent.crawler_version, user_agent.contact_url
    );

    Client::builder()
        .user_agent(agent)
        .timeout(Duration::from_secs(fetcher.timeout_seconds))
        .connect_timeout(Duration::from_secs(fetcher.timeout_seconds.min(10)))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches pages under a [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches a URL, retrying as the policy allows
    ///
    /// Exhausting the retry budget, or the cap on rate-limit waits, yields
    /// [`FetchError::Unreachable`]. Non-retryable statuses are returned as-is.
    pub async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let mut failures = 0u32;
        let mut rate_limit_waits = 0u32;

        loop {
            let error = match self.fetch_once(url).await {
                Ok(page) => return Ok(page),
                Err(e) => e,
            };

            if error.is_rate_limited() {
                if rate_limit_waits >= self.policy.max_rate_limit_waits {
                    return Err(FetchError::Unreachable {
                        attempts: failures + rate_limit_waits + 1,
                        reason: "still rate limited".to_string(),
                    });
                }
                rate_limit_waits += 1;
                let wait = self.policy.rate_limit_delay(rate_limit_waits);
                warn!("Rate limited on {}, waiting {:?}", url, wait);
                tokio::time::sleep(wait).await;
                continue;
            }

            if !error.is_transient() {
                return Err(error);
            }

            failures += 1;
            if failures >= self.policy.max_retries {
                return Err(FetchError::Unreachable {
                    attempts: failures + rate_limit_waits,
                    reason: error.to_string(),
                });
            }

            let wait = self.policy.backoff_delay(failures - 1);
            warn!(
                "Fetch of {} failed ({}), retry {}/{} in {:?}",
                url, error, failures, self.policy.max_retries, wait
            );
            tokio::time::sleep(wait).await;
        }
    }

    async fn fetch_once(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))?;

        let body = decode_body(&bytes, content_type.as_deref());
        debug!("Fetched {} ({} bytes)", final_url, bytes.len());

        Ok(FetchedPage {
            final_url,
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

/// Decodes a response body to text
///
/// The charset comes from the Content-Type header when declared; otherwise
/// from a `<meta charset>` or XML declaration in the document head; otherwise
/// UTF-8 if the bytes are valid UTF-8, else Windows-1252.
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> String {
    let encoding = content_type
        .and_then(charset_from_content_type)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| sniff_declared_charset(bytes))
        .unwrap_or_else(|| {
            if std::str::from_utf8(bytes).is_ok() {
                UTF_8
            } else {
                WINDOWS_1252
            }
        });

    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
        } else {
            None
        }
    })
}

fn sniff_declared_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    static DECLARATION: OnceLock<Option<Regex>> = OnceLock::new();

    let pattern = DECLARATION
        .get_or_init(|| {
            Regex::new(
                r#"(?i)(?:<meta[^>]*charset\s*=\s*["']?|<\?xml[^>]*encoding\s*=\s*["'])([A-Za-z0-9_:.\-]+)"#,
            )
            .ok()
        })
        .as_ref()?;

    let head = &bytes[..bytes.len().min(CHARSET_SNIFF_LIMIT)];
    let label = pattern.captures(head)?.get(1)?;
    Encoding::for_label(label.as_bytes())
}
