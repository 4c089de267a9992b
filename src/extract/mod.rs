//! Article extraction pipeline
//!
//! Turns a fetched article page into an [`ArticleRecord`]. Every field is read
//! through an ordered cascade of strategies (see [`strategy::Cascade`]); only a
//! missing or too-short body rejects the page.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use news_harvest::config::FieldSelectors;
//! use news_harvest::extract::ArticleExtractor;
//! use url::Url;
//!
//! let html = r#"<html><head><title>Nota</title></head><body>
//!     <h1 class="entry-title">Inauguran nuevo puente</h1>
//!     <div class="entry-content"><p>Las autoridades inauguraron esta mañana el nuevo puente sobre el río.</p></div>
//! </body></html>"#;
//!
//! let extractor = ArticleExtractor::new("diario", &FieldSelectors::default(), &[]).unwrap();
//! let url = Url::parse("https://diario.example.com/2024/03/15/puente/").unwrap();
//! let record = extractor.extract_html(html, &url, Utc::now()).unwrap();
//! assert_eq!(record.title, "Inauguran nuevo puente");
//! ```

mod datetime;
mod fields;
mod selectors;
pub mod strategy;
mod text;

pub use datetime::{parse_iso, parse_loose, Published};
pub use fields::{category_from_path, ContentBlock, SelectorSet};
pub use text::{clean_text, truncate_with_ellipsis, NoiseFilter};

use crate::article::{content_hash, ArticleRecord};
use crate::config::{FieldSelectors, SourceProfile};
use crate::ConfigError;
use chrono::{DateTime, Utc};
use fields::Page;
use scraper::Html;
use thiserror::Error;
use url::Url;

/// Why a strategy, or a whole record, produced nothing usable
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("no selector matched for {field}")]
    NoSelectorMatched { field: &'static str },

    #[error("{field} too short: {len} characters, need more than {min}")]
    FieldTooShort {
        field: &'static str,
        len: usize,
        min: usize,
    },
}

/// Extracts article records for one source
#[derive(Debug)]
pub struct ArticleExtractor {
    source_id: String,
    selectors: SelectorSet,
    category_markers: Vec<String>,
    noise: NoiseFilter,
}

impl ArticleExtractor {
    pub fn new(
        source_id: &str,
        field_selectors: &FieldSelectors,
        category_markers: &[String],
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            source_id: source_id.to_string(),
            selectors: SelectorSet::compile(field_selectors)?,
            category_markers: category_markers.to_vec(),
            noise: NoiseFilter::new(),
        })
    }

    pub fn from_profile(profile: &SourceProfile) -> Result<Self, ConfigError> {
        Self::new(
            &profile.id,
            &profile.field_selectors,
            &profile.category_path_segments,
        )
    }

    /// Parses `html` and extracts a record from it
    pub fn extract_html(
        &self,
        html: &str,
        url: &Url,
        now: DateTime<Utc>,
    ) -> Result<ArticleRecord, ExtractionError> {
        let document = Html::parse_document(html);
        self.extract(&document, url, now)
    }

    /// Extracts a record from an already parsed document
    ///
    /// `now` stamps the record and stands in for a missing publication date.
    pub fn extract(
        &self,
        document: &Html,
        url: &Url,
        now: DateTime<Utc>,
    ) -> Result<ArticleRecord, ExtractionError> {
        let page = Page {
            document,
            url,
            selectors: &self.selectors,
            noise: &self.noise,
        };

        let content = fields::content(&page)?;
        let title = fields::title(&page);
        let (published_date, published_time) = fields::published(&page, now);
        let summary = fields::summary(&page, &content);

        Ok(ArticleRecord {
            content_hash: content_hash(&title, &content.body),
            title,
            published_date,
            published_time,
            summary,
            body: content.body,
            category: fields::category(&page, &self.category_markers),
            author: fields::author(&page),
            tags: fields::tags(&page),
            url: url.to_string(),
            image_urls: fields::images(&page),
            extraction_timestamp: now,
            source_id: self.source_id.clone(),
        })
    }
}
