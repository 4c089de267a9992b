//! Link classification
//!
//! Every discovered URL is routed into exactly one [`UrlKind`]. The rule
//! order is fixed:
//!
//! 1. exclusion patterns (any match rejects the URL, whatever else matches)
//! 2. domain scope (the URL must be on the source's site)
//! 3. sitemap documents
//! 4. inclusion patterns, first match wins → `Article`
//! 5. pagination patterns, then category patterns
//! 6. structural heuristic on the path → `Article`
//! 7. otherwise `Unknown`

use crate::config::SourceProfile;
use crate::url::{same_site, PatternSet};
use crate::ConfigError;
use std::fmt;
use url::Url;

const DEFAULT_EXCLUDE: &[&str] = &[
    r"/wp-(admin|content|includes|json|login)",
    r"/feed/?$",
    r"/rss",
    r"/tag/",
    r"/etiqueta/",
    r"/author/",
    r"/autor/",
    r"/search",
    r"[?&]s=",
    r"/xmlrpc\.php",
    r"\.(pdf|jpe?g|png|gif|webp|svg|doc|docx|xls|zip|mp3|mp4)$",
];

const DEFAULT_INCLUDE: &[&str] = &[
    r"/\d{4}/\d{1,2}/\d{1,2}/[^/]+",
    r"/noticia",
    r"/news/",
    r"/articulo",
    r"/post/",
];

const DEFAULT_PAGINATION: &[&str] = &[r"/page/\d+", r"[?&]paged?=\d+", r"/pagina/\d+"];

const DEFAULT_CATEGORY: &[&str] = &[
    r"/categoria/",
    r"/category/",
    r"/seccion/",
    r"/section/",
    r"/\d{4}/\d{1,2}/(\d{1,2}/)?$",
];

/// What a discovered URL is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlKind {
    /// A single article; fetched and passed to extraction
    Article,
    /// A listing page in a paginated sequence; only mined for links
    Pagination,
    /// A section or archive listing; only mined for links
    Category,
    /// An XML sitemap; its `<loc>` entries are classified in bulk
    Sitemap,
    /// Rejected: excluded, off-site, or unrecognized
    Unknown,
}

impl UrlKind {
    /// Returns true if pages of this kind go through extraction
    pub fn is_extractable(&self) -> bool {
        matches!(self, Self::Article)
    }

    /// Returns true if pages of this kind are only used to discover links
    pub fn is_discovery(&self) -> bool {
        matches!(self, Self::Pagination | Self::Category | Self::Sitemap)
    }

    /// Returns true if this kind belongs in the frontier
    pub fn should_enqueue(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Pagination => "pagination",
            Self::Category => "category",
            Self::Sitemap => "sitemap",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for UrlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies URLs for one source profile
#[derive(Debug, Clone)]
pub struct Classifier {
    base: Url,
    exclude: PatternSet,
    include: PatternSet,
    pagination: PatternSet,
    category: PatternSet,
}

impl Classifier {
    /// Builds a classifier from a source profile
    ///
    /// Pattern lists left empty in the profile fall back to built-in defaults
    /// that fit common WordPress-style news sites.
    pub fn from_profile(profile: &SourceProfile) -> Result<Self, ConfigError> {
        let base = Url::parse(&profile.base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", profile.base_url, e)))?;

        let compile = |patterns: &[String], defaults: &[&str]| {
            PatternSet::compile_or_default(patterns, defaults).map_err(|e| {
                ConfigError::InvalidPattern(format!("source '{}': {}", profile.id, e))
            })
        };

        Ok(Self {
            base,
            exclude: compile(&profile.exclude_patterns, DEFAULT_EXCLUDE)?,
            include: compile(&profile.include_patterns, DEFAULT_INCLUDE)?,
            pagination: compile(&profile.pagination_patterns, DEFAULT_PAGINATION)?,
            category: compile(&profile.category_patterns, DEFAULT_CATEGORY)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Returns true if the URL is on this source's site
    pub fn in_scope(&self, url: &Url) -> bool {
        (url.scheme() == "http" || url.scheme() == "https") && same_site(url, &self.base)
    }

    /// Classifies a URL
    ///
    /// Never fails: ambiguity is settled by rule order alone.
    pub fn classify(&self, url: &Url) -> UrlKind {
        let candidate = url.as_str();

        if self.exclude.is_match(candidate) {
            return UrlKind::Unknown;
        }

        if !self.in_scope(url) {
            return UrlKind::Unknown;
        }

        if is_sitemap_path(url.path()) {
            return UrlKind::Sitemap;
        }

        if self.include.first_match(candidate).is_some() {
            return UrlKind::Article;
        }

        if self.pagination.is_match(candidate) {
            return UrlKind::Pagination;
        }

        if self.category.is_match(candidate) {
            return UrlKind::Category;
        }

        if looks_like_article_path(url.path()) {
            return UrlKind::Article;
        }

        UrlKind::Unknown
    }
}

fn is_sitemap_path(path: &str) -> bool {
    let lowered = path.to_ascii_lowercase();
    lowered.contains("sitemap") && lowered.ends_with(".xml")
}

/// Last-resort guess for sites without explicit article patterns
///
/// A path ending in `/` counts as an article when it is at least three
/// segments deep, or when its last segment is a slug of four or more words.
fn looks_like_article_path(path: &str) -> bool {
    if !path.ends_with('/') {
        return false;
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let Some(last) = segments.last() else {
        return false;
    };

    if last.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    segments.len() >= 3 || last.split('-').filter(|w| !w.is_empty()).count() >= 4
}
