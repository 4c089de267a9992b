//! Link discovery in fetched documents
//!
//! This module handles:
//! - Links to follow in HTML pages (`<a href>` and canonical links)
//! - `<loc>` entries of XML sitemaps and sitemap indexes

use crate::url::resolve_href;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

/// Extracts all followable links from an HTML document
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags anywhere in the document
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links and data URIs
/// - Same-page fragments
///
/// Links are resolved against `base_url`, normalized, and returned in
/// document order without duplicates.
pub fn extract_links(document: &Html, base_url: &Url) -> Vec<Url> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    let mut push = |href: &str| {
        if let Some(url) = resolve_href(base_url, href) {
            if seen.insert(url.as_str().to_string()) {
                links.push(url);
            }
        }
    };

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(href) = element.value().attr("href") {
                push(href);
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(href) = element.value().attr("href") {
                push(href);
            }
        }
    }

    links
}

/// Convenience wrapper parsing `html` before extracting links
pub fn parse_links(html: &str, base_url: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    extract_links(&document, base_url)
}

/// Extracts the `<loc>` entries of a sitemap or sitemap index
///
/// CDATA wrappers and XML entities are removed; entries that do not resolve
/// to an HTTP(S) URL are dropped.
pub fn extract_sitemap_locs(xml: &str, base_url: &Url) -> Vec<Url> {
    static LOC: OnceLock<Option<Regex>> = OnceLock::new();

    let Some(pattern) = LOC
        .get_or_init(|| {
            Regex::new(r"(?is)<loc>\s*(?:<!\[CDATA\[)?\s*(.*?)\s*(?:\]\]>)?\s*</loc>").ok()
        })
        .as_ref()
    else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    pattern
        .captures_iter(xml)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| resolve_href(base_url, &unescape_xml(m.as_str())))
        .filter(|url| seen.insert(url.as_str().to_string()))
        .collect()
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
