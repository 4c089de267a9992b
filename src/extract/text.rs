//! Text cleanup shared by every extracted field

use super::selectors::NOISE;
use regex::Regex;
use scraper::{ElementRef, Selector};
use std::sync::OnceLock;

/// Tags that end a run of inline text
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote",
    "section", "article", "header", "footer", "figure", "figcaption", "table", "tr", "td",
];

/// Normalizes a text fragment for storage
///
/// Non-breaking spaces become plain spaces, control characters and residual
/// markup fragments are removed, and whitespace runs collapse to one space.
pub fn clean_text(text: &str) -> String {
    static MARKUP: OnceLock<Option<Regex>> = OnceLock::new();

    let without_markup = match MARKUP
        .get_or_init(|| Regex::new(r"<[^>]+>").ok())
        .as_ref()
    {
        Some(markup) => markup.replace_all(text, " "),
        None => text.into(),
    };

    let replaced = without_markup.replace("&nbsp;", " ");

    let mut out = String::with_capacity(replaced.len());
    let mut pending_space = false;
    for c in replaced.chars() {
        if c.is_whitespace() || c == '\u{a0}' || c == '\u{202f}' {
            pending_space = true;
        } else if c.is_control() || c == '\u{200b}' || c == '\u{feff}' {
            continue;
        } else {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        }
    }

    out
}

/// Cuts `text` to `max_chars` characters, appending `...` when it was longer
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", text[..cut].trim_end()),
        None => text.to_string(),
    }
}

/// Subtrees skipped during text extraction (scripts, ads, share widgets)
#[derive(Debug)]
pub struct NoiseFilter {
    selectors: Vec<Selector>,
}

impl NoiseFilter {
    pub fn new() -> Self {
        Self {
            selectors: NOISE
                .iter()
                .filter_map(|s| Selector::parse(s).ok())
                .collect(),
        }
    }

    pub fn is_noise(&self, element: &ElementRef<'_>) -> bool {
        self.selectors.iter().any(|s| s.matches(element))
    }

    /// Raw text of `element` with noise subtrees left out
    ///
    /// Block boundaries become newlines so paragraphs can be told apart.
    pub fn text_of(&self, element: ElementRef<'_>) -> String {
        let mut out = String::new();
        self.collect(element, &mut out);
        out
    }

    /// Cleaned text of every paragraph below `element`, in document order
    pub fn paragraphs(&self, element: ElementRef<'_>) -> Vec<String> {
        self.text_of(element)
            .split('\n')
            .map(clean_text)
            .filter(|p| !p.is_empty())
            .collect()
    }

    fn collect(&self, element: ElementRef<'_>, out: &mut String) {
        if self.is_noise(&element) {
            return;
        }

        let is_block = BLOCK_TAGS.contains(&element.value().name());
        if is_block {
            out.push('\n');
        }

        for child in element.children() {
            if let Some(text) = child.value().as_text() {
                out.push_str(text);
            } else if let Some(child_element) = ElementRef::wrap(child) {
                self.collect(child_element, out);
            }
        }

        if is_block {
            out.push('\n');
        }
    }
}

impl Default for NoiseFilter {
    fn default() -> Self {
        Self::new()
    }
}
