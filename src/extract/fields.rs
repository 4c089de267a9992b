//! Per-field extraction strategies
//!
//! Each function builds a [`Cascade`] for one field of an article:
//! structured metadata first, then CSS selector cascades (profile selectors
//! ahead of the built-in ones), then derived fallbacks.

use super::datetime::{parse_iso, parse_loose, Published, MIDNIGHT};
use super::selectors::{self, IMAGE_DENYLIST};
use super::strategy::{longer_than, non_empty, Cascade};
use super::text::{clean_text, truncate_with_ellipsis, NoiseFilter};
use super::ExtractionError;
use crate::article::{MAX_IMAGES, MAX_TAGS, NO_TITLE, UNCATEGORIZED, UNKNOWN_AUTHOR};
use crate::config::FieldSelectors;
use crate::ConfigError;
use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use url::Url;

/// Cleaned body text must be longer than this to count as an article
pub const MIN_CONTENT_CHARS: usize = 50;

/// Summaries derived from the body use the first paragraph longer than this
pub const MIN_PARAGRAPH_CHARS: usize = 50;

/// Excerpt elements shorter than this are ignored
pub const MIN_EXCERPT_CHARS: usize = 20;

/// Summaries derived from the body are cut to this many characters
pub const SUMMARY_MAX_CHARS: usize = 300;

/// Compiled selector cascades for every field
#[derive(Debug)]
pub struct SelectorSet {
    title: Vec<Selector>,
    date: Vec<Selector>,
    content: Vec<Selector>,
    excerpt: Vec<Selector>,
    author: Vec<Selector>,
    profile_category: Vec<Selector>,
    breadcrumb: Vec<Selector>,
    category: Vec<Selector>,
    tags: Vec<Selector>,
    images: Vec<Selector>,
}

impl SelectorSet {
    /// Compiles profile selectors followed by the built-in defaults
    pub fn compile(profile: &FieldSelectors) -> Result<Self, ConfigError> {
        Ok(Self {
            title: cascade(&profile.title, selectors::TITLE)?,
            date: cascade(&profile.date, selectors::DATE)?,
            content: cascade(&profile.content, selectors::CONTENT)?,
            excerpt: cascade(&profile.summary, selectors::EXCERPT)?,
            author: cascade(&profile.author, selectors::AUTHOR)?,
            profile_category: cascade(&profile.category, &[])?,
            breadcrumb: cascade(&[], selectors::BREADCRUMB_ITEMS)?,
            category: cascade(&[], selectors::CATEGORY)?,
            tags: cascade(&profile.tags, selectors::TAGS)?,
            images: cascade(&profile.images, selectors::IMAGES)?,
        })
    }
}

fn cascade(configured: &[String], defaults: &[&str]) -> Result<Vec<Selector>, ConfigError> {
    configured
        .iter()
        .map(String::as_str)
        .chain(defaults.iter().copied())
        .map(|s| {
            Selector::parse(s)
                .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", s, e)))
        })
        .collect()
}

/// The body of an article, kept both flat and split into paragraphs
#[derive(Debug, Clone)]
pub struct ContentBlock {
    pub body: String,
    pub paragraphs: Vec<String>,
}

/// One parsed page plus everything needed to read fields from it
pub struct Page<'a> {
    pub document: &'a Html,
    pub url: &'a Url,
    pub selectors: &'a SelectorSet,
    pub noise: &'a NoiseFilter,
}

impl<'a> Page<'a> {
    /// `content` attribute of the first `<meta>` whose name or property is `key`
    fn meta(&self, key: &str) -> Option<String> {
        let selector =
            Selector::parse(&format!("meta[name=\"{0}\"], meta[property=\"{0}\"]", key)).ok()?;
        self.document
            .select(&selector)
            .filter_map(|m| m.value().attr("content"))
            .map(str::trim)
            .find(|c| !c.is_empty())
            .map(str::to_string)
    }

    /// Applies `read` to the first element of each selector until one succeeds
    fn first_match<T>(
        &self,
        field: &'static str,
        selectors: &[Selector],
        mut read: impl FnMut(ElementRef<'a>) -> Result<T, ExtractionError>,
    ) -> Result<T, ExtractionError> {
        let mut last_error = ExtractionError::NoSelectorMatched { field };
        for selector in selectors {
            if let Some(element) = self.document.select(selector).next() {
                match read(element) {
                    Ok(value) => return Ok(value),
                    Err(e) => last_error = e,
                }
            }
        }
        Err(last_error)
    }

    fn element_text(&self, element: ElementRef<'_>) -> String {
        clean_text(&self.noise.text_of(element))
    }
}

pub fn title(page: &Page<'_>) -> String {
    Cascade::new("title")
        .then("selectors", || {
            page.first_match("title", &page.selectors.title, |el| {
                non_empty("title", page.element_text(el))
            })
        })
        .then("og:title", || {
            non_empty("title", page.meta("og:title").map(|t| clean_text(&t)).unwrap_or_default())
        })
        .then("document title", || {
            let selector = Selector::parse("title").map_err(|_| {
                ExtractionError::NoSelectorMatched { field: "title" }
            })?;
            page.first_match("title", &[selector], |el| {
                non_empty("title", clean_text(&el.text().collect::<String>()))
            })
        })
        .run_or(NO_TITLE.to_string())
}

/// Publication date and time
///
/// Falls back to the date of `now` and midnight.
pub fn published(page: &Page<'_>, now: DateTime<Utc>) -> (String, String) {
    let found = Cascade::new("date")
        .then("iso metadata", || {
            ["article:published_time", "publishdate", "date"]
                .iter()
                .filter_map(|key| page.meta(key))
                .find_map(|value| parse_iso(&value))
                .ok_or(ExtractionError::NoSelectorMatched { field: "date" })
        })
        .then("time element", || {
            let selector = Selector::parse("time[datetime]")
                .map_err(|_| ExtractionError::NoSelectorMatched { field: "date" })?;
            page.document
                .select(&selector)
                .filter_map(|el| el.value().attr("datetime"))
                .find_map(parse_iso)
                .ok_or(ExtractionError::NoSelectorMatched { field: "date" })
        })
        .then("selectors", || {
            page.first_match("date", &page.selectors.date, |el| {
                let mut text = page.element_text(el);
                if text.is_empty() {
                    text = el.value().attr("datetime").unwrap_or_default().to_string();
                }
                let parsed = parse_loose(&text);
                if parsed.is_empty() {
                    Err(ExtractionError::NoSelectorMatched { field: "date" })
                } else {
                    Ok(parsed)
                }
            })
        })
        .run_or(Published {
            date: None,
            time: None,
        });

    (
        found
            .date
            .unwrap_or_else(|| now.format("%Y-%m-%d").to_string()),
        found.time.unwrap_or_else(|| MIDNIGHT.to_string()),
    )
}

/// Article body; the only field whose failure rejects the record
pub fn content(page: &Page<'_>) -> Result<ContentBlock, ExtractionError> {
    page.first_match("content", &page.selectors.content, |el| {
        let paragraphs = page.noise.paragraphs(el);
        let body = longer_than("content", paragraphs.join(" "), MIN_CONTENT_CHARS)?;
        Ok(ContentBlock { body, paragraphs })
    })
}

/// Summary: meta description verbatim, else an excerpt, else the first long paragraph
pub fn summary(page: &Page<'_>, content: &ContentBlock) -> String {
    Cascade::new("summary")
        .then("description", || {
            non_empty("summary", page.meta("description").unwrap_or_default())
        })
        .then("og:description", || {
            non_empty("summary", page.meta("og:description").unwrap_or_default())
        })
        .then("excerpt", || {
            page.first_match("summary", &page.selectors.excerpt, |el| {
                longer_than("summary", page.element_text(el), MIN_EXCERPT_CHARS)
            })
        })
        .then("first paragraph", || {
            content
                .paragraphs
                .iter()
                .find(|p| p.chars().count() > MIN_PARAGRAPH_CHARS)
                .map(|p| truncate_with_ellipsis(p, SUMMARY_MAX_CHARS))
                .ok_or(ExtractionError::NoSelectorMatched { field: "summary" })
        })
        .run_or(String::new())
}

pub fn author(page: &Page<'_>) -> String {
    Cascade::new("author")
        .then("metadata", || {
            ["author", "article:author"]
                .iter()
                .filter_map(|key| page.meta(key))
                .filter(|value| !value.starts_with("http://") && !value.starts_with("https://"))
                .map(|value| strip_author_prefix(&clean_text(&value)))
                .find(|value| !value.is_empty())
                .ok_or(ExtractionError::NoSelectorMatched { field: "author" })
        })
        .then("selectors", || {
            page.first_match("author", &page.selectors.author, |el| {
                non_empty("author", strip_author_prefix(&page.element_text(el)))
            })
        })
        .run_or(UNKNOWN_AUTHOR.to_string())
}

fn strip_author_prefix(text: &str) -> String {
    static PREFIX: OnceLock<Option<Regex>> = OnceLock::new();

    match PREFIX
        .get_or_init(|| Regex::new(r"(?i)^(by|por|autor)\b\s*:?\s*").ok())
        .as_ref()
    {
        Some(prefix) => prefix.replace(text, "").trim().to_string(),
        None => text.trim().to_string(),
    }
}

pub fn category(page: &Page<'_>, path_markers: &[String]) -> String {
    Cascade::new("category")
        .then("profile selectors", || {
            page.first_match("category", &page.selectors.profile_category, |el| {
                non_empty("category", page.element_text(el))
            })
        })
        .then("breadcrumb", || breadcrumb_parent(page))
        .then("article:section", || {
            non_empty(
                "category",
                page.meta("article:section")
                    .map(|s| clean_text(&s))
                    .unwrap_or_default(),
            )
        })
        .then("url path", || {
            category_from_path(page.url, path_markers)
                .ok_or(ExtractionError::NoSelectorMatched { field: "category" })
        })
        .then("selectors", || {
            page.first_match("category", &page.selectors.category, |el| {
                non_empty("category", page.element_text(el))
            })
        })
        .run_or(UNCATEGORIZED.to_string())
}

/// Second-to-last breadcrumb entry; the last one is usually the article itself
fn breadcrumb_parent(page: &Page<'_>) -> Result<String, ExtractionError> {
    let mut items: Vec<String> = Vec::new();
    for selector in &page.selectors.breadcrumb {
        for element in page.document.select(selector) {
            let text = page.element_text(element);
            // a linked <li> shows up twice in a row
            if text.chars().any(char::is_alphanumeric) && items.last() != Some(&text) {
                items.push(text);
            }
        }
    }

    match items.len() {
        n if n > 1 => Ok(items.swap_remove(n - 2)),
        _ => Err(ExtractionError::NoSelectorMatched { field: "category" }),
    }
}

/// Segment following a category marker: `/categoria/deportes-locales/` → `Deportes Locales`
pub fn category_from_path(url: &Url, markers: &[String]) -> Option<String> {
    let segments: Vec<&str> = url
        .path_segments()?
        .filter(|s| !s.is_empty())
        .collect();

    let position = segments
        .iter()
        .position(|s| markers.iter().any(|m| m.eq_ignore_ascii_case(s)))?;
    let segment = segments.get(position + 1)?;

    let words: Vec<String> = segment
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(title_case)
        .collect();

    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Keywords metadata, then tag links; first-seen order, at most [`MAX_TAGS`]
pub fn tags(page: &Page<'_>) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let mut push = |tag: String| {
        if !tag.is_empty() && !tags.contains(&tag) && tags.len() < MAX_TAGS {
            tags.push(tag);
        }
    };

    if let Some(keywords) = page.meta("keywords") {
        for keyword in keywords.split(',') {
            push(clean_text(keyword));
        }
    }

    for selector in &page.selectors.tags {
        for element in page.document.select(selector) {
            push(page.element_text(element));
        }
    }

    tags
}

/// Absolute article image URLs, skipping decoration; at most [`MAX_IMAGES`]
pub fn images(page: &Page<'_>) -> Vec<String> {
    let mut images: Vec<String> = Vec::new();

    'selectors: for selector in &page.selectors.images {
        for element in page.document.select(selector) {
            if images.len() >= MAX_IMAGES {
                break 'selectors;
            }

            let attrs = element.value();
            let Some(src) = ["src", "data-src", "data-lazy-src"]
                .iter()
                .filter_map(|name| attrs.attr(name))
                .map(str::trim)
                .find(|s| !s.is_empty() && !s.starts_with("data:"))
            else {
                continue;
            };

            let Some(absolute) = resolve_image(page.url, src) else {
                continue;
            };

            let lowered = absolute.to_ascii_lowercase();
            if IMAGE_DENYLIST.iter().any(|deny| lowered.contains(deny)) {
                continue;
            }

            if !images.contains(&absolute) {
                images.push(absolute);
            }
        }
    }

    images
}

fn resolve_image(page_url: &Url, src: &str) -> Option<String> {
    let absolute = page_url.join(src).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        document: Html,
        url: Url,
        selectors: SelectorSet,
        noise: NoiseFilter,
    }

    impl Fixture {
        fn new(html: &str) -> Self {
            Self::with_selectors(html, FieldSelectors::default())
        }

        fn with_selectors(html: &str, profile: FieldSelectors) -> Self {
            Self {
                document: Html::parse_document(html),
                url: Url::parse("https://diario.example.com/2024/03/15/nota-de-prueba/").unwrap(),
                selectors: SelectorSet::compile(&profile).unwrap(),
                noise: NoiseFilter::new(),
            }
        }

        fn page(&self) -> Page<'_> {
            Page {
                document: &self.document,
                url: &self.url,
                selectors: &self.selectors,
                noise: &self.noise,
            }
        }
    }

    const LONG_PARAGRAPH: &str = "El gobierno regional anunció hoy la construcción de un nuevo hospital en la ciudad.";

    #[test]
    fn test_title_selectors_and_sentinel() {
        let fx = Fixture::new("<html><body><h1 class='entry-title'>  Gran   noticia </h1></body></html>");
        assert_eq!(title(&fx.page()), "Gran noticia");

        let fx = Fixture::new("<html><head><title>Portada | Diario</title></head><body></body></html>");
        assert_eq!(title(&fx.page()), "Portada | Diario");

        let fx = Fixture::new("<html><body><p>nada</p></body></html>");
        assert_eq!(title(&fx.page()), NO_TITLE);
    }

    #[test]
    fn test_profile_selector_beats_default() {
        let profile = FieldSelectors {
            title: vec![".titular".to_string()],
            ..FieldSelectors::default()
        };
        let fx = Fixture::with_selectors(
            "<html><body><h1>Genérico</h1><div class='titular'>Específico</div></body></html>",
            profile,
        );
        assert_eq!(title(&fx.page()), "Específico");
    }

    #[test]
    fn test_published_from_meta() {
        let fx = Fixture::new(
            r#"<html><head><meta property="article:published_time" content="2024-03-15T10:30:00-05:00"></head></html>"#,
        );
        let (date, time) = published(&fx.page(), Utc::now());
        assert_eq!(date, "2024-03-15");
        assert_eq!(time, "10:30:00");
    }

    #[test]
    fn test_published_from_dom_text() {
        let fx = Fixture::new(r#"<html><body><span class="post-date">15/03/2024 10:30</span></body></html>"#);
        let (date, time) = published(&fx.page(), Utc::now());
        assert_eq!(date, "2024-03-15");
        assert_eq!(time, "10:30:00");
    }

    #[test]
    fn test_published_defaults_to_run_date() {
        let now = DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let fx = Fixture::new("<html><body><p>sin fecha</p></body></html>");
        assert_eq!(
            published(&fx.page(), now),
            ("2024-06-01".to_string(), "00:00:00".to_string())
        );
    }

    #[test]
    fn test_content_rejects_boilerplate() {
        let fx = Fixture::new("<html><body><div class='entry-content'><p>Muy corto.</p></div></body></html>");
        assert!(matches!(
            content(&fx.page()),
            Err(ExtractionError::FieldTooShort { field: "content", .. })
        ));
    }

    #[test]
    fn test_content_falls_through_short_match() {
        let html = format!(
            "<html><body><div class='entry-content'>Corto</div><article><p>{}</p><script>track()</script></article></body></html>",
            LONG_PARAGRAPH
        );
        let fx = Fixture::new(&html);
        let block = content(&fx.page()).unwrap();
        assert_eq!(block.body, LONG_PARAGRAPH);
    }

    #[test]
    fn test_summary_meta_verbatim() {
        let html = format!(
            r#"<html><head><meta name="description" content="  Resumen oficial.  "></head>
               <body><div class="excerpt">Un extracto suficientemente largo</div><p>{}</p></body></html>"#,
            LONG_PARAGRAPH
        );
        let fx = Fixture::new(&html);
        let block = ContentBlock {
            body: LONG_PARAGRAPH.to_string(),
            paragraphs: vec![LONG_PARAGRAPH.to_string()],
        };
        assert_eq!(summary(&fx.page(), &block), "Resumen oficial.");
    }

    #[test]
    fn test_summary_excerpt_then_paragraph() {
        let fx = Fixture::new("<html><body><div class='excerpt'>Un extracto suficientemente largo</div></body></html>");
        let block = ContentBlock {
            body: String::new(),
            paragraphs: vec![],
        };
        assert_eq!(summary(&fx.page(), &block), "Un extracto suficientemente largo");

        let fx = Fixture::new("<html><body><div class='excerpt'>Breve</div></body></html>");
        let long = "x".repeat(400);
        let block = ContentBlock {
            body: long.clone(),
            paragraphs: vec!["Corto".to_string(), long],
        };
        let derived = summary(&fx.page(), &block);
        assert_eq!(derived.chars().count(), 303);
        assert!(derived.ends_with("..."));
    }

    #[test]
    fn test_author_prefix_and_sentinel() {
        let fx = Fixture::new("<html><body><span class='byline'>Por: María Quispe</span></body></html>");
        assert_eq!(author(&fx.page()), "María Quispe");

        let fx = Fixture::new("<html><body><span class='author'>Portillo Ramos</span></body></html>");
        assert_eq!(author(&fx.page()), "Portillo Ramos");

        let fx = Fixture::new(
            r#"<html><head><meta property="article:author" content="https://facebook.com/diario"></head></html>"#,
        );
        assert_eq!(author(&fx.page()), UNKNOWN_AUTHOR);
    }

    #[test]
    fn test_category_order() {
        let fx = Fixture::new(
            r#"<html><head><meta property="article:section" content="Política"></head><body>
               <ul class="breadcrumb"><li><a href="/">Inicio</a></li><li><a href="/deportes/">Deportes</a></li><li>La nota</li></ul>
               </body></html>"#,
        );
        assert_eq!(category(&fx.page(), &[]), "Deportes");

        let fx = Fixture::new(
            r#"<html><head><meta property="article:section" content="Política"></head></html>"#,
        );
        assert_eq!(category(&fx.page(), &[]), "Política");

        let fx = Fixture::new("<html><body></body></html>");
        assert_eq!(category(&fx.page(), &[]), UNCATEGORIZED);
    }

    #[test]
    fn test_category_from_path() {
        let url = Url::parse("https://a.com/categoria/deportes-locales/nota/").unwrap();
        let markers = vec!["categoria".to_string()];
        assert_eq!(
            category_from_path(&url, &markers).as_deref(),
            Some("Deportes Locales")
        );

        let url = Url::parse("https://a.com/categoria/").unwrap();
        assert_eq!(category_from_path(&url, &markers), None);
    }

    #[test]
    fn test_tags_merged_deduplicated_capped() {
        let links: String = (0..15)
            .map(|i| format!("<a href='/tag/t{0}'>t{0}</a>", i))
            .collect();
        let html = format!(
            r#"<html><head><meta name="keywords" content="t1, Puno ,, t2"></head>
               <body><div class="tags">{}</div></body></html>"#,
            links
        );
        let fx = Fixture::new(&html);
        let tags = tags(&fx.page());
        assert_eq!(tags.len(), MAX_TAGS);
        assert_eq!(&tags[..4], &["t1", "Puno", "t2", "t0"]);
    }

    #[test]
    fn test_images_resolved_filtered_capped() {
        let fx = Fixture::new(
            r#"<html><body><article>
                <img src="/wp-content/uploads/logo-diario.png">
                <img src="//cdn.example.com/fotos/hospital.jpg">
                <img data-src="fotos/alcalde.jpg">
                <img data-lazy-src="/fotos/tercera.jpg">
                <img src="/fotos/icon-share.svg">
            </article></body></html>"#,
        );
        let images = images(&fx.page());
        assert_eq!(
            images,
            vec![
                "https://cdn.example.com/fotos/hospital.jpg",
                "https://diario.example.com/2024/03/15/nota-de-prueba/fotos/alcalde.jpg",
            ]
        );
    }
}
