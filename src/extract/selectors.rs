//! Built-in selector cascades
//!
//! These follow the markup of common CMS themes (WordPress and friends).
//! Selectors configured in a source profile are always tried first.

pub(crate) const TITLE: &[&str] = &[
    "h1.entry-title",
    "h1.post-title",
    "h1.article-title",
    "h1.news-title",
    ".title h1",
    ".headline h1",
    "h1",
    ".entry-title",
    ".post-title",
    ".article-title",
];

pub(crate) const DATE: &[&str] = &[
    ".entry-date",
    ".post-date",
    ".date",
    ".published",
    ".article-date",
    "time[datetime]",
    ".entry-meta time",
    ".post-meta .date",
    ".news-date",
    "[class*='date']",
    "[class*='time']",
];

pub(crate) const CONTENT: &[&str] = &[
    ".entry-content",
    ".post-content",
    ".article-content",
    ".news-content",
    ".td-post-content",
    ".post-body",
    ".entry-body",
    ".single-content",
    ".news-body",
    "article .content",
    ".content",
    "article",
];

pub(crate) const EXCERPT: &[&str] = &[
    ".entry-excerpt",
    ".post-excerpt",
    ".excerpt",
    ".summary",
    ".lead",
    ".bajada",
    ".news-excerpt",
    ".article-excerpt",
];

pub(crate) const AUTHOR: &[&str] = &[
    ".author-name",
    ".entry-author",
    ".post-author",
    ".article-author",
    ".by-author",
    ".byline",
    ".writer",
    ".news-author",
    "[rel='author']",
    ".author",
];

/// One grouped selector, so items come back in document order
pub(crate) const BREADCRUMB_ITEMS: &[&str] =
    &[".breadcrumb a, .breadcrumbs a, .breadcrumb li, .breadcrumbs li"];

pub(crate) const CATEGORY: &[&str] = &[
    ".cat-links a",
    ".entry-category",
    ".post-category",
    ".article-category",
    ".news-category",
    ".categories a",
    ".category",
];

pub(crate) const TAGS: &[&str] = &[
    ".tags a",
    ".post-tags a",
    ".tag a",
    ".article-tags a",
    ".entry-tags a",
    ".news-tags a",
    ".tag-links a",
    "a[rel='tag']",
];

pub(crate) const IMAGES: &[&str] = &[
    ".entry-content img",
    ".post-content img",
    ".article-content img",
    ".featured-image img",
    ".post-thumbnail img",
    ".wp-post-image",
    "article img",
    ".content img",
    ".news-content img",
];

/// Subtrees whose text never belongs to an article body
pub(crate) const NOISE: &[&str] = &[
    "script",
    "style",
    "noscript",
    "iframe",
    "form",
    ".ad",
    ".ads",
    ".advertisement",
    ".social-share",
    ".share",
    ".sharedaddy",
    ".related-posts",
];

/// Image URLs containing any of these are decoration, not article images
pub(crate) const IMAGE_DENYLIST: &[&str] = &["icon", "logo", "avatar", "emoji", "sprite"];
