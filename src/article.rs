//! The normalized article record produced by the extraction pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Maximum number of tags kept per article
pub const MAX_TAGS: usize = 10;

/// Maximum number of image URLs kept per article
pub const MAX_IMAGES: usize = 2;

/// Title used when no title strategy produced a value
pub const NO_TITLE: &str = "no title";

/// Author used when no author strategy produced a value
pub const UNKNOWN_AUTHOR: &str = "unknown author";

/// Category used when no category strategy produced a value
pub const UNCATEGORIZED: &str = "uncategorized";

/// One extracted article
///
/// `url` is the identity of a record: the durable store keeps at most one
/// row per URL and ignores later inserts for the same URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub title: String,
    /// Publication date, `YYYY-MM-DD`
    pub published_date: String,
    /// Publication time, `HH:MM:SS`
    pub published_time: String,
    pub summary: String,
    pub body: String,
    pub category: String,
    pub author: String,
    /// Ordered, deduplicated, at most [`MAX_TAGS`] entries
    pub tags: Vec<String>,
    pub url: String,
    /// Absolute image URLs, at most [`MAX_IMAGES`] entries
    pub image_urls: Vec<String>,
    pub extraction_timestamp: DateTime<Utc>,
    pub source_id: String,
    /// Hex SHA-256 over title and body
    pub content_hash: String,
}

impl ArticleRecord {
    /// Formats the extraction timestamp the way flat exports and the store expect
    pub fn extraction_timestamp_string(&self) -> String {
        self.extraction_timestamp
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}

/// Computes the content hash used to detect the same article reachable via different URLs
pub fn content_hash(title: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable() {
        let a = content_hash("Title", "Body text");
        let b = content_hash("Title", "Body text");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_content_hash_depends_on_title_and_body() {
        assert_ne!(content_hash("Title", "Body"), content_hash("Other", "Body"));
        assert_ne!(content_hash("Title", "Body"), content_hash("Title", "Other"));
    }
}
