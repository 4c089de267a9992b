/// Outcome definitions for pages handled during a crawl
///
/// Every page handed out by the frontier ends in exactly one of these.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageOutcome {
    // ===== Discovery =====
    /// Listing or sitemap page mined for links
    Discovered,

    // ===== Article Success =====
    /// Record extracted and written to the durable store
    Stored,

    /// Record extracted, but the store already held its URL
    AlreadyStored,

    // ===== Article Skips =====
    /// URL already in the processed index; never fetched
    SkippedProcessed,

    /// Same title and body as an article already processed under another URL
    DuplicateContent,

    /// Extraction produced no acceptable body
    Rejected,

    // ===== Errors =====
    /// Fetch failed after the retry policy gave up
    FetchFailed,

    /// Record extracted but could not be written
    SinkFailed,

    // ===== Interrupt =====
    /// Fetch dropped because the run was interrupted
    Abandoned,
}

impl PageOutcome {
    /// Returns true if the outcome counts as a processed URL in the index
    ///
    /// Rejected pages and sink failures stay unmarked so a later run retries them.
    pub fn marks_processed(&self) -> bool {
        matches!(
            self,
            Self::Stored | Self::AlreadyStored | Self::DuplicateContent
        )
    }

    /// Returns true if this represents an error
    pub fn is_error(&self) -> bool {
        matches!(self, Self::FetchFailed | Self::SinkFailed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Stored => "stored",
            Self::AlreadyStored => "already_stored",
            Self::SkippedProcessed => "skipped_processed",
            Self::DuplicateContent => "duplicate_content",
            Self::Rejected => "rejected",
            Self::FetchFailed => "fetch_failed",
            Self::SinkFailed => "sink_failed",
            Self::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for PageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marks_processed() {
        assert!(PageOutcome::Stored.marks_processed());
        assert!(PageOutcome::AlreadyStored.marks_processed());
        assert!(PageOutcome::DuplicateContent.marks_processed());

        assert!(!PageOutcome::Rejected.marks_processed());
        assert!(!PageOutcome::SinkFailed.marks_processed());
        assert!(!PageOutcome::FetchFailed.marks_processed());
        assert!(!PageOutcome::Discovered.marks_processed());
        assert!(!PageOutcome::Abandoned.marks_processed());
    }

    #[test]
    fn test_is_error() {
        assert!(PageOutcome::FetchFailed.is_error());
        assert!(PageOutcome::SinkFailed.is_error());
        assert!(!PageOutcome::Rejected.is_error());
        assert!(!PageOutcome::Abandoned.is_error());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", PageOutcome::Stored), "stored");
        assert_eq!(
            format!("{}", PageOutcome::SkippedProcessed),
            "skipped_processed"
        );
    }
}
