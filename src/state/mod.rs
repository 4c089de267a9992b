//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `ProcessedIndex`: the durable processed-URL index shared by every run
//! - `PageOutcome`: what became of each page handed out by the frontier

mod page_outcome;
mod processed_index;

// Re-export main types
pub use page_outcome::PageOutcome;
pub use processed_index::ProcessedIndex;
