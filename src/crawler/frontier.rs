//! Per-source crawl frontier
//!
//! The frontier owns the FIFO queue of URLs still to fetch for one source,
//! the set of URLs already queued, and the set of URLs already handed out.
//! A URL enters the queue at most once per run.

use super::classifier::UrlKind;
use std::collections::{HashSet, VecDeque};
use url::Url;

/// A queued URL together with what it was classified as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub url: Url,
    pub kind: UrlKind,
    /// Number of discovery hops from a seed
    pub depth: u32,
}

/// Why a URL was not added to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Unknown,
    AlreadyQueued,
    AlreadyVisited,
}

#[derive(Debug)]
pub struct Frontier {
    queue: VecDeque<FrontierEntry>,
    queued: HashSet<String>,
    visited: HashSet<String>,
    dispatched: usize,
    page_budget: usize,
}

impl Frontier {
    /// Creates an empty frontier that hands out at most `page_budget` URLs
    pub fn new(page_budget: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            queued: HashSet::new(),
            visited: HashSet::new(),
            dispatched: 0,
            page_budget,
        }
    }

    /// Adds a seed URL at depth 0
    ///
    /// Seeds carry an explicit kind, since the source root and archive
    /// listings rarely match any classification pattern.
    pub fn seed(&mut self, url: Url, kind: UrlKind) -> Result<(), Rejection> {
        self.push(FrontierEntry {
            url,
            kind,
            depth: 0,
        })
    }

    /// Adds a URL found on a page at `parent_depth`
    pub fn push_discovered(
        &mut self,
        url: Url,
        kind: UrlKind,
        parent_depth: u32,
    ) -> Result<(), Rejection> {
        self.push(FrontierEntry {
            url,
            kind,
            depth: parent_depth.saturating_add(1),
        })
    }

    fn push(&mut self, entry: FrontierEntry) -> Result<(), Rejection> {
        if !entry.kind.should_enqueue() {
            return Err(Rejection::Unknown);
        }

        let key = entry.url.as_str();
        if self.visited.contains(key) {
            return Err(Rejection::AlreadyVisited);
        }
        if !self.queued.insert(key.to_string()) {
            return Err(Rejection::AlreadyQueued);
        }

        self.queue.push_back(entry);
        Ok(())
    }

    /// Takes up to `max` entries off the front of the queue
    ///
    /// Entries handed out are marked visited and count against the page
    /// budget. Returns an empty batch once the budget is spent.
    pub fn pop_batch(&mut self, max: usize) -> Vec<FrontierEntry> {
        let take = max.min(self.remaining_budget()).min(self.queue.len());
        let mut batch = Vec::with_capacity(take);

        for _ in 0..take {
            if let Some(entry) = self.queue.pop_front() {
                let key = entry.url.as_str().to_string();
                self.queued.remove(&key);
                self.visited.insert(key);
                self.dispatched += 1;
                batch.push(entry);
            }
        }

        batch
    }

    /// Marks a URL visited without fetching it, so it is never queued again
    pub fn mark_visited(&mut self, url: &Url) {
        self.visited.insert(url.as_str().to_string());
    }

    pub fn is_visited(&self, url: &Url) -> bool {
        self.visited.contains(url.as_str())
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Number of entries handed out by [`Frontier::pop_batch`]
    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    pub fn remaining_budget(&self) -> usize {
        self.page_budget.saturating_sub(self.dispatched)
    }

    /// Returns true if no more work can be handed out
    pub fn is_exhausted(&self) -> bool {
        self.queue.is_empty() || self.remaining_budget() == 0
    }
}
