//! Durable index of processed article URLs
//!
//! The index is a line-delimited file: each line is either `url` or
//! `url,content_hash`. It is loaded at run start, grows in memory while the
//! run marks URLs processed, and new lines are appended on every flush. The
//! file is never rewritten, so an interrupted flush loses at most the lines
//! that had not been written yet.

use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Length of a hex SHA-256 digest
const HASH_LEN: usize = 64;

#[derive(Debug)]
pub struct ProcessedIndex {
    path: Option<PathBuf>,
    urls: HashMap<String, Option<String>>,
    hashes: HashSet<String>,
    pending: Vec<String>,
    flush_every: usize,
}

impl ProcessedIndex {
    /// Loads the snapshot at `path`; a missing file is an empty index
    ///
    /// `flush_every` is the number of newly marked URLs after which
    /// [`ProcessedIndex::needs_flush`] reports true.
    pub fn load_snapshot(path: impl AsRef<Path>, flush_every: usize) -> io::Result<Self> {
        let path = path.as_ref();
        let mut index = Self {
            path: Some(path.to_path_buf()),
            ..Self::in_memory(flush_every)
        };

        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No processed-URL index at {}, starting empty", path.display());
                return Ok(index);
            }
            Err(e) => return Err(e),
        };

        for line in BufReader::new(file).lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (url, hash) = parse_line(line);
            index.insert(url.to_string(), hash.map(str::to_string));
        }

        info!(
            "Loaded {} processed URLs from {}",
            index.urls.len(),
            path.display()
        );
        Ok(index)
    }

    /// An index that is never written to disk
    pub fn in_memory(flush_every: usize) -> Self {
        Self {
            path: None,
            urls: HashMap::new(),
            hashes: HashSet::new(),
            pending: Vec::new(),
            flush_every: flush_every.max(1),
        }
    }

    pub fn is_processed(&self, url: &str) -> bool {
        self.urls.contains_key(url)
    }

    /// Returns true if an article with this content hash was already processed
    pub fn is_duplicate_content(&self, hash: &str) -> bool {
        self.hashes.contains(hash)
    }

    /// Records `url` as processed; returns false if it already was
    pub fn mark_processed(&mut self, url: &str, hash: Option<&str>) -> bool {
        if self.is_processed(url) {
            return false;
        }

        self.pending.push(match hash {
            Some(h) => format!("{},{}", url, h),
            None => url.to_string(),
        });
        self.insert(url.to_string(), hash.map(str::to_string));
        true
    }

    fn insert(&mut self, url: String, hash: Option<String>) {
        if let Some(h) = &hash {
            self.hashes.insert(h.clone());
        }
        match self.urls.get_mut(&url) {
            Some(existing) if hash.is_some() => *existing = hash,
            Some(_) => {}
            None => {
                self.urls.insert(url, hash);
            }
        }
    }

    /// Returns true once `flush_every` URLs have been marked since the last flush
    pub fn needs_flush(&self) -> bool {
        self.pending.len() >= self.flush_every
    }

    /// Appends every pending entry to the snapshot file
    ///
    /// Returns the number of lines written. On failure the pending entries
    /// are kept and the next flush retries them.
    pub fn persist_snapshot(&mut self) -> io::Result<usize> {
        let Some(path) = &self.path else {
            self.pending.clear();
            return Ok(0);
        };

        if self.pending.is_empty() {
            return Ok(0);
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);
        for line in &self.pending {
            writeln!(writer, "{}", line)?;
        }
        writer.flush()?;
        writer.get_ref().sync_data()?;

        let written = self.pending.len();
        self.pending.clear();
        debug!("Flushed {} processed URLs to {}", written, path.display());
        Ok(written)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// Splits `url,hash`; a trailing part that is not a digest belongs to the URL
fn parse_line(line: &str) -> (&str, Option<&str>) {
    match line.rsplit_once(',') {
        Some((url, hash))
            if hash.len() == HASH_LEN && hash.chars().all(|c| c.is_ascii_hexdigit()) =>
        {
            (url, Some(hash))
        }
        _ => (line, None),
    }
}
