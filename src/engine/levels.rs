//! Hierarchical levels: distinct indentation offsets of matched paragraphs.
//!
//! A level scan walks the whole document once on a background thread,
//! collects every paragraph matched by a hierarchical bookmark and probes
//! their horizontal offsets on a small rayon pool. The sorted distinct
//! offsets are the levels; the first is the outermost.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;

use rayon::prelude::*;

use crate::document::{Direction, Paragraph};
use crate::error::{Error, Result};
use crate::matcher::CompositeMatcher;
use crate::model::{Bookmark, ConfigId};
use crate::sync::{self, Future};

/// Sorted distinct offsets found in one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Levels {
    offsets: Vec<i32>,
}

impl Levels {
    /// Build from raw offsets in any order.
    pub fn from_offsets(offsets: impl IntoIterator<Item = i32>) -> Self {
        let mut offsets: Vec<i32> = offsets.into_iter().collect();
        offsets.sort_unstable();
        offsets.dedup();
        Self { offsets }
    }

    /// Zero-based rank of `offset`, if it is a known level.
    pub fn rank(&self, offset: i32) -> Option<usize> {
        self.offsets.binary_search(&offset).ok()
    }

    pub fn offsets(&self) -> &[i32] {
        &self.offsets
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

/// Paragraphs of the document matched by `bookmarks` (text and attribute
/// filters), in document order.
pub fn matched_paragraphs(
    bookmarks: &[Arc<Bookmark>],
    start: &Paragraph,
    matcher: &CompositeMatcher,
) -> Vec<Paragraph> {
    start
        .home()
        .walk(Direction::Forward)
        .filter(|p| {
            let text = p.text();
            matcher
                .find_matches(bookmarks, &text)
                .iter()
                .any(|m| p.matches_filters(&m.bookmark.attributes))
        })
        .collect()
}

/// Probe the offsets of `paragraphs` on a pool of `threads` workers.
pub fn probe_offsets(paragraphs: &[Paragraph], threads: usize) -> Levels {
    let probe = |p: &Paragraph| p.horizontal_offset();
    let offsets: Vec<Option<i32>> = match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(|| paragraphs.par_iter().map(probe).collect()),
        Err(e) => {
            log::debug!("offset probe pool unavailable, probing sequentially: {}", e);
            paragraphs.iter().map(probe).collect()
        }
    };
    Levels::from_offsets(offsets.into_iter().flatten())
}

/// Start a level scan on a background thread.
pub fn scan(
    bookmarks: Vec<Arc<Bookmark>>,
    start: Paragraph,
    matcher: CompositeMatcher,
    threads: usize,
) -> Future<Arc<Levels>> {
    let (promise, future) = sync::channel();
    let spawned = thread::Builder::new()
        .name("quickjump-levels".to_string())
        .spawn(move || {
            let paragraphs = matched_paragraphs(&bookmarks, &start, &matcher);
            let levels = probe_offsets(&paragraphs, threads);
            log::debug!(
                "level scan: {} matches, {} levels",
                paragraphs.len(),
                levels.len()
            );
            if let Err(e) = promise.set(Arc::new(levels)) {
                log::error!("level scan result dropped: {}", e);
            }
        });
    if let Err(e) = spawned {
        // The promise went down with the closure, so readers see an abandoned future.
        log::error!("could not start level scan: {}", e);
    }
    future
}

type CacheKey = (u64, ConfigId);

/// Level scans cached per (document, configuration).
#[derive(Debug, Default)]
pub struct LevelCache {
    entries: Mutex<HashMap<CacheKey, Future<Arc<Levels>>>>,
}

impl LevelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached scan for the key, started with `start_scan` when missing.
    pub fn get_or_scan<F>(&self, document: u64, config: ConfigId, start_scan: F) -> Result<Future<Arc<Levels>>>
    where
        F: FnOnce() -> Future<Arc<Levels>>,
    {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::Other("level cache lock poisoned".to_string()))?;
        let future = entries
            .entry((document, config))
            .or_insert_with(start_scan)
            .clone();
        Ok(future)
    }

    /// Forget the scan for one document and configuration.
    pub fn invalidate(&self, document: u64, config: ConfigId) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(&(document, config));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
