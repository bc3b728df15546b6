//! Composite matcher: one alternation regex over many bookmarks.
//!
//! Every matchable bookmark contributes its fragment as a named group
//! `QJ_<i>`. A search reports which group matched; that bookmark is then
//! removed and the search repeats, so each bookmark is reported at most once,
//! at its first occurrence.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use regex::Regex;

use crate::model::{Bookmark, BookmarkId};

/// Maximum number of compiled composites kept before the cache is reset.
const CACHE_CAPACITY: usize = 128;

const GROUP_PREFIX: &str = "QJ_";

/// One bookmark match within a paragraph's text.
#[derive(Debug, Clone)]
pub struct BookmarkMatch {
    pub bookmark: Arc<Bookmark>,
    /// Matched text
    pub text: String,
    /// Byte offset of the match start
    pub start: usize,
    /// Byte offset one past the match end
    pub end: usize,
}

#[derive(Debug)]
enum Composite {
    Combined { regex: Regex, groups: Vec<String> },
    /// Used when the combined pattern does not compile (size limits,
    /// clashing group names inside user patterns).
    Separate(Vec<Regex>),
}

/// Matches many bookmarks against paragraph text in one pass.
///
/// Cheap to clone; clones share the compiled-regex cache.
#[derive(Debug, Clone, Default)]
pub struct CompositeMatcher {
    cache: Arc<Mutex<HashMap<Vec<BookmarkId>, Arc<Composite>>>>,
}

impl CompositeMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// All bookmarks matching `text`, in the order of `bookmarks`.
    ///
    /// Bookmarks whose fragment failed to compile contribute nothing.
    pub fn find_matches(&self, bookmarks: &[Arc<Bookmark>], text: &str) -> Vec<BookmarkMatch> {
        let mut candidates: Vec<(usize, &Arc<Bookmark>)> = bookmarks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.fragment().is_some())
            .collect();
        let mut found: Vec<(usize, BookmarkMatch)> = Vec::new();

        while !candidates.is_empty() {
            let composite = self.composite(candidates.iter().map(|(_, b)| *b));
            let Some((i, start, end)) = search(&composite, text) else {
                break;
            };
            let (index, bookmark) = candidates.remove(i);
            found.push((
                index,
                BookmarkMatch {
                    bookmark: Arc::clone(bookmark),
                    text: text[start..end].to_string(),
                    start,
                    end,
                },
            ));
        }

        found.sort_by_key(|(index, _)| *index);
        found.into_iter().map(|(_, m)| m).collect()
    }

    /// First bookmark (in list order) matching `text`.
    pub fn first_match(&self, bookmarks: &[Arc<Bookmark>], text: &str) -> Option<BookmarkMatch> {
        self.find_matches(bookmarks, text).into_iter().next()
    }

    /// Number of cached composites.
    pub fn cached(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn composite<'a>(&self, bookmarks: impl Iterator<Item = &'a Arc<Bookmark>> + Clone) -> Arc<Composite> {
        let key: Vec<BookmarkId> = bookmarks.clone().map(|b| b.id()).collect();
        let Ok(mut cache) = self.cache.lock() else {
            return Arc::new(compile(bookmarks));
        };
        if let Some(composite) = cache.get(&key) {
            return Arc::clone(composite);
        }
        if cache.len() >= CACHE_CAPACITY {
            cache.clear();
        }
        let composite = Arc::new(compile(bookmarks));
        cache.insert(key, Arc::clone(&composite));
        composite
    }
}

fn compile<'a>(bookmarks: impl Iterator<Item = &'a Arc<Bookmark>>) -> Composite {
    let fragments: Vec<&str> = bookmarks.filter_map(|b| b.fragment()).collect();
    let groups: Vec<String> = (0..fragments.len())
        .map(|i| format!("{}{}", GROUP_PREFIX, i))
        .collect();
    let source = fragments
        .iter()
        .zip(&groups)
        .map(|(fragment, group)| format!("(?P<{}>{})", group, fragment))
        .collect::<Vec<_>>()
        .join("|");

    match Regex::new(&source) {
        Ok(regex) => Composite::Combined { regex, groups },
        Err(e) => {
            log::debug!("composite pattern rejected, matching separately: {}", e);
            Composite::Separate(fragments.iter().filter_map(|f| Regex::new(f).ok()).collect())
        }
    }
}

/// Candidate index and byte span of the leftmost match.
fn search(composite: &Composite, text: &str) -> Option<(usize, usize, usize)> {
    match composite {
        Composite::Combined { regex, groups } => {
            let caps = regex.captures(text)?;
            groups
                .iter()
                .enumerate()
                .find_map(|(i, name)| caps.name(name).map(|m| (i, m.start(), m.end())))
        }
        Composite::Separate(regexes) => regexes
            .iter()
            .enumerate()
            .filter_map(|(i, re)| re.find(text).map(|m| (i, m.start(), m.end())))
            .min_by_key(|(i, start, _)| (*start, *i)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BookmarkCategory, BookmarkData, PatternMatch};

    fn bookmark(pattern: &str, pattern_match: PatternMatch) -> Arc<Bookmark> {
        BookmarkData::new(BookmarkCategory::QuickJump, pattern, pattern_match).build()
    }

    #[test]
    fn test_overlapping_substrings() {
        let b1 = bookmark("ab", PatternMatch::Substring);
        let b2 = bookmark("abc", PatternMatch::Substring);
        let matcher = CompositeMatcher::new();
        let matches = matcher.find_matches(&[b1.clone(), b2.clone()], "xxabcxx");
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].bookmark.id(), b1.id());
        assert_eq!((matches[0].start, matches[0].end), (2, 4));
        assert_eq!(matches[1].bookmark.id(), b2.id());
        assert_eq!((matches[1].start, matches[1].end), (2, 5));
        assert_eq!(matches[1].text, "abc");
    }

    #[test]
    fn test_exact_is_anchored() {
        let exact = bookmark("Next", PatternMatch::Exact);
        let matcher = CompositeMatcher::new();
        assert!(matcher.first_match(&[exact.clone()], "Next page").is_none());
        assert!(matcher.first_match(&[exact], "Next").is_some());
    }

    #[test]
    fn test_substring_escapes_metacharacters() {
        let b = bookmark("(1)", PatternMatch::Substring);
        let matcher = CompositeMatcher::new();
        assert!(matcher.first_match(&[b.clone()], "item 1").is_none());
        assert_eq!(matcher.first_match(&[b], "item (1)").unwrap().start, 5);
    }

    #[test]
    fn test_broken_bookmark_is_omitted() {
        let broken = bookmark("(", PatternMatch::Regex);
        let good = bookmark("x", PatternMatch::Regex);
        let matcher = CompositeMatcher::new();
        let matches = matcher.find_matches(&[broken, good.clone()], "x");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].bookmark.id(), good.id());
    }

    #[test]
    fn test_clashing_group_names_fall_back() {
        let a = bookmark("(?P<QJ_1>a)", PatternMatch::Regex);
        let b = bookmark("b", PatternMatch::Regex);
        let matcher = CompositeMatcher::new();
        let matches = matcher.find_matches(&[a, b], "ba");
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].text, "a");
        assert_eq!(matches[1].text, "b");
    }

    #[test]
    fn test_cache_is_keyed_by_identity() {
        let a = bookmark("a", PatternMatch::Substring);
        let a2 = bookmark("a", PatternMatch::Substring);
        let matcher = CompositeMatcher::new();
        matcher.find_matches(&[a.clone()], "zzz");
        matcher.find_matches(&[a], "zzz");
        assert_eq!(matcher.cached(), 1);
        matcher.find_matches(&[a2], "zzz");
        assert_eq!(matcher.cached(), 2);
    }
}
