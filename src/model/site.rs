//! Sites: URL-matching groups of bookmarks.

use std::borrow::Cow;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::bookmark::{Bookmark, BookmarkCategory};

int_enum! {
    /// How a site's `domain` is compared with the document URL.
    pub enum UrlMatch {
        Ignore = 0,
        Domain = 1,
        Subdomain = 2,
        Substring = 3,
        Exact = 4,
        Regex = 5,
        Empty = 6,
    }
}

int_enum! {
    /// Focus handling override. Larger values are stricter.
    #[derive(Default)]
    pub enum FocusMode {
        #[default]
        Unchanged = 0,
        DontEnterFormMode = 1,
        DisableFocus = 2,
    }
}

int_enum! {
    /// Live region announcements.
    #[derive(Default)]
    pub enum LiveRegionMode {
        #[default]
        Unchanged = 0,
        Mute = 1,
    }
}

int_enum! {
    /// Debug chimes on page events.
    #[derive(Default)]
    pub enum DebugBeepMode {
        #[default]
        Off = 0,
        FocusEvents = 1,
        LiveRegions = 2,
        All = 3,
    }
}

fn default_auto_click_category() -> BookmarkCategory {
    BookmarkCategory::QuickClick
}

/// A URL-matching rule bundling bookmarks and page-load behaviours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    #[serde(default)]
    pub domain: String,
    pub url_match: UrlMatch,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub focus_mode: FocusMode,
    #[serde(default)]
    pub live_region_mode: LiveRegionMode,
    #[serde(default)]
    pub debug_beep_mode: DebugBeepMode,
    #[serde(default)]
    pub bookmarks: Vec<Arc<Bookmark>>,
    #[serde(default)]
    pub auto_click_on_focus: bool,
    #[serde(default = "default_auto_click_category")]
    pub auto_click_category: BookmarkCategory,
    /// Milliseconds
    #[serde(default)]
    pub auto_click_on_focus_delay: u64,
    #[serde(default)]
    pub auto_click_continuous: bool,
    /// Milliseconds
    #[serde(default)]
    pub auto_click_continuous_delay: u64,
    #[serde(default)]
    pub suppress_description: bool,
    #[serde(skip)]
    url_regex: UrlRegex,
}

/// Regex form of a site's domain, compiled on first use.
#[derive(Debug, Clone, Default)]
struct UrlRegex(OnceLock<(String, Option<Regex>)>);

impl PartialEq for UrlRegex {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

/// `re.match` semantics: the pattern must match at the start of the URL.
fn compile_url_regex(site: &str, pattern: &str) -> Option<Regex> {
    match Regex::new(&format!("^(?:{})", pattern)) {
        Ok(re) => Some(re),
        Err(e) => {
            log::warn!("site '{}': invalid URL regex: {}", site, e);
            None
        }
    }
}

impl Site {
    /// Create a site with no bookmarks and default behaviours.
    pub fn new(domain: impl Into<String>, url_match: UrlMatch) -> Self {
        Self {
            domain: domain.into(),
            url_match,
            name: String::new(),
            focus_mode: FocusMode::Unchanged,
            live_region_mode: LiveRegionMode::Unchanged,
            debug_beep_mode: DebugBeepMode::Off,
            bookmarks: Vec::new(),
            auto_click_on_focus: false,
            auto_click_category: default_auto_click_category(),
            auto_click_on_focus_delay: 0,
            auto_click_continuous: false,
            auto_click_continuous_delay: 0,
            suppress_description: false,
            url_regex: UrlRegex::default(),
        }
    }

    /// Copy of this site with its bookmarks replaced.
    pub fn with_bookmarks(&self, bookmarks: Vec<Arc<Bookmark>>) -> Self {
        Self {
            bookmarks,
            ..self.clone()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Name shown to the user, falling back to the domain.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.domain
        } else {
            &self.name
        }
    }

    /// Whether this site applies to `url`. Substring and exact comparisons
    /// ignore case; a regex must match at the start of the URL.
    pub fn matches_url(&self, url: &str) -> bool {
        let domain = self.domain.trim();
        match self.url_match {
            UrlMatch::Ignore => true,
            UrlMatch::Empty => url.trim().is_empty(),
            UrlMatch::Exact => url.to_lowercase() == domain.to_lowercase(),
            UrlMatch::Substring => url.to_lowercase().contains(&domain.to_lowercase()),
            UrlMatch::Domain => get_domain(url).is_some_and(|d| d.eq_ignore_ascii_case(domain)),
            UrlMatch::Subdomain => get_domain(url).is_some_and(|d| {
                let d = d.to_lowercase();
                let domain = domain.to_lowercase();
                d == domain || d.ends_with(&format!(".{}", domain))
            }),
            UrlMatch::Regex => self.url_regex().is_some_and(|re| re.is_match(url)),
        }
    }

    fn url_regex(&self) -> Option<Cow<'_, Regex>> {
        let domain = self.domain.trim();
        let (source, compiled) = self
            .url_regex
            .0
            .get_or_init(|| (domain.to_string(), compile_url_regex(self.display_name(), domain)));
        if source == domain {
            compiled.as_ref().map(Cow::Borrowed)
        } else {
            // domain was edited after the first match
            compile_url_regex(self.display_name(), domain).map(Cow::Owned)
        }
    }
}

/// Host part of a URL: scheme, credentials, port and path are stripped.
pub fn get_domain(url: &str) -> Option<&str> {
    static DOMAIN: OnceLock<Option<Regex>> = OnceLock::new();
    let re = DOMAIN
        .get_or_init(|| Regex::new(r#"^(\w+://)?([\w.,:"-]+@)?(?P<domain>[\w.-]+)(:\d+)?"#).ok())
        .as_ref()?;
    re.captures(url.trim())
        .and_then(|c| c.name("domain"))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_domain() {
        assert_eq!(get_domain("https://www.example.com/a/b"), Some("www.example.com"));
        assert_eq!(get_domain("http://user:pw@host.org:8080/x"), Some("host.org"));
        assert_eq!(get_domain("example.com"), Some("example.com"));
        assert_eq!(get_domain(""), None);
    }

    #[test]
    fn test_url_matching() {
        let url = "https://mail.google.com/inbox";
        assert!(Site::new("", UrlMatch::Ignore).matches_url(url));
        assert!(Site::new("mail.google.com", UrlMatch::Domain).matches_url(url));
        assert!(!Site::new("google.com", UrlMatch::Domain).matches_url(url));
        assert!(Site::new("google.com", UrlMatch::Subdomain).matches_url(url));
        assert!(!Site::new("gle.com", UrlMatch::Subdomain).matches_url(url));
        assert!(Site::new("/inbox", UrlMatch::Substring).matches_url(url));
        assert!(Site::new(url, UrlMatch::Exact).matches_url(url));
        assert!(Site::new(r"https://mail\.google\.com/in", UrlMatch::Regex).matches_url(url));
        assert!(!Site::new("(", UrlMatch::Regex).matches_url(url));
        assert!(Site::new("", UrlMatch::Empty).matches_url(""));
        assert!(!Site::new("", UrlMatch::Empty).matches_url(url));
    }

    #[test]
    fn test_url_matching_case_and_anchoring() {
        let url = "https://example.com/news/1";
        assert!(Site::new("Example.COM/news", UrlMatch::Substring).matches_url(url));
        assert!(Site::new("HTTPS://EXAMPLE.com/news/1", UrlMatch::Exact).matches_url(url));
        assert!(!Site::new("news", UrlMatch::Regex).matches_url(url));
        assert!(Site::new(r"https?://example\.com/news", UrlMatch::Regex).matches_url(url));
        assert!(!Site::new(r"https://example\.com/sport|news", UrlMatch::Regex).matches_url(url));
    }

    #[test]
    fn test_url_regex_follows_domain_edits() {
        let mut site = Site::new("https://a\\.com", UrlMatch::Regex);
        assert!(site.matches_url("https://a.com/x"));
        site.domain = "https://b\\.com".to_string();
        assert!(!site.matches_url("https://a.com/x"));
        assert!(site.matches_url("https://b.com/x"));
    }

    #[test]
    fn test_with_bookmarks_keeps_original() {
        let site = Site::new("a.com", UrlMatch::Domain).with_name("A");
        let updated = site.with_bookmarks(vec![]);
        assert_eq!(updated.name, "A");
        assert!(site.bookmarks.is_empty());
    }
}
