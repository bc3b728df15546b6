//! Rule configuration, persistence and the active-config holder.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use super::bookmark::{Bookmark, BookmarkCategory};
use super::site::{FocusMode, LiveRegionMode, Site};
use crate::error::Result;

static NEXT_CONFIG_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a loaded configuration, used to key caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConfigId(u64);

impl ConfigId {
    fn fresh() -> Self {
        ConfigId(NEXT_CONFIG_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConfigId {
    fn default() -> Self {
        Self::fresh()
    }
}

/// The full rule set: an ordered list of sites.
///
/// Sites are fixed once built. Edited rules go into a new config, which gets
/// a fresh [`ConfigId`]; a clone shares the id along with identical sites.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    sites: Vec<Site>,
    #[serde(skip)]
    id: ConfigId,
}

impl PartialEq for Config {
    fn eq(&self, other: &Self) -> bool {
        self.sites == other.sites
    }
}

impl Config {
    pub fn new(sites: Vec<Site>) -> Self {
        Self {
            sites,
            id: ConfigId::fresh(),
        }
    }

    pub fn id(&self) -> ConfigId {
        self.id
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    /// Sites applying to `url`, in configuration order.
    pub fn find_sites<'a>(&'a self, url: &'a str) -> impl Iterator<Item = &'a Site> + 'a {
        self.sites.iter().filter(move |site| site.matches_url(url))
    }

    /// Enabled bookmarks of `category` over all sites matching `url`,
    /// including ones that failed to compile.
    pub fn bookmarks_for(&self, url: &str, category: BookmarkCategory) -> Vec<Arc<Bookmark>> {
        self.find_sites(url)
            .flat_map(|site| site.bookmarks.iter())
            .filter(|b| b.enabled && b.category == category)
            .cloned()
            .collect()
    }

    /// Bookmarks of `category` that can take part in matching for `url`.
    pub fn applicable_bookmarks(&self, url: &str, category: BookmarkCategory) -> Vec<Arc<Bookmark>> {
        let mut bookmarks = self.bookmarks_for(url, category);
        bookmarks.retain(|b| b.is_matchable());
        bookmarks
    }

    /// Strictest focus mode over all matching sites.
    pub fn focus_mode(&self, url: &str) -> FocusMode {
        self.find_sites(url)
            .map(|site| site.focus_mode)
            .max()
            .unwrap_or_default()
    }

    /// Whether any matching site mutes live regions.
    pub fn live_regions_muted(&self, url: &str) -> bool {
        self.find_sites(url)
            .any(|site| site.live_region_mode == LiveRegionMode::Mute)
    }

    /// Parse a rules document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize with sorted keys and 4-space indentation.
    pub fn to_json_pretty(&self) -> Result<String> {
        let value = serde_json::to_value(self)?;
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        value.serialize(&mut serializer)?;
        String::from_utf8(out).map_err(|e| crate::error::Error::Other(e.to_string()))
    }

    /// Load the user rules, falling back to the bundled defaults when the
    /// user file does not exist.
    pub fn load(path: impl AsRef<Path>, default_path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = match fs::read_to_string(path) {
            Ok(json) => {
                log::debug!("loading rules from {}", path.display());
                json
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let default_path = default_path.as_ref();
                log::debug!("loading default rules from {}", default_path.display());
                fs::read_to_string(default_path)?
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_json(&json)
    }

    /// Rewrite the whole rules file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }
}

/// Process-wide holder of the active configuration.
///
/// Readers get an `Arc` snapshot; saving swaps in a new value and never
/// touches the old one.
#[derive(Debug, Default)]
pub struct ConfigStore {
    current: RwLock<Arc<Config>>,
}

impl ConfigStore {
    pub fn new(config: Config) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Snapshot of the active configuration.
    pub fn get(&self) -> Arc<Config> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the active configuration, returning the previous one.
    pub fn replace(&self, config: Config) -> Arc<Config> {
        let new = Arc::new(config);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, new)
    }

    /// Persist `config` and make it active.
    pub fn save(&self, config: Config, path: impl AsRef<Path>) -> Result<()> {
        config.save(path)?;
        self.replace(config);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BookmarkData, PatternMatch, UrlMatch};

    fn config() -> Config {
        let jump = BookmarkData::new(BookmarkCategory::QuickJump, "^Section", PatternMatch::Regex).build();
        let broken = BookmarkData::new(BookmarkCategory::QuickJump, "(", PatternMatch::Regex).build();
        let click = BookmarkData::new(BookmarkCategory::QuickClick, "OK", PatternMatch::Exact).build();
        let mut strict = Site::new("example.com", UrlMatch::Domain).with_bookmarks(vec![click]);
        strict.focus_mode = FocusMode::DisableFocus;
        Config::new(vec![
            Site::new("", UrlMatch::Ignore).with_bookmarks(vec![jump, broken]),
            strict,
        ])
    }

    #[test]
    fn test_applicable_bookmarks() {
        let config = config();
        assert_eq!(config.bookmarks_for("", BookmarkCategory::QuickJump).len(), 2);
        assert_eq!(config.applicable_bookmarks("", BookmarkCategory::QuickJump).len(), 1);
        assert!(config.applicable_bookmarks("", BookmarkCategory::QuickClick).is_empty());
        assert_eq!(
            config
                .applicable_bookmarks("https://example.com/", BookmarkCategory::QuickClick)
                .len(),
            1
        );
    }

    #[test]
    fn test_focus_mode_is_max() {
        let config = config();
        assert_eq!(config.focus_mode("https://other.org"), FocusMode::Unchanged);
        assert_eq!(config.focus_mode("https://example.com"), FocusMode::DisableFocus);
    }

    #[test]
    fn test_pretty_json_sorted() {
        let json = config().to_json_pretty().unwrap();
        assert!(json.starts_with("{\n    \"sites\": ["));
        let also = json.find("\"alsoUseDefaultQuickJump\"").unwrap();
        let snippet = json.find("\"snippet\"").unwrap();
        assert!(also < snippet);
    }

    #[test]
    fn test_edited_rules_get_new_id() {
        let config = config();
        assert_eq!(config.clone().id(), config.id());
        let mut sites = config.sites().to_vec();
        sites.pop();
        let edited = Config::new(sites);
        assert_ne!(edited.id(), config.id());
        assert_eq!(edited.sites().len(), 1);
    }

    #[test]
    fn test_store_swaps() {
        let store = ConfigStore::new(config());
        let before = store.get();
        store.replace(Config::default());
        assert_eq!(before.sites.len(), 2);
        assert!(store.get().sites.is_empty());
    }
}
