//! Integration tests for rule files.

use std::fs;
use std::sync::Arc;

use quickjump::model::{
    Attribute, AttributeMatch, AutoSpeakMode, Bookmark, BookmarkCategory, BookmarkData, Config, ConfigStore,
    DebugBeepMode, FocusMode, LiveRegionMode, PatternMatch, Role, Site, UrlMatch,
};
use tempfile::TempDir;

/// A configuration touching every enumerated value at least once.
fn exhaustive() -> Config {
    let bookmarks: Vec<Arc<Bookmark>> = BookmarkCategory::ALL
        .iter()
        .enumerate()
        .map(|(i, &category)| {
            let pattern_match = PatternMatch::ALL[i % PatternMatch::ALL.len()];
            let mut data = BookmarkData::new(category, format!("rule {}", i), pattern_match)
                .with_name(format!("{} rule", category.name()))
                .with_attribute(AttributeMatch::new(Attribute::Role(Role::ALL[i % Role::ALL.len()])))
                .with_attribute(AttributeMatch::not(Attribute::Heading((i % 6) as u8 + 1)));
            data.auto_speak_mode = AutoSpeakMode::ALL[i % AutoSpeakMode::ALL.len()];
            data.enable_auto_speak = i % 2 == 0;
            if category.is_script() {
                data = data.with_snippet("return p.next");
            } else {
                data = data.with_offset(i as i32 - 5).with_message("found");
            }
            if i == 3 {
                data = data.with_keystroke("kb:nvda+shift+3").disabled();
                data.built_in_wav_file = Some("chime.wav".into());
            }
            Arc::new(Bookmark::new(data))
        })
        .collect();

    let sites = UrlMatch::ALL
        .iter()
        .enumerate()
        .map(|(i, &url_match)| {
            let mut site = Site::new(format!("site{}.example", i), url_match)
                .with_name(format!("Site {}", i))
                .with_bookmarks(bookmarks.clone());
            site.focus_mode = FocusMode::ALL[i % FocusMode::ALL.len()];
            site.live_region_mode = LiveRegionMode::ALL[i % LiveRegionMode::ALL.len()];
            site.debug_beep_mode = DebugBeepMode::ALL[i % DebugBeepMode::ALL.len()];
            site.auto_click_on_focus = i % 2 == 1;
            site.auto_click_category = BookmarkCategory::QuickClick2;
            site.auto_click_on_focus_delay = 250;
            site
        })
        .collect();
    Config::new(sites)
}

#[test]
fn test_round_trip_preserves_everything() {
    let config = exhaustive();
    let json = config.to_json_pretty().unwrap();
    let back = Config::from_json(&json).unwrap();
    assert_eq!(back, config);
    // A reload is a new configuration even when its content is equal.
    assert_ne!(back.id(), config.id());
}

#[test]
fn test_enums_persist_as_integers() {
    let value = serde_json::to_value(exhaustive()).unwrap();
    let bookmark = &value["sites"][0]["bookmarks"][4];
    assert_eq!(bookmark["category"], 5);
    assert!(bookmark["patternMatch"].is_u64());
    assert_eq!(value["sites"][0]["urlMatch"], 0);
}

#[test]
fn test_unknown_enum_value_is_rejected() {
    let json = r#"{"sites": [{"urlMatch": 42}]}"#;
    assert!(Config::from_json(json).is_err());
}

#[test]
fn test_minimal_rules_fill_defaults() {
    let json = r#"{"sites": [{"domain": "example.com", "urlMatch": 1,
        "bookmarks": [{"category": 1, "pattern": "^Next", "patternMatch": 3}]}]}"#;
    let config = Config::from_json(json).unwrap();
    let site = &config.sites()[0];
    assert_eq!(site.focus_mode, FocusMode::Unchanged);
    assert_eq!(site.auto_click_category, BookmarkCategory::QuickClick);
    let bookmark = &site.bookmarks[0];
    assert!(bookmark.enabled);
    assert!(bookmark.is_matchable());
    assert_eq!(bookmark.offset, 0);
    assert!(bookmark.keystroke.is_none());
}

#[test]
fn test_broken_rules_still_load() {
    let json = r#"{"sites": [{"urlMatch": 0, "bookmarks": [
        {"category": 1, "name": "bad regex", "pattern": "(", "patternMatch": 3},
        {"category": 11, "name": "bad script", "snippet": "import os", "patternMatch": 3}
    ]}]}"#;
    let config = Config::from_json(json).unwrap();
    let bad_regex = config.bookmarks_for("", BookmarkCategory::QuickJump);
    assert_eq!(bad_regex.len(), 1);
    assert!(bad_regex[0].compile_error().is_some());
    assert!(config.applicable_bookmarks("", BookmarkCategory::QuickJump).is_empty());
    assert!(config.applicable_bookmarks("", BookmarkCategory::Script).is_empty());
}

#[test]
fn test_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("quickJump.json");
    let config = exhaustive();
    config.save(&path).unwrap();

    let written = fs::read_to_string(&path).unwrap();
    assert!(written.starts_with("{\n    \"sites\""));

    let loaded = Config::load(&path, dir.path().join("missing.json")).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_load_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let defaults = dir.path().join("defaults.json");
    Config::new(vec![Site::new("example.com", UrlMatch::Domain)])
        .save(&defaults)
        .unwrap();

    let loaded = Config::load(dir.path().join("user.json"), &defaults).unwrap();
    assert_eq!(loaded.sites().len(), 1);
    assert!(Config::load(dir.path().join("user.json"), dir.path().join("none.json")).is_err());
}

#[test]
fn test_store_save_swaps_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rules.json");
    let store = ConfigStore::new(Config::default());
    let before = store.get();

    store.save(exhaustive(), &path).unwrap();
    assert!(before.sites().is_empty());
    assert_eq!(store.get().sites().len(), UrlMatch::ALL.len());
    assert!(path.exists());
}
