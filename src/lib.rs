//! # quickjump
//!
//! Rule-driven paragraph navigation for screen-reader document browsing.
//!
//! Users describe interesting paragraphs of a website as *bookmarks*: a text
//! pattern, optional attribute filters, an offset or a small sandboxed
//! script. The [`Navigator`] scans from the caret, matches paragraphs against
//! the bookmarks of the sites applying to the current URL and moves the
//! caret to the target, with speech and tone feedback.
//!
//! ## Quick Start
//!
//! ```no_run
//! use quickjump::{open_document, load_rules, JumpRequest, Navigator, Paragraph};
//! use quickjump::model::BookmarkCategory;
//!
//! fn main() -> quickjump::Result<()> {
//!     let doc = open_document("page.txt")?;
//!     let rules = load_rules("rules.json")?;
//!
//!     let navigator = Navigator::default();
//!     let caret = Paragraph::new(doc.caret());
//!     let request = JumpRequest::forward("https://example.com/", BookmarkCategory::QuickJump);
//!     let outcome = navigator.quick_jump(&rules, &caret, &request)?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Composite matching**: all bookmarks of a site in one regex pass
//! - **Sandboxed scripts**: a small Python-like language with a step budget
//! - **Structural browsing**: siblings, parents and children by indentation or font
//! - **Hierarchical levels**: background level scans cached per document
//! - **Audio cues**: distance crackles, chords and sonification tones

pub mod document;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod keys;
pub mod matcher;
pub mod model;
pub mod script;
pub mod sync;

// Re-export commonly used types
pub use document::{Direction, DocumentCursor, ElementKind, Paragraph, TextBlock, TextDocument};
pub use engine::{
    BrowseMode, HierarchyRequest, Jump, JumpOutcome, JumpRequest, NavigationOptions, Navigator, Relation,
};
pub use error::{Error, Result};
pub use feedback::{AudioFeedback, Beeper, Silent, Speech};
pub use keys::{Action, KeyBlocker, Keymap, Keystroke};
pub use matcher::{BookmarkMatch, CompositeMatcher};
pub use model::{Bookmark, BookmarkCategory, BookmarkData, Config, ConfigStore, PatternMatch, Site, UrlMatch};
pub use script::{Script, ScriptCall, ScriptError};

use std::path::Path;
use std::sync::Arc;

/// Open a document for navigation.
///
/// `.json` files hold serialized [`TextBlock`]s; anything else is read as
/// plain text, one paragraph per line.
///
/// # Example
///
/// ```no_run
/// use quickjump::open_document;
///
/// let doc = open_document("article.txt").unwrap();
/// println!("Paragraphs: {}", doc.paragraph_count());
/// ```
pub fn open_document<P: AsRef<Path>>(path: P) -> Result<Arc<TextDocument>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        TextDocument::from_json(&content)
    } else {
        Ok(TextDocument::from_plain_text(&content))
    }
}

/// Read a rules file.
///
/// # Example
///
/// ```no_run
/// use quickjump::load_rules;
///
/// let rules = load_rules("quickJump.json").unwrap();
/// for site in rules.find_sites("https://example.com/") {
///     println!("{}", site.display_name());
/// }
/// ```
pub fn load_rules<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;
    Config::from_json(&content)
}

/// Compile a script without running it.
///
/// # Example
///
/// ```
/// use quickjump::check_script;
///
/// assert!(check_script("return p.next").is_ok());
/// assert!(check_script("import os").is_err());
/// ```
pub fn check_script(source: &str) -> Result<()> {
    Script::compile(source)?;
    Ok(())
}
