//! Bookmarks: one navigation or action rule each.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};

use super::attribute::AttributeMatch;
use crate::script::{CompileError, Script};

int_enum! {
    /// What a bookmark does when it matches.
    pub enum BookmarkCategory {
        QuickJump = 1,
        QuickJump2 = 2,
        QuickJump3 = 3,
        SkipClutter = 4,
        QuickClick = 5,
        QuickClick2 = 6,
        QuickClick3 = 7,
        Hierarchical = 8,
        QuickSpeak = 9,
        QuickSpeak2 = 10,
        Script = 11,
        NumericScript = 12,
    }
}

impl BookmarkCategory {
    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            BookmarkCategory::QuickJump => "QuickJump",
            BookmarkCategory::QuickJump2 => "QuickJump2",
            BookmarkCategory::QuickJump3 => "QuickJump3",
            BookmarkCategory::SkipClutter => "SkipClutter",
            BookmarkCategory::QuickClick => "QuickClick",
            BookmarkCategory::QuickClick2 => "QuickClick2",
            BookmarkCategory::QuickClick3 => "QuickClick3",
            BookmarkCategory::Hierarchical => "Hierarchical",
            BookmarkCategory::QuickSpeak => "QuickSpeak",
            BookmarkCategory::QuickSpeak2 => "QuickSpeak2",
            BookmarkCategory::Script => "Script",
            BookmarkCategory::NumericScript => "NumericScript",
        }
    }

    /// Categories that run a script per invocation instead of matching text.
    pub fn is_script(self) -> bool {
        matches!(self, BookmarkCategory::Script | BookmarkCategory::NumericScript)
    }

    /// Categories that activate the matched paragraph.
    pub fn is_click(self) -> bool {
        matches!(
            self,
            BookmarkCategory::QuickClick | BookmarkCategory::QuickClick2 | BookmarkCategory::QuickClick3
        )
    }

    /// Categories that speak the match without moving the caret.
    pub fn is_speak(self) -> bool {
        matches!(self, BookmarkCategory::QuickSpeak | BookmarkCategory::QuickSpeak2)
    }
}

impl std::str::FromStr for BookmarkCategory {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        let wanted = s.replace(['-', '_', ' '], "").to_lowercase();
        BookmarkCategory::ALL
            .iter()
            .copied()
            .find(|c| c.name().to_lowercase() == wanted)
            .ok_or_else(|| crate::error::Error::Other(format!("unknown category '{}'", s)))
    }
}

int_enum! {
    /// How `pattern` is compared with paragraph text.
    pub enum PatternMatch {
        Exact = 1,
        Substring = 2,
        Regex = 3,
    }
}

int_enum! {
    /// What to do when an auto-speak bookmark appears on screen.
    #[derive(Default)]
    pub enum AutoSpeakMode {
        #[default]
        Off = 0,
        Speak = 1,
        Chime = 2,
        SpeakAndChime = 3,
    }
}

static NEXT_BOOKMARK_ID: AtomicU64 = AtomicU64::new(1);

/// Explicit identity of a bookmark instance.
///
/// Two bookmarks with identical content still have distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BookmarkId(u64);

impl BookmarkId {
    fn fresh() -> Self {
        BookmarkId(NEXT_BOOKMARK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value.
    pub fn get(self) -> u64 {
        self.0
    }
}

fn default_true() -> bool {
    true
}

/// Persisted fields of a bookmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkData {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub category: BookmarkCategory,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub pattern: String,
    pub pattern_match: PatternMatch,
    /// All filters must match
    #[serde(default)]
    pub attributes: Vec<AttributeMatch>,
    #[serde(default)]
    pub message: String,
    /// Signed paragraph count from the match to the target
    #[serde(default)]
    pub offset: i32,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub also_use_default_quick_jump: bool,
    #[serde(default)]
    pub keystroke: Option<String>,
    #[serde(default)]
    pub enable_auto_speak: bool,
    #[serde(default)]
    pub auto_speak_mode: AutoSpeakMode,
    #[serde(default)]
    pub built_in_wav_file: Option<String>,
}

impl Default for BookmarkData {
    fn default() -> Self {
        Self {
            enabled: true,
            category: BookmarkCategory::QuickJump,
            name: String::new(),
            pattern: String::new(),
            pattern_match: PatternMatch::Regex,
            attributes: Vec::new(),
            message: String::new(),
            offset: 0,
            snippet: String::new(),
            also_use_default_quick_jump: false,
            keystroke: None,
            enable_auto_speak: false,
            auto_speak_mode: AutoSpeakMode::Off,
            built_in_wav_file: None,
        }
    }
}

impl BookmarkData {
    /// Create bookmark data with the given category and pattern.
    pub fn new(category: BookmarkCategory, pattern: impl Into<String>, pattern_match: PatternMatch) -> Self {
        Self {
            category,
            pattern: pattern.into(),
            pattern_match,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_offset(mut self, offset: i32) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn with_attribute(mut self, filter: AttributeMatch) -> Self {
        self.attributes.push(filter);
        self
    }

    pub fn with_keystroke(mut self, keystroke: impl Into<String>) -> Self {
        self.keystroke = Some(keystroke.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Compile into a shared bookmark.
    pub fn build(self) -> Arc<Bookmark> {
        Arc::new(Bookmark::new(self))
    }

    /// Regex source equivalent to `pattern` under `pattern_match`.
    pub fn regex_source(&self) -> String {
        match self.pattern_match {
            PatternMatch::Exact => format!("^{}$", regex::escape(&self.pattern)),
            PatternMatch::Substring => regex::escape(&self.pattern),
            PatternMatch::Regex => self.pattern.clone(),
        }
    }
}

/// A compiled, immutable rule.
///
/// Dereferences to its [`BookmarkData`]. Equality compares content; use
/// [`Bookmark::id`] where instance identity matters.
#[derive(Debug, Deserialize)]
#[serde(from = "BookmarkData")]
pub struct Bookmark {
    data: BookmarkData,
    id: BookmarkId,
    fragment: Result<String, CompileError>,
    script: Option<Result<Script, CompileError>>,
}

impl Bookmark {
    /// Compile bookmark data. Compile failures are captured, not raised.
    pub fn new(data: BookmarkData) -> Self {
        let fragment = compile_fragment(&data);
        let script = if data.snippet.trim().is_empty() {
            None
        } else {
            Some(compile_script(&data))
        };
        if let Err(e) = &fragment {
            log::warn!("bookmark '{}': {}", data.name, e);
        }
        if let Some(Err(e)) = &script {
            log::warn!("bookmark '{}' script: {}", data.name, e);
        }
        Self {
            data,
            id: BookmarkId::fresh(),
            fragment,
            script,
        }
    }

    pub fn id(&self) -> BookmarkId {
        self.id
    }

    pub fn data(&self) -> &BookmarkData {
        &self.data
    }

    /// Regex fragment for the composite matcher, if it compiled.
    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref().ok()
    }

    /// Compiled script, if the bookmark has a snippet that compiled.
    pub fn script(&self) -> Option<&Script> {
        self.script.as_ref().and_then(|s| s.as_ref().ok())
    }

    /// Whether the bookmark carries a script snippet.
    pub fn has_script(&self) -> bool {
        self.script.is_some()
    }

    /// First captured compile failure of the pattern or the script.
    pub fn compile_error(&self) -> Option<&CompileError> {
        self.fragment
            .as_ref()
            .err()
            .or_else(|| self.script.as_ref().and_then(|s| s.as_ref().err()))
    }

    /// Enabled and free of compile errors. Broken bookmarks take no part in
    /// matching but stay listed.
    pub fn is_matchable(&self) -> bool {
        self.data.enabled && self.compile_error().is_none()
    }

    /// Name shown to the user, falling back to the pattern.
    pub fn display_name(&self) -> &str {
        if self.data.name.is_empty() {
            &self.data.pattern
        } else {
            &self.data.name
        }
    }
}

impl Deref for Bookmark {
    type Target = BookmarkData;

    fn deref(&self) -> &BookmarkData {
        &self.data
    }
}

impl From<BookmarkData> for Bookmark {
    fn from(data: BookmarkData) -> Self {
        Bookmark::new(data)
    }
}

impl Serialize for Bookmark {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.data.serialize(serializer)
    }
}

impl PartialEq for Bookmark {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

fn compile_fragment(data: &BookmarkData) -> Result<String, CompileError> {
    if data.pattern.is_empty() {
        if data.category.is_script() {
            return Ok(String::new());
        }
        return Err(CompileError::new("empty pattern"));
    }
    let source = data.regex_source();
    Regex::new(&source).map_err(|e| CompileError::new(format!("invalid pattern: {}", e)))?;
    Ok(source)
}

fn compile_script(data: &BookmarkData) -> Result<Script, CompileError> {
    let script = Script::compile(&data.snippet)?;
    if script.is_generator() && !data.category.is_script() {
        return Err(CompileError::new(format!(
            "yield is only allowed in Script and NumericScript bookmarks, not {}",
            data.category.name()
        )));
    }
    Ok(script)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regex_source() {
        let exact = BookmarkData::new(BookmarkCategory::QuickJump, "a.b", PatternMatch::Exact);
        assert_eq!(exact.regex_source(), r"^a\.b$");
        let sub = BookmarkData::new(BookmarkCategory::QuickJump, "a.b", PatternMatch::Substring);
        assert_eq!(sub.regex_source(), r"a\.b");
        let re = BookmarkData::new(BookmarkCategory::QuickJump, "a.b", PatternMatch::Regex);
        assert_eq!(re.regex_source(), "a.b");
    }

    #[test]
    fn test_identity_vs_equality() {
        let data = BookmarkData::new(BookmarkCategory::QuickJump, "x", PatternMatch::Substring);
        let a = data.clone().build();
        let b = data.build();
        assert_eq!(*a, *b);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_bad_regex_is_captured() {
        let b = BookmarkData::new(BookmarkCategory::QuickJump, "(", PatternMatch::Regex).build();
        assert!(b.fragment().is_none());
        assert!(b.compile_error().is_some());
        assert!(!b.is_matchable());
    }

    #[test]
    fn test_empty_pattern() {
        let b = BookmarkData::new(BookmarkCategory::QuickJump, "", PatternMatch::Regex).build();
        assert!(!b.is_matchable());
        let s = BookmarkData::new(BookmarkCategory::Script, "", PatternMatch::Regex)
            .with_snippet("return None")
            .build();
        assert!(s.is_matchable());
        assert!(s.script().is_some());
    }

    #[test]
    fn test_generator_outside_script_category() {
        let b = BookmarkData::new(BookmarkCategory::QuickJump, "x", PatternMatch::Substring)
            .with_snippet("yield 10")
            .build();
        assert!(b.compile_error().is_some());
        let s = BookmarkData::new(BookmarkCategory::Script, "", PatternMatch::Regex)
            .with_snippet("yield 10")
            .build();
        assert!(s.compile_error().is_none());
    }

    #[test]
    fn test_category_serializes_as_integer() {
        let data = BookmarkData::new(BookmarkCategory::QuickClick2, "x", PatternMatch::Exact);
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["category"], 6);
        assert_eq!(json["patternMatch"], 1);
        assert!(serde_json::from_value::<BookmarkCategory>(serde_json::json!(42)).is_err());
    }
}
