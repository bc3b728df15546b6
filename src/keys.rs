//! Keystroke surface: default bindings, custom bookmark keys, key blocking.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::document::{Direction, ElementKind};
use crate::error::{Error, Result};
use crate::feedback::AudioFeedback;
use crate::model::{BookmarkCategory, BookmarkId, Config};

/// Chord played while keys are blocked.
pub const BLOCK_CHORD: &str = "CDGA";

/// Chord played when a keystroke is swallowed.
pub const REJECT_CHORD: &str = "DG#";

const MODIFIERS: [&str; 4] = ["nvda", "control", "alt", "shift"];

/// A normalized host keystroke such as `kb:NVDA+Alt+DownArrow`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Keystroke {
    /// Bit per entry of the modifier list, in canonical order
    modifiers: u8,
    key: String,
}

impl Keystroke {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn has_modifier(&self, name: &str) -> bool {
        MODIFIERS
            .iter()
            .position(|m| m.eq_ignore_ascii_case(name))
            .map_or(false, |i| self.modifiers & (1 << i) != 0)
    }

    /// Whether this keystroke is reserved for essential host navigation.
    pub fn is_reserved(&self) -> bool {
        DENY_LIST.iter().any(|k| k.parse::<Keystroke>().ok().as_ref() == Some(self))
    }
}

impl FromStr for Keystroke {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let body = s.trim();
        let body = body.strip_prefix("kb:").unwrap_or(body);
        let parts: Vec<&str> = body.split('+').map(str::trim).collect();
        let Some((key, modifiers)) = parts.split_last() else {
            return Err(Error::InvalidKeystroke(s.to_string()));
        };
        if key.is_empty() {
            return Err(Error::InvalidKeystroke(s.to_string()));
        }
        let mut bits = 0u8;
        for modifier in modifiers {
            let name = match modifier.to_lowercase().as_str() {
                "ctrl" => "control".to_string(),
                "insert" => "nvda".to_string(),
                other => other.to_string(),
            };
            let index = MODIFIERS
                .iter()
                .position(|m| *m == name)
                .ok_or_else(|| Error::InvalidKeystroke(s.to_string()))?;
            bits |= 1 << index;
        }
        Ok(Keystroke {
            modifiers: bits,
            key: key.to_lowercase(),
        })
    }
}

impl fmt::Display for Keystroke {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kb:")?;
        for (i, name) in MODIFIERS.iter().enumerate() {
            if self.modifiers & (1 << i) != 0 {
                write!(f, "{}+", name)?;
            }
        }
        write!(f, "{}", self.key)
    }
}

/// Keys a bookmark may not take over.
pub const DENY_LIST: &[&str] = &[
    "upArrow",
    "downArrow",
    "leftArrow",
    "rightArrow",
    "control+upArrow",
    "control+downArrow",
    "control+leftArrow",
    "control+rightArrow",
    "home",
    "end",
    "control+home",
    "control+end",
    "pageUp",
    "pageDown",
    "tab",
    "shift+tab",
    "escape",
    "enter",
    "space",
    "backspace",
    "delete",
    "nvda+space",
];

/// What a keystroke does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    NextSibling,
    PreviousSibling,
    Parent,
    NextParent,
    Child,
    PreviousChild,
    Rotor,
    QuickJump(BookmarkCategory, Direction),
    AutoClick(BookmarkCategory),
    QuickSpeak(BookmarkCategory),
    /// Hierarchical jump; `None` means any level
    Hierarchical(Option<usize>, Direction),
    /// A bookmark bound to its own keystroke
    Bookmark(BookmarkId),
    /// Quick navigation to an element kind
    Element(ElementKind, Direction),
    FormatChange(Direction),
    /// Back to the caret position before the latest jump
    GoBack,
}

/// Built-in bindings of the browse-mode surface.
pub fn default_bindings() -> Vec<(&'static str, Action)> {
    use Action::*;
    use BookmarkCategory as C;
    use Direction::{Backward, Forward};

    let mut bindings = vec![
        ("kb:NVDA+Alt+DownArrow", NextSibling),
        ("kb:NVDA+Alt+UpArrow", PreviousSibling),
        ("kb:NVDA+Alt+LeftArrow", Parent),
        ("kb:NVDA+Alt+Home", Parent),
        ("kb:NVDA+Control+Alt+LeftArrow", NextParent),
        ("kb:NVDA+Alt+End", NextParent),
        ("kb:NVDA+Alt+RightArrow", Child),
        ("kb:NVDA+Alt+PageDown", Child),
        ("kb:NVDA+Control+Alt+RightArrow", PreviousChild),
        ("kb:NVDA+Alt+PageUp", PreviousChild),
        ("kb:NVDA+O", Rotor),
        ("kb:J", QuickJump(C::QuickJump, Forward)),
        ("kb:Shift+J", QuickJump(C::QuickJump, Backward)),
        ("kb:Alt+J", AutoClick(C::QuickClick)),
        ("kb:Alt+`", Hierarchical(None, Forward)),
        ("kb:Alt+Shift+`", Hierarchical(None, Backward)),
        ("kb:Y", Element(ElementKind::Tab, Forward)),
        ("kb:Shift+Y", Element(ElementKind::Tab, Backward)),
        ("kb:P", Element(ElementKind::Dialog, Forward)),
        ("kb:Shift+P", Element(ElementKind::Dialog, Backward)),
        ("kb:Z", Element(ElementKind::Menu, Forward)),
        ("kb:Shift+Z", Element(ElementKind::Menu, Backward)),
        ("kb:0", Element(ElementKind::TreeView, Forward)),
        ("kb:Shift+0", Element(ElementKind::TreeView, Backward)),
        ("kb:9", Element(ElementKind::ToolBar, Forward)),
        ("kb:Shift+9", Element(ElementKind::ToolBar, Backward)),
        ("kb:`", FormatChange(Forward)),
        ("kb:Shift+`", FormatChange(Backward)),
        ("kb:NVDA+Shift+LeftArrow", GoBack),
    ];
    // Alt+1 is the outermost level, Alt+0 the tenth
    for (level, (forward, backward)) in FORWARD_LEVEL_KEYS.iter().zip(BACKWARD_LEVEL_KEYS).enumerate() {
        bindings.push((*forward, Hierarchical(Some(level), Forward)));
        bindings.push((backward, Hierarchical(Some(level), Backward)));
    }
    bindings
}

const FORWARD_LEVEL_KEYS: [&str; 10] = [
    "kb:Alt+1", "kb:Alt+2", "kb:Alt+3", "kb:Alt+4", "kb:Alt+5", "kb:Alt+6", "kb:Alt+7", "kb:Alt+8",
    "kb:Alt+9", "kb:Alt+0",
];

const BACKWARD_LEVEL_KEYS: [&str; 10] = [
    "kb:Alt+Shift+1",
    "kb:Alt+Shift+2",
    "kb:Alt+Shift+3",
    "kb:Alt+Shift+4",
    "kb:Alt+Shift+5",
    "kb:Alt+Shift+6",
    "kb:Alt+Shift+7",
    "kb:Alt+Shift+8",
    "kb:Alt+Shift+9",
    "kb:Alt+Shift+0",
];

/// Keystroke to action lookup table.
#[derive(Debug, Clone, Default)]
pub struct Keymap {
    bindings: BTreeMap<Keystroke, Action>,
}

impl Keymap {
    /// Empty keymap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keymap holding [`default_bindings`].
    pub fn with_defaults() -> Result<Self> {
        let mut keymap = Self::new();
        for (key, action) in default_bindings() {
            keymap.bindings.insert(key.parse()?, action);
        }
        Ok(keymap)
    }

    /// Bind a keystroke, replacing any previous binding. Reserved keys are
    /// rejected.
    pub fn bind(&mut self, keystroke: &str, action: Action) -> Result<()> {
        let key: Keystroke = keystroke.parse()?;
        if key.is_reserved() {
            return Err(Error::InvalidKeystroke(format!(
                "{} is reserved for navigation",
                key
            )));
        }
        self.bindings.insert(key, action);
        Ok(())
    }

    /// Add custom keystrokes of the bookmarks that apply to `url`.
    ///
    /// Invalid or reserved keystrokes are skipped with a warning and
    /// returned.
    pub fn bind_bookmarks(&mut self, config: &Config, url: &str) -> Vec<Error> {
        let mut rejected = Vec::new();
        for site in config.find_sites(url) {
            for bookmark in &site.bookmarks {
                let Some(keystroke) = bookmark.keystroke.as_deref() else {
                    continue;
                };
                if !bookmark.enabled || keystroke.trim().is_empty() {
                    continue;
                }
                if let Err(e) = self.bind(keystroke, Action::Bookmark(bookmark.id())) {
                    log::warn!("bookmark '{}': {}", bookmark.display_name(), e);
                    rejected.push(e);
                }
            }
        }
        rejected
    }

    pub fn lookup(&self, keystroke: &Keystroke) -> Option<Action> {
        self.bindings.get(keystroke).copied()
    }

    /// Parse and look up in one step.
    pub fn lookup_str(&self, keystroke: &str) -> Option<Action> {
        keystroke.parse().ok().and_then(|k| self.lookup(&k))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Keystroke, &Action)> {
        self.bindings.iter()
    }
}

/// Deadline during which keystrokes are swallowed so an automation can inject
/// keys undisturbed.
#[derive(Debug, Default)]
pub struct KeyBlocker {
    until: Mutex<Option<Instant>>,
}

impl KeyBlocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block keys for `duration`. Fails if a block is already active.
    pub fn block(&self, duration: Duration, audio: &dyn AudioFeedback) -> Result<()> {
        self.block_at(Instant::now(), duration, audio)
    }

    pub fn block_at(&self, now: Instant, duration: Duration, audio: &dyn AudioFeedback) -> Result<()> {
        let mut until = self
            .until
            .lock()
            .map_err(|_| Error::Other("key blocker lock poisoned".to_string()))?;
        if until.map_or(false, |deadline| deadline > now) {
            return Err(Error::KeysBlocked);
        }
        *until = Some(now + duration);
        audio.chord(BLOCK_CHORD, duration.as_millis() as u64, 5, 5);
        Ok(())
    }

    /// Lift the block and silence the block chord.
    pub fn unblock(&self, audio: &dyn AudioFeedback) {
        if let Ok(mut until) = self.until.lock() {
            *until = None;
        }
        audio.stop();
    }

    pub fn is_blocked_at(&self, now: Instant) -> bool {
        self.until
            .lock()
            .map(|u| u.map_or(false, |deadline| deadline > now))
            .unwrap_or(false)
    }

    /// Whether a keystroke may run now. A rejected keystroke plays the
    /// rejection chord.
    pub fn admit(&self, audio: &dyn AudioFeedback) -> bool {
        self.admit_at(Instant::now(), audio)
    }

    pub fn admit_at(&self, now: Instant, audio: &dyn AudioFeedback) -> bool {
        if self.is_blocked_at(now) {
            audio.chord(REJECT_CHORD, 100, 50, 50);
            return false;
        }
        true
    }
}
