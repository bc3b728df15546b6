//! The navigation engine.
//!
//! [`Navigator`] scans paragraphs from the caret, matches them against the
//! bookmarks of the current site and moves the caret, with speech and tone
//! feedback along the way. It also drives structural browsing (siblings,
//! parents, children), hierarchical levels, clutter skipping and scripts.
//!
//! The navigator holds no document; every operation takes the caret
//! paragraph and the active [`Config`], so one navigator serves every page.

mod browse;
pub mod history;
pub mod levels;
pub mod options;
mod resolve;

use std::borrow::Cow;
use std::sync::{Arc, Mutex};

use crate::document::{Direction, ElementKind, Paragraph};
use crate::error::{Error, Result};
use crate::feedback::{AudioFeedback, Silent, Speech, SKIP_CHIME};
use crate::keys::{Action, KeyBlocker};
use crate::matcher::CompositeMatcher;
use crate::model::{Bookmark, BookmarkCategory, BookmarkId, Config};
use crate::script::{ScriptEffect, ScriptError, ScriptTask};

pub use browse::{formatting, tone, Relation, MAX_TONE, MIN_TONE};
pub use history::CaretHistory;
pub use levels::{LevelCache, Levels};
pub use options::{BrowseMode, NavigationOptions};

use browse::{format_signature, Measure};
use resolve::{resolve, Resolution, ResolveContext};

/// Spoken when the current site has no bookmarks of the requested kind.
pub const NO_RULES_MESSAGE: &str = "No rules configured for current website.";

/// Chord and length of the end-of-document cue.
const END_CHORD: &str = "HF";
const END_CHORD_MS: u64 = 100;

/// Length of a sonification tone.
const TONE_MS: u64 = 50;

/// A successful jump.
#[derive(Debug, Clone)]
pub struct Jump {
    pub target: Paragraph,
    pub bookmark: Arc<Bookmark>,
    pub message: Option<String>,
    /// Paragraphs advanced from the caret to the matching paragraph
    pub distance: usize,
    /// Zero-based rank, for hierarchical jumps
    pub level: Option<usize>,
}

/// Result of one navigation command.
#[derive(Debug)]
pub enum JumpOutcome {
    /// The caret moved to a bookmark target
    Matched(Jump),
    /// A QuickSpeak target was read out; the caret stayed put
    Announced(Jump),
    /// Paragraph or structural movement
    Moved { target: Paragraph, distance: usize },
    /// A target was activated in place
    Clicked(Jump),
    /// No script bookmark produced a target
    NoMatch,
    /// The document boundary was reached
    Exhausted,
    /// The site has no bookmarks for the command
    NoRules,
    /// A script failed and the failure was announced
    ScriptFailed(ScriptError),
    /// The caller asked the scan to stop
    Interrupted,
    /// Cached levels disagree with the document; a rescan was started
    Inconsistent,
    /// A bounded hierarchical jump met a shallower paragraph first
    LevelBoundary { level: usize },
    /// A generator script to be driven by the host's scheduler
    Task(ScriptTask),
    /// The structural browse mode changed
    ModeChanged(BrowseMode),
    /// Keys are blocked by a script
    KeysBlocked,
}

impl JumpOutcome {
    /// Target the caret is now on, when the command moved it.
    pub fn target(&self) -> Option<&Paragraph> {
        match self {
            JumpOutcome::Matched(jump) => Some(&jump.target),
            JumpOutcome::Moved { target, .. } => Some(target),
            _ => None,
        }
    }
}

/// Polled between paragraphs; returning `true` abandons the scan.
pub type Interrupt<'a> = &'a dyn Fn() -> bool;

/// Parameters of a QuickJump-style scan.
#[derive(Clone, Copy)]
pub struct JumpRequest<'a> {
    pub url: &'a str,
    pub category: BookmarkCategory,
    pub direction: Direction,
    interrupt: Option<Interrupt<'a>>,
}

impl<'a> JumpRequest<'a> {
    pub fn new(url: &'a str, category: BookmarkCategory, direction: Direction) -> Self {
        Self {
            url,
            category,
            direction,
            interrupt: None,
        }
    }

    pub fn forward(url: &'a str, category: BookmarkCategory) -> Self {
        Self::new(url, category, Direction::Forward)
    }

    pub fn backward(url: &'a str, category: BookmarkCategory) -> Self {
        Self::new(url, category, Direction::Backward)
    }

    /// Stop scanning as soon as `interrupt` returns `true`, e.g. when a newer
    /// keystroke arrives.
    pub fn with_interrupt(mut self, interrupt: Interrupt<'a>) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    fn interrupted(&self) -> bool {
        self.interrupt.is_some_and(|f| f())
    }
}

impl std::fmt::Debug for JumpRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JumpRequest")
            .field("url", &self.url)
            .field("category", &self.category)
            .field("direction", &self.direction)
            .field("interruptible", &self.interrupt.is_some())
            .finish()
    }
}

/// Parameters of a hierarchical jump.
#[derive(Debug, Clone, Copy)]
pub struct HierarchyRequest<'a> {
    pub jump: JumpRequest<'a>,
    /// Zero-based level, or `None` for the nearest hierarchical paragraph
    pub level: Option<usize>,
    /// Keep going past shallower paragraphs
    pub unbounded: bool,
}

impl<'a> HierarchyRequest<'a> {
    pub fn new(url: &'a str, level: Option<usize>, direction: Direction) -> Self {
        Self {
            jump: JumpRequest::new(url, BookmarkCategory::Hierarchical, direction),
            level,
            unbounded: false,
        }
    }

    pub fn unbounded(mut self) -> Self {
        self.unbounded = true;
        self
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt<'a>) -> Self {
        self.jump = self.jump.with_interrupt(interrupt);
        self
    }
}

/// A candidate found by a scan.
struct Found {
    /// Caret the scan started from
    origin: Paragraph,
    target: Paragraph,
    /// Paragraph the bookmark matched; differs from `target` under an offset
    matched: Paragraph,
    bookmark: Arc<Bookmark>,
    message: Option<String>,
    distance: usize,
}

/// What the acceptance check of a scan decided for one candidate.
enum Verdict {
    Accept,
    Skip,
    Stop(JumpOutcome),
}

enum Scan {
    Found(Found),
    Exhausted,
    Interrupted,
    Failed(ScriptError),
    Task(ScriptTask),
    Stopped(JumpOutcome),
}

/// Rule-driven paragraph navigator.
pub struct Navigator {
    options: NavigationOptions,
    matcher: CompositeMatcher,
    audio: Arc<dyn AudioFeedback>,
    speech: Arc<dyn Speech>,
    keys: Arc<KeyBlocker>,
    levels: LevelCache,
    browse_mode: Mutex<BrowseMode>,
    last_tone: Mutex<Option<f64>>,
    history: Mutex<CaretHistory>,
}

impl std::fmt::Debug for Navigator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Navigator")
            .field("options", &self.options)
            .field("browse_mode", &self.browse_mode())
            .field("cached_levels", &self.levels.len())
            .finish()
    }
}

impl Default for Navigator {
    fn default() -> Self {
        Self::silent(NavigationOptions::default())
    }
}

impl Navigator {
    pub fn new(options: NavigationOptions, audio: Arc<dyn AudioFeedback>, speech: Arc<dyn Speech>) -> Self {
        let mode = options.browse_mode;
        Self {
            options,
            matcher: CompositeMatcher::new(),
            audio,
            speech,
            keys: Arc::new(KeyBlocker::new()),
            levels: LevelCache::new(),
            browse_mode: Mutex::new(mode),
            last_tone: Mutex::new(None),
            history: Mutex::new(CaretHistory::new()),
        }
    }

    /// A navigator with no audible or spoken output.
    pub fn silent(options: NavigationOptions) -> Self {
        Self::new(options, Arc::new(Silent), Arc::new(Silent))
    }

    /// Share a key blocker with the host's input layer.
    pub fn with_key_blocker(mut self, keys: Arc<KeyBlocker>) -> Self {
        self.keys = keys;
        self
    }

    pub fn options(&self) -> &NavigationOptions {
        &self.options
    }

    pub fn matcher(&self) -> &CompositeMatcher {
        &self.matcher
    }

    pub fn key_blocker(&self) -> &Arc<KeyBlocker> {
        &self.keys
    }

    pub fn level_cache(&self) -> &LevelCache {
        &self.levels
    }

    pub fn browse_mode(&self) -> BrowseMode {
        self.browse_mode
            .lock()
            .map(|mode| *mode)
            .unwrap_or(self.options.browse_mode)
    }

    /// Run the command bound to a keystroke.
    pub fn perform(&self, config: &Config, url: &str, caret: &Paragraph, action: Action) -> Result<JumpOutcome> {
        if !self.keys.admit(self.audio.as_ref()) {
            return Ok(JumpOutcome::KeysBlocked);
        }
        use Direction::{Backward, Forward};
        match action {
            Action::NextSibling => self.browse(caret, Relation::Sibling, Forward),
            Action::PreviousSibling => self.browse(caret, Relation::Sibling, Backward),
            Action::Parent => self.browse(caret, Relation::Parent, Backward),
            Action::NextParent => self.browse(caret, Relation::Parent, Forward),
            Action::Child => self.browse(caret, Relation::Child, Forward),
            Action::PreviousChild => self.browse(caret, Relation::Child, Backward),
            Action::Rotor => Ok(self.rotate_mode()),
            Action::QuickJump(category, direction) => {
                self.quick_jump(config, caret, &JumpRequest::new(url, category, direction))
            }
            Action::AutoClick(category) => self.auto_click(config, url, caret, category),
            Action::QuickSpeak(category) => self.quick_jump(config, caret, &JumpRequest::forward(url, category)),
            Action::Hierarchical(level, direction) => {
                self.hierarchical_jump(config, caret, &HierarchyRequest::new(url, level, direction))
            }
            Action::Bookmark(id) => self.run_bookmark(config, url, id, caret),
            Action::Element(kind, direction) => self.jump_to_element(caret, kind, direction),
            Action::FormatChange(direction) => self.format_change(caret, direction),
            Action::GoBack => self.go_back(caret),
        }
    }

    /// Jump to the next paragraph matched by a bookmark of the request's
    /// category.
    ///
    /// QuickClick categories also activate the target; QuickSpeak categories
    /// read it without moving the caret. Script categories run at the caret.
    pub fn quick_jump(&self, config: &Config, caret: &Paragraph, request: &JumpRequest) -> Result<JumpOutcome> {
        if request.category == BookmarkCategory::Hierarchical {
            let hierarchy = HierarchyRequest {
                jump: *request,
                level: None,
                unbounded: false,
            };
            return self.hierarchical_jump(config, caret, &hierarchy);
        }
        if request.category.is_script() {
            return self.run_scripts(config, request.url, request.category, caret, None, 0);
        }

        let bookmarks = config.applicable_bookmarks(request.url, request.category);
        if bookmarks.is_empty() {
            self.end_of_document(NO_RULES_MESSAGE);
            return Ok(JumpOutcome::NoRules);
        }
        log::debug!(
            "{} {:?} over {} bookmarks",
            request.category.name(),
            request.direction,
            bookmarks.len()
        );

        let context = self.context(None, 0);
        let scan = self.scan(&bookmarks, caret, request, context, &mut |_| Verdict::Accept)?;
        match scan {
            Scan::Found(found) => Ok(self.accept(found, request.category, None, false)),
            Scan::Exhausted => {
                self.end_of_document(&exhausted_message(request.category, request.direction));
                Ok(JumpOutcome::Exhausted)
            }
            other => self.settle(other),
        }
    }

    /// Jump to the next hierarchical paragraph at `level`, or at any level.
    ///
    /// Levels are the distinct horizontal offsets of all hierarchical
    /// matches, computed once per document and configuration in the
    /// background. A bounded jump stops at the first shallower paragraph.
    pub fn hierarchical_jump(
        &self,
        config: &Config,
        caret: &Paragraph,
        request: &HierarchyRequest,
    ) -> Result<JumpOutcome> {
        let url = request.jump.url;
        let bookmarks = config.applicable_bookmarks(url, BookmarkCategory::Hierarchical);
        if bookmarks.is_empty() {
            self.end_of_document(NO_RULES_MESSAGE);
            return Ok(JumpOutcome::NoRules);
        }
        let levels = self.levels_for(config, caret, &bookmarks)?;

        let mut rank_found = None;
        let context = self.context(request.level.map(|l| l as i64), 0);
        let scan = self.scan(&bookmarks, caret, &request.jump, context, &mut |found| {
            // Levels hold the offsets of matched paragraphs.
            let Some(rank) = found.matched.horizontal_offset().and_then(|x| levels.rank(x)) else {
                return Verdict::Stop(JumpOutcome::Inconsistent);
            };
            match request.level {
                Some(level) if rank == level => {}
                Some(level) if rank < level && !request.unbounded => {
                    return Verdict::Stop(JumpOutcome::LevelBoundary { level });
                }
                Some(_) => return Verdict::Skip,
                None => {}
            }
            rank_found = Some(rank);
            Verdict::Accept
        })?;

        let not_found = || match request.level {
            Some(level) => format!("No next hierarchical bookmark at level {}", level + 1),
            None => exhausted_message(BookmarkCategory::Hierarchical, request.jump.direction),
        };
        match scan {
            Scan::Found(found) => Ok(self.accept(
                found,
                BookmarkCategory::Hierarchical,
                rank_found,
                request.level.is_none(),
            )),
            Scan::Exhausted => {
                self.end_of_document(&not_found());
                Ok(JumpOutcome::Exhausted)
            }
            Scan::Stopped(JumpOutcome::Inconsistent) => {
                log::warn!("hierarchical levels are stale, rescanning");
                self.speech
                    .speak("Document changed since the levels were computed. Please try again.");
                self.levels.invalidate(caret.document_key(), config.id());
                self.start_level_scan(config, caret, bookmarks)?;
                Ok(JumpOutcome::Inconsistent)
            }
            Scan::Stopped(JumpOutcome::LevelBoundary { level }) => {
                self.end_of_document(&not_found());
                Ok(JumpOutcome::LevelBoundary { level })
            }
            other => self.settle(other),
        }
    }

    /// Levels of the caret's document, waiting for the scan if needed.
    pub fn levels_for(&self, config: &Config, caret: &Paragraph, bookmarks: &[Arc<Bookmark>]) -> Result<Arc<Levels>> {
        let future = self.start_level_scan(config, caret, bookmarks.to_vec())?;
        future.get().map_err(|e| {
            log::error!("level scan failed: {}", e);
            self.levels.invalidate(caret.document_key(), config.id());
            e
        })
    }

    fn start_level_scan(
        &self,
        config: &Config,
        caret: &Paragraph,
        bookmarks: Vec<Arc<Bookmark>>,
    ) -> Result<crate::sync::Future<Arc<Levels>>> {
        self.levels.get_or_scan(caret.document_key(), config.id(), || {
            log::debug!("starting level scan");
            levels::scan(
                bookmarks,
                caret.clone(),
                self.matcher.clone(),
                self.options.level_scan_threads,
            )
        })
    }

    /// Move to the nearest paragraph in `relation` to the caret under the
    /// current browse mode.
    pub fn browse(&self, caret: &Paragraph, relation: Relation, direction: Direction) -> Result<JumpOutcome> {
        let mode = self.browse_mode();
        let Some(origin) = Measure::of(caret, mode, &self.options) else {
            self.end_of_document(&format!("Cannot determine {} of current paragraph", mode.name()));
            return Ok(JumpOutcome::Exhausted);
        };
        for (index, paragraph) in caret.walk(direction).enumerate() {
            if paragraph.is_blank() {
                continue;
            }
            let Some(measure) = Measure::of(&paragraph, mode, &self.options) else {
                continue;
            };
            if measure.relates(&origin, relation, mode) {
                let distance = index + 1;
                paragraph.update_caret();
                self.record_move(caret, &paragraph);
                self.crackle(distance);
                self.speech.speak(&paragraph.text());
                self.sonify(&paragraph);
                return Ok(JumpOutcome::Moved {
                    target: paragraph,
                    distance,
                });
            }
        }
        self.end_of_document(&format!(
            "No {} paragraph with {} {} in the document",
            step_word(direction),
            relation.qualifier(mode),
            mode.name()
        ));
        Ok(JumpOutcome::Exhausted)
    }

    /// Cycle the structural browse mode.
    pub fn rotate_mode(&self) -> JumpOutcome {
        let mode = match self.browse_mode.lock() {
            Ok(mut mode) => {
                *mode = mode.next();
                *mode
            }
            Err(_) => self.options.browse_mode,
        };
        self.speech.speak(&format!("Navigating by {}", mode.name()));
        JumpOutcome::ModeChanged(mode)
    }

    /// Move one paragraph, skipping blank paragraphs and clutter.
    pub fn move_paragraph(&self, config: &Config, url: &str, caret: &Paragraph, direction: Direction) -> Result<JumpOutcome> {
        let clutter = config.applicable_bookmarks(url, BookmarkCategory::SkipClutter);
        for (index, paragraph) in caret.walk(direction).enumerate() {
            if self.options.skip_empty_paragraphs && paragraph.is_blank() {
                continue;
            }
            if !clutter.is_empty() && self.is_clutter(&clutter, &paragraph) {
                log::trace!("skipping clutter: {}", paragraph.text());
                if self.options.skip_chime_volume > 0 {
                    self.audio.chime(SKIP_CHIME, self.options.skip_chime_volume);
                }
                continue;
            }
            paragraph.update_caret();
            self.record_move(caret, &paragraph);
            self.speech.speak(&paragraph.text());
            self.sonify(&paragraph);
            return Ok(JumpOutcome::Moved {
                target: paragraph,
                distance: index + 1,
            });
        }
        self.end_of_document(&format!("No {} paragraph", step_word(direction)));
        Ok(JumpOutcome::Exhausted)
    }

    /// Move to the next paragraph containing an element of `kind`.
    pub fn jump_to_element(&self, caret: &Paragraph, kind: ElementKind, direction: Direction) -> Result<JumpOutcome> {
        for (index, paragraph) in caret.walk(direction).enumerate() {
            if kind.matches(&paragraph.fields()) {
                return Ok(self.move_caret(caret, paragraph, index + 1));
            }
        }
        self.end_of_document(&format!("No {} {}", step_word(direction), kind.label()));
        Ok(JumpOutcome::Exhausted)
    }

    /// Move to the next non-blank paragraph formatted differently from the
    /// caret's.
    pub fn format_change(&self, caret: &Paragraph, direction: Direction) -> Result<JumpOutcome> {
        let origin = format_signature(caret);
        for (index, paragraph) in caret.walk(direction).enumerate() {
            if paragraph.is_blank() {
                continue;
            }
            if format_signature(&paragraph) != origin {
                return Ok(self.move_caret(caret, paragraph, index + 1));
            }
        }
        self.end_of_document(&format!("No {} format change", step_word(direction)));
        Ok(JumpOutcome::Exhausted)
    }

    /// Return the caret to where it was before the latest jump.
    pub fn go_back(&self, caret: &Paragraph) -> Result<JumpOutcome> {
        let previous = {
            let mut history = self
                .history
                .lock()
                .map_err(|_| Error::Other("caret history is poisoned".to_string()))?;
            if history.is_empty() {
                self.speech.speak("No cursor history available");
                return Ok(JumpOutcome::Exhausted);
            }
            history.go_back(caret)
        };
        let Some(target) = previous else {
            self.speech.speak("Cannot go back any more");
            return Ok(JumpOutcome::Exhausted);
        };
        let distance = distance_between(caret, &target);
        target.update_caret();
        self.speech.speak(&target.text());
        self.sonify(&target);
        Ok(JumpOutcome::Moved { target, distance })
    }

    /// Positions recorded for [`Navigator::go_back`].
    pub fn history_len(&self) -> usize {
        self.history.lock().map(|h| h.len()).unwrap_or(0)
    }

    fn move_caret(&self, caret: &Paragraph, target: Paragraph, distance: usize) -> JumpOutcome {
        target.update_caret();
        self.record_move(caret, &target);
        self.crackle(distance);
        self.speech.speak(&target.text());
        self.sonify(&target);
        JumpOutcome::Moved { target, distance }
    }

    fn record_move(&self, from: &Paragraph, to: &Paragraph) {
        match self.history.lock() {
            Ok(mut history) => history.record(from, to),
            Err(_) => log::warn!("caret history is poisoned, move not recorded"),
        }
    }

    fn is_clutter(&self, clutter: &[Arc<Bookmark>], paragraph: &Paragraph) -> bool {
        self.matcher
            .find_matches(clutter, &paragraph.text())
            .iter()
            .any(|m| paragraph.matches_filters(&m.bookmark.attributes))
    }

    /// Activate the first paragraph in the document matched by `category`,
    /// leaving the caret where it is.
    pub fn auto_click(
        &self,
        config: &Config,
        url: &str,
        caret: &Paragraph,
        category: BookmarkCategory,
    ) -> Result<JumpOutcome> {
        let bookmarks = config.applicable_bookmarks(url, category);
        if bookmarks.is_empty() {
            self.end_of_document(NO_RULES_MESSAGE);
            return Ok(JumpOutcome::NoRules);
        }
        let context = self.context(None, 0);
        for (index, paragraph) in caret.home().walk(Direction::Forward).enumerate() {
            for m in self.matcher.find_matches(&bookmarks, &paragraph.text()) {
                if !paragraph.matches_filters(&m.bookmark.attributes) {
                    continue;
                }
                let (resolution, effects) = match resolve(&m.bookmark, &paragraph, caret, context) {
                    Ok(resolved) => resolved,
                    Err(e) => return self.script_failed(e),
                };
                self.dispatch_effects(effects);
                if let Resolution::Target { target, message } = resolution {
                    if !target.activate() {
                        log::debug!("nothing to activate at '{}'", target.text());
                    }
                    let text = message.clone().unwrap_or_else(|| target.text());
                    self.speech.speak(&text);
                    return Ok(JumpOutcome::Clicked(Jump {
                        target,
                        bookmark: m.bookmark,
                        message,
                        distance: index + 1,
                        level: None,
                    }));
                }
            }
        }
        self.end_of_document(&format!("No {} result in the document", category.name()));
        Ok(JumpOutcome::Exhausted)
    }

    /// Page-load behaviour: for every matching site with auto-click on
    /// focus, activate each paragraph its auto-click bookmarks match.
    pub fn on_document_focus(&self, config: &Config, url: &str, caret: &Paragraph) -> Vec<Paragraph> {
        let mut activated = Vec::new();
        for site in config.find_sites(url).filter(|s| s.auto_click_on_focus) {
            let bookmarks: Vec<Arc<Bookmark>> = site
                .bookmarks
                .iter()
                .filter(|b| b.enabled && b.category == site.auto_click_category && b.is_matchable())
                .cloned()
                .collect();
            if bookmarks.is_empty() {
                continue;
            }
            for paragraph in caret.home().walk(Direction::Forward) {
                if self.is_clutter(&bookmarks, &paragraph) && paragraph.activate() {
                    activated.push(paragraph);
                }
            }
        }
        log::debug!("auto-clicked {} paragraphs on focus", activated.len());
        activated
    }

    /// Run the bookmark with `id` from the sites matching `url`.
    ///
    /// Script bookmarks run at the caret; other bookmarks jump forward
    /// using that bookmark alone.
    pub fn run_bookmark(&self, config: &Config, url: &str, id: BookmarkId, caret: &Paragraph) -> Result<JumpOutcome> {
        let bookmark = config
            .find_sites(url)
            .flat_map(|site| site.bookmarks.iter())
            .find(|b| b.id() == id)
            .cloned()
            .ok_or(Error::NotFound)?;
        if let Some(e) = bookmark.compile_error() {
            let e = ScriptError::new(format!("bookmark '{}' does not compile: {}", bookmark.display_name(), e));
            return self.script_failed(e);
        }
        if bookmark.category.is_script() {
            return self.run_script(&bookmark, caret, None, 0);
        }
        let request = JumpRequest::forward(url, bookmark.category);
        let context = self.context(None, 0);
        let bookmarks = [bookmark];
        match self.scan(&bookmarks, caret, &request, context, &mut |_| Verdict::Accept)? {
            Scan::Found(found) => Ok(self.accept(found, request.category, None, false)),
            Scan::Exhausted => {
                self.end_of_document(&exhausted_message(request.category, request.direction));
                Ok(JumpOutcome::Exhausted)
            }
            other => self.settle(other),
        }
    }

    /// Run every script bookmark of `category` at the caret until one
    /// produces a target or a task.
    pub fn run_scripts(
        &self,
        config: &Config,
        url: &str,
        category: BookmarkCategory,
        caret: &Paragraph,
        level: Option<i64>,
        modifiers: i64,
    ) -> Result<JumpOutcome> {
        let bookmarks = config.applicable_bookmarks(url, category);
        if bookmarks.is_empty() {
            self.end_of_document(NO_RULES_MESSAGE);
            return Ok(JumpOutcome::NoRules);
        }
        for bookmark in &bookmarks {
            match self.run_script(bookmark, caret, level, modifiers)? {
                JumpOutcome::NoMatch => continue,
                outcome => return Ok(outcome),
            }
        }
        Ok(JumpOutcome::NoMatch)
    }

    /// Run one script bookmark at the caret. Its target is accepted
    /// wherever it lies.
    pub fn run_script(
        &self,
        bookmark: &Arc<Bookmark>,
        caret: &Paragraph,
        level: Option<i64>,
        modifiers: i64,
    ) -> Result<JumpOutcome> {
        let context = self.context(level, modifiers);
        let (resolution, effects) = match resolve(bookmark, caret, caret, context) {
            Ok(resolved) => resolved,
            Err(e) => return self.script_failed(e),
        };
        self.dispatch_effects(effects);
        match resolution {
            Resolution::NoMatch => Ok(JumpOutcome::NoMatch),
            Resolution::Task(task) => Ok(JumpOutcome::Task(task)),
            Resolution::Target { target, message } => {
                let distance = distance_between(caret, &target);
                let found = Found {
                    origin: caret.clone(),
                    target,
                    matched: caret.clone(),
                    bookmark: Arc::clone(bookmark),
                    message,
                    distance,
                };
                Ok(self.accept(found, BookmarkCategory::QuickJump, None, false))
            }
        }
    }

    /// Carry out side effects requested by a script.
    pub fn dispatch_effects(&self, effects: Vec<ScriptEffect>) {
        for effect in effects {
            match effect {
                ScriptEffect::Speak(text) => self.speech.speak(&text),
                ScriptEffect::Click(paragraph) => {
                    if !paragraph.activate() {
                        log::debug!("script click found nothing to activate");
                    }
                }
                ScriptEffect::Beep {
                    frequency,
                    duration_ms,
                    left,
                    right,
                } => self.audio.beep(frequency, duration_ms, left, right),
                ScriptEffect::BlockKeys(duration) => {
                    if let Err(e) = self.keys.block(duration, self.audio.as_ref()) {
                        log::warn!("script could not block keys: {}", e);
                        self.speech.speak(&e.to_string());
                    }
                }
                ScriptEffect::UnblockKeys => self.keys.unblock(self.audio.as_ref()),
            }
        }
    }

    /// Announce a script failure. Contract violations are programming
    /// errors in the rules and are returned to the caller instead.
    fn script_failed(&self, error: ScriptError) -> Result<JumpOutcome> {
        if error.is_contract() {
            return Err(Error::Contract(error));
        }
        log::warn!("script failed: {}", error);
        self.speech.speak(&format!("Script error: {}", error));
        Ok(JumpOutcome::ScriptFailed(error))
    }

    fn settle(&self, scan: Scan) -> Result<JumpOutcome> {
        match scan {
            Scan::Found(found) => Ok(self.accept(found, BookmarkCategory::QuickJump, None, false)),
            Scan::Exhausted => Ok(JumpOutcome::Exhausted),
            Scan::Interrupted => {
                log::debug!("scan interrupted");
                Ok(JumpOutcome::Interrupted)
            }
            Scan::Failed(e) => self.script_failed(e),
            Scan::Task(task) => Ok(JumpOutcome::Task(task)),
            Scan::Stopped(outcome) => Ok(outcome),
        }
    }

    fn context(&self, level: Option<i64>, modifiers: i64) -> ResolveContext {
        ResolveContext {
            level,
            modifiers,
            step_limit: self.options.step_limit,
        }
    }

    /// Walk from `origin` in the request's direction until a bookmark
    /// target beyond the origin passes `verdict`.
    ///
    /// A bookmark whose static offset points back against the scan is
    /// ignored until the scan is further from the origin than that offset,
    /// so it cannot land on or behind the caret.
    fn scan(
        &self,
        bookmarks: &[Arc<Bookmark>],
        origin: &Paragraph,
        request: &JumpRequest,
        context: ResolveContext,
        verdict: &mut dyn FnMut(&Found) -> Verdict,
    ) -> Result<Scan> {
        let direction = request.direction;
        let mut held_back: Vec<(BookmarkId, usize)> = bookmarks
            .iter()
            .filter(|b| !b.has_script() && Direction::of(b.offset) == Some(direction.reversed()))
            .map(|b| (b.id(), b.offset.unsigned_abs() as usize))
            .collect();

        let mut current = origin.clone();
        let mut distance = 0usize;
        loop {
            if request.interrupted() {
                return Ok(Scan::Interrupted);
            }
            current = match current.step(direction) {
                Ok(next) => next,
                Err(e) if e.is_not_found() => return Ok(Scan::Exhausted),
                Err(e) => return Err(e),
            };
            distance += 1;

            held_back.retain(|(_, reach)| distance <= *reach);
            let candidates: Cow<[Arc<Bookmark>]> = if held_back.is_empty() {
                Cow::Borrowed(bookmarks)
            } else {
                Cow::Owned(
                    bookmarks
                        .iter()
                        .filter(|b| !held_back.iter().any(|(id, _)| *id == b.id()))
                        .cloned()
                        .collect(),
                )
            };

            let text = current.text();
            for m in self.matcher.find_matches(&candidates, &text) {
                if !current.matches_filters(&m.bookmark.attributes) {
                    continue;
                }
                let (resolution, effects) = match resolve(&m.bookmark, &current, origin, context) {
                    Ok(resolved) => resolved,
                    Err(e) => return Ok(Scan::Failed(e)),
                };
                self.dispatch_effects(effects);
                let (target, message) = match resolution {
                    Resolution::NoMatch => continue,
                    Resolution::Task(task) => return Ok(Scan::Task(task)),
                    Resolution::Target { target, message } => (target, message),
                };
                if !target.is_beyond(origin, direction) {
                    log::trace!("'{}' resolved behind the caret", m.bookmark.display_name());
                    continue;
                }
                let found = Found {
                    origin: origin.clone(),
                    target,
                    matched: current.clone(),
                    bookmark: m.bookmark,
                    message,
                    distance,
                };
                match verdict(&found) {
                    Verdict::Accept => return Ok(Scan::Found(found)),
                    Verdict::Skip => continue,
                    Verdict::Stop(outcome) => return Ok(Scan::Stopped(outcome)),
                }
            }
        }
    }

    /// Commit a found target: move the caret (unless only speaking), click
    /// for QuickClick categories, then speak and crackle.
    fn accept(&self, found: Found, category: BookmarkCategory, level: Option<usize>, announce_level: bool) -> JumpOutcome {
        let Found {
            origin,
            target,
            bookmark,
            message,
            distance,
            ..
        } = found;
        let jump = Jump {
            target,
            bookmark,
            message,
            distance,
            level,
        };
        log::debug!(
            "'{}' matched {} paragraphs away",
            jump.bookmark.display_name(),
            jump.distance
        );

        if category.is_speak() {
            if let Some(message) = &jump.message {
                self.speech.speak(message);
            }
            self.speech.speak(&jump.target.text());
            return JumpOutcome::Announced(jump);
        }

        jump.target.update_caret();
        self.record_move(&origin, &jump.target);
        if category.is_click() && !jump.target.activate() {
            log::debug!("nothing to activate at '{}'", jump.target.text());
        }
        if let (true, Some(rank)) = (announce_level, level) {
            self.speech.speak(&format!("Level {}", rank + 1));
        }
        if let Some(message) = &jump.message {
            self.speech.speak(message);
        }
        self.speech.speak(&jump.target.text());
        self.crackle(jump.distance);
        JumpOutcome::Matched(jump)
    }

    fn crackle(&self, distance: usize) {
        if self.options.crackle_volume > 0 && distance > 0 {
            self.audio.crackle(distance, self.options.crackle_volume);
        }
    }

    /// Play the paragraph's tone if it differs from the last one.
    fn sonify(&self, paragraph: &Paragraph) {
        let volume = self.options.beep_volume;
        if volume == 0 {
            return;
        }
        let Some(tone) = tone(paragraph, self.browse_mode(), self.options.screen_width) else {
            return;
        };
        let Ok(mut last) = self.last_tone.lock() else {
            return;
        };
        if *last != Some(tone) {
            self.audio.beep(tone, TONE_MS, volume, volume);
        }
        *last = Some(tone);
    }

    fn end_of_document(&self, message: &str) {
        let volume = self.options.no_next_text_chime_volume;
        if volume > 0 {
            self.audio.chord(END_CHORD, END_CHORD_MS, volume, volume);
        }
        if self.options.no_next_text_message {
            self.speech.speak(message);
        }
    }
}

fn step_word(direction: Direction) -> &'static str {
    match direction {
        Direction::Forward => "next",
        Direction::Backward => "previous",
    }
}

fn exhausted_message(category: BookmarkCategory, direction: Direction) -> String {
    format!("No {} {} result", step_word(direction), category.name())
}

/// Paragraphs between two positions of the same document.
fn distance_between(from: &Paragraph, to: &Paragraph) -> usize {
    let Some(direction) = (match to.compare(from) {
        Some(std::cmp::Ordering::Greater) => Some(Direction::Forward),
        Some(std::cmp::Ordering::Less) => Some(Direction::Backward),
        _ => None,
    }) else {
        return 0;
    };
    from.walk(direction)
        .position(|p| p.same_position(to))
        .map_or(0, |index| index + 1)
}
