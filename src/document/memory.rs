//! In-memory document backed by a list of text blocks.
//!
//! Concrete [`DocumentCursor`] implementation used by the CLI and the test
//! suites. Positions are character offsets into the concatenation of all
//! paragraphs, each followed by a single `'\n'`.

use std::any::Any;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use super::{ControlField, DocumentCursor, Endpoint, FormatField, Paragraph, TextField, TextUnit};
use crate::error::Result;

/// Screen pixels per leading space when deriving offsets from plain text.
pub const INDENT_PIXELS: i32 = 8;

/// Left margin of the simulated screen.
pub const LEFT_MARGIN: i32 = 10;

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// One paragraph of an in-memory document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    /// Paragraph text (without the trailing newline)
    pub text: String,

    /// Horizontal screen offset; derived from leading spaces when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,

    /// Enclosing structural elements, outermost first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub controls: Vec<ControlField>,

    /// Formatting of the paragraph
    #[serde(default, skip_serializing_if = "FormatField::is_empty")]
    pub format: FormatField,
}

impl TextBlock {
    /// Create a plain paragraph.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Add an enclosing element.
    pub fn with_control(mut self, control: ControlField) -> Self {
        self.controls.push(control);
        self
    }

    /// Set formatting.
    pub fn with_format(mut self, format: FormatField) -> Self {
        self.format = format;
        self
    }

    /// Set the horizontal offset explicitly.
    pub fn with_x(mut self, x: i32) -> Self {
        self.x = Some(x);
        self
    }

    fn offset(&self) -> i32 {
        self.x.unwrap_or_else(|| {
            let indent = self.text.chars().take_while(|c| *c == ' ').count() as i32;
            LEFT_MARGIN + indent * INDENT_PIXELS
        })
    }

    fn len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DocumentFile {
    Blocks(Vec<TextBlock>),
    Wrapped { paragraphs: Vec<TextBlock> },
}

/// An immutable document with a mutable host caret.
#[derive(Debug)]
pub struct TextDocument {
    id: u64,
    blocks: Vec<TextBlock>,
    starts: Vec<usize>,
    total: usize,
    caret: Mutex<usize>,
    activations: Mutex<Vec<usize>>,
}

impl TextDocument {
    /// Build a document from paragraphs.
    pub fn new(blocks: Vec<TextBlock>) -> Arc<Self> {
        let mut starts = Vec::with_capacity(blocks.len());
        let mut total = 0;
        for block in &blocks {
            starts.push(total);
            total += block.len() + 1;
        }
        Arc::new(Self {
            id: NEXT_DOCUMENT_ID.fetch_add(1, AtomicOrdering::Relaxed),
            blocks,
            starts,
            total,
            caret: Mutex::new(0),
            activations: Mutex::new(Vec::new()),
        })
    }

    /// Build a document from plain text, one paragraph per line.
    ///
    /// Leading spaces become the horizontal offset; lines starting with
    /// `#`-runs followed by a space become headings of that level.
    pub fn from_plain_text(text: &str) -> Arc<Self> {
        let blocks = text
            .lines()
            .map(|line| {
                let mut block = TextBlock::new(line);
                let trimmed = line.trim_start();
                let hashes = trimmed.chars().take_while(|c| *c == '#').count();
                if (1..=6).contains(&hashes) && trimmed[hashes..].starts_with(' ') {
                    block = block.with_control(ControlField::heading(hashes as u8));
                }
                block
            })
            .collect();
        Self::new(blocks)
    }

    /// Parse a JSON document: either a list of blocks or `{"paragraphs": [...]}`.
    pub fn from_json(json: &str) -> Result<Arc<Self>> {
        let blocks = match serde_json::from_str::<DocumentFile>(json)? {
            DocumentFile::Blocks(blocks) => blocks,
            DocumentFile::Wrapped { paragraphs } => paragraphs,
        };
        Ok(Self::new(blocks))
    }

    /// Number of paragraphs.
    pub fn paragraph_count(&self) -> usize {
        self.blocks.len()
    }

    /// Text of the paragraph at `index`.
    pub fn paragraph_text(&self, index: usize) -> Option<&str> {
        self.blocks.get(index).map(|b| b.text.as_str())
    }

    /// A collapsed cursor at the start of paragraph `index` (clamped).
    pub fn cursor_at(self: &Arc<Self>, index: usize) -> TextCursor {
        let pos = match self.starts.get(index) {
            Some(&start) => start,
            None => self.starts.last().copied().unwrap_or(0),
        };
        TextCursor {
            doc: Arc::clone(self),
            start: pos,
            end: pos,
        }
    }

    /// A collapsed cursor at the current caret.
    pub fn caret(self: &Arc<Self>) -> TextCursor {
        let pos = self.caret_offset();
        TextCursor {
            doc: Arc::clone(self),
            start: pos,
            end: pos,
        }
    }

    /// Paragraph index under the caret.
    pub fn caret_paragraph(&self) -> Option<usize> {
        self.containing(self.caret_offset())
            .or_else(|| self.blocks.len().checked_sub(1))
    }

    /// Move the caret to the start of paragraph `index`.
    pub fn set_caret_paragraph(&self, index: usize) {
        if let Some(&start) = self.starts.get(index) {
            if let Ok(mut caret) = self.caret.lock() {
                *caret = start;
            }
        }
    }

    /// Paragraph indices activated so far, in order.
    pub fn activations(&self) -> Vec<usize> {
        self.activations
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    /// Paragraph index of a paragraph produced from this document.
    pub fn paragraph_index(&self, paragraph: &Paragraph) -> Option<usize> {
        let cursor = paragraph.cursor().as_any().downcast_ref::<TextCursor>()?;
        if cursor.doc.id != self.id {
            return None;
        }
        self.containing(cursor.start)
    }

    fn caret_offset(&self) -> usize {
        self.caret.lock().map(|c| *c).unwrap_or(0)
    }

    fn containing(&self, pos: usize) -> Option<usize> {
        if pos >= self.total || self.blocks.is_empty() {
            return None;
        }
        Some(self.starts.partition_point(|&s| s <= pos) - 1)
    }

    fn paragraph_end(&self, index: usize) -> usize {
        self.starts[index] + self.blocks[index].len()
    }
}

/// A range over a [`TextDocument`].
#[derive(Debug, Clone)]
pub struct TextCursor {
    doc: Arc<TextDocument>,
    start: usize,
    end: usize,
}

impl TextCursor {
    /// Character offsets of the range.
    pub fn span(&self) -> (usize, usize) {
        (self.start, self.end)
    }

    /// Paragraph index of the range start, `None` past the end of the document.
    pub fn paragraph_index(&self) -> Option<usize> {
        self.doc.containing(self.start)
    }

    fn covered_blocks(&self) -> Vec<usize> {
        let Some(first) = self.doc.containing(self.start) else {
            return Vec::new();
        };
        let last = if self.end > self.start {
            self.doc
                .containing(self.end - 1)
                .unwrap_or(self.doc.blocks.len() - 1)
        } else {
            first
        };
        (first..=last).collect()
    }

    fn move_paragraph(&mut self, count: i32) -> i32 {
        let doc = &self.doc;
        let n = doc.blocks.len() as i64;
        self.end = self.start;
        if n == 0 || count == 0 {
            return 0;
        }
        let cur = doc.containing(self.start).map(|i| i as i64).unwrap_or(n);
        let at_start = cur < n && doc.starts[cur as usize] == self.start;
        let target = if count > 0 {
            let target = (cur + count as i64).min(n - 1);
            if target <= cur {
                return 0;
            }
            target
        } else {
            let base = if cur < n && !at_start { cur + 1 } else { cur };
            let target = (base + count as i64).max(0);
            if target >= base {
                return 0;
            }
            let moved = target - base;
            self.start = doc.starts[target as usize];
            self.end = self.start;
            return moved as i32;
        };
        self.start = doc.starts[target as usize];
        self.end = self.start;
        (target - cur) as i32
    }
}

impl DocumentCursor for TextCursor {
    fn clone_box(&self) -> Box<dyn DocumentCursor> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn move_by(&mut self, unit: TextUnit, count: i32) -> i32 {
        match unit {
            TextUnit::Character => {
                let target = (self.start as i64 + count as i64).clamp(0, self.doc.total as i64);
                let moved = target - self.start as i64;
                self.start = target as usize;
                self.end = self.start;
                moved as i32
            }
            TextUnit::Paragraph => self.move_paragraph(count),
            TextUnit::Story => {
                let target = if count > 0 { self.doc.total } else { 0 };
                let moved = match (count, target == self.start) {
                    (0, _) | (_, true) => 0,
                    (c, false) => c.signum(),
                };
                self.start = target;
                self.end = target;
                moved
            }
        }
    }

    fn move_end(&mut self, unit: TextUnit, count: i32) -> i32 {
        match unit {
            TextUnit::Character => {
                let target =
                    (self.end as i64 + count as i64).clamp(self.start as i64, self.doc.total as i64);
                let moved = target - self.end as i64;
                self.end = target as usize;
                moved as i32
            }
            TextUnit::Paragraph => {
                let n = self.doc.blocks.len() as i64;
                let Some(cur) = self.doc.containing(self.end) else {
                    return 0;
                };
                let target = (cur as i64 + count as i64).clamp(0, n - 1) as usize;
                self.end = self.doc.paragraph_end(target).max(self.start);
                target as i32 - cur as i32
            }
            TextUnit::Story => {
                let moved = i32::from(self.end != self.doc.total);
                self.end = self.doc.total;
                moved
            }
        }
    }

    fn collapse(&mut self, to_end: bool) {
        if to_end {
            self.start = self.end;
        } else {
            self.end = self.start;
        }
    }

    fn expand(&mut self, unit: TextUnit) {
        match unit {
            TextUnit::Character => {
                self.end = (self.start + 1).min(self.doc.total);
            }
            TextUnit::Paragraph => {
                let index = self
                    .doc
                    .containing(self.start)
                    .or_else(|| self.doc.blocks.len().checked_sub(1));
                if let Some(index) = index {
                    self.start = self.doc.starts[index];
                    self.end = self.doc.paragraph_end(index);
                }
            }
            TextUnit::Story => {
                self.start = 0;
                self.end = self.doc.total;
            }
        }
    }

    fn text(&self) -> String {
        let mut out = String::new();
        for index in self.covered_blocks() {
            let block_start = self.doc.starts[index];
            let block = &self.doc.blocks[index];
            let from = self.start.saturating_sub(block_start);
            let to = (self.end - block_start).min(block.len());
            if from < to {
                out.extend(block.text.chars().skip(from).take(to - from));
            }
            if self.end > block_start + block.len() {
                out.push('\n');
            }
        }
        out
    }

    fn text_with_fields(&self) -> Vec<TextField> {
        let mut fields = Vec::new();
        let text = self.text();
        let mut lines = text.split('\n');
        for index in self.covered_blocks() {
            let block = &self.doc.blocks[index];
            for control in &block.controls {
                fields.push(TextField::ControlStart(control.clone()));
            }
            if !block.format.is_empty() {
                fields.push(TextField::FormatChange(block.format.clone()));
            }
            if let Some(line) = lines.next() {
                if !line.is_empty() {
                    fields.push(TextField::Text(line.to_string()));
                }
            }
            for _ in &block.controls {
                fields.push(TextField::ControlEnd);
            }
        }
        fields
    }

    fn compare_endpoints(&self, other: &dyn DocumentCursor, which: Endpoint) -> Option<Ordering> {
        let other = other.as_any().downcast_ref::<TextCursor>()?;
        if other.doc.id != self.doc.id {
            return None;
        }
        let (a, b) = match which {
            Endpoint::StartToStart => (self.start, other.start),
            Endpoint::StartToEnd => (self.start, other.end),
            Endpoint::EndToStart => (self.end, other.start),
            Endpoint::EndToEnd => (self.end, other.end),
        };
        Some(a.cmp(&b))
    }

    fn update_caret(&self) {
        if let Ok(mut caret) = self.doc.caret.lock() {
            *caret = self.start;
        }
    }

    fn horizontal_offset(&self) -> Option<i32> {
        self.doc
            .containing(self.start)
            .map(|index| self.doc.blocks[index].offset())
    }

    fn activate(&self) -> bool {
        let Some(index) = self.doc.containing(self.start) else {
            return false;
        };
        if let Ok(mut activations) = self.doc.activations.lock() {
            activations.push(index);
        }
        true
    }

    fn document_key(&self) -> u64 {
        self.doc.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    fn sample() -> Arc<TextDocument> {
        TextDocument::from_plain_text("Intro\nSection A\n  item 1\n  item 2\nSection B")
    }

    #[test]
    fn test_paragraph_movement() {
        let doc = sample();
        let mut cursor = doc.cursor_at(0);
        assert_eq!(cursor.move_by(TextUnit::Paragraph, 1), 1);
        assert_eq!(cursor.paragraph_index(), Some(1));
        assert_eq!(cursor.move_by(TextUnit::Paragraph, 10), 3);
        assert_eq!(cursor.paragraph_index(), Some(4));
        assert_eq!(cursor.move_by(TextUnit::Paragraph, 1), 0);
        assert_eq!(cursor.move_by(TextUnit::Paragraph, -2), -2);
        assert_eq!(cursor.paragraph_index(), Some(2));
    }

    #[test]
    fn test_backward_from_story_end() {
        let doc = sample();
        let mut cursor = doc.cursor_at(0);
        cursor.expand(TextUnit::Story);
        cursor.collapse(true);
        assert_eq!(cursor.paragraph_index(), None);
        assert_eq!(cursor.move_by(TextUnit::Paragraph, -1), -1);
        assert_eq!(cursor.paragraph_index(), Some(4));
    }

    #[test]
    fn test_expand_and_text() {
        let doc = sample();
        let mut cursor = doc.cursor_at(2);
        cursor.expand(TextUnit::Paragraph);
        assert_eq!(cursor.text(), "  item 1");
        assert_eq!(cursor.horizontal_offset(), Some(LEFT_MARGIN + 2 * INDENT_PIXELS));
    }

    #[test]
    fn test_text_across_paragraphs() {
        let doc = sample();
        let mut cursor = doc.cursor_at(0);
        cursor.expand(TextUnit::Paragraph);
        cursor.move_end(TextUnit::Paragraph, 1);
        assert_eq!(cursor.text(), "Intro\nSection A");
    }

    #[test]
    fn test_fields_and_headings() {
        let doc = TextDocument::from_plain_text("## Title\nbody");
        let mut cursor = doc.cursor_at(0);
        cursor.expand(TextUnit::Paragraph);
        let fields = cursor.text_with_fields();
        assert_eq!(
            fields[0],
            TextField::ControlStart(ControlField::heading(2))
        );
        assert_eq!(fields[1], TextField::Text("## Title".to_string()));
        assert_eq!(fields[2], TextField::ControlEnd);
        assert_eq!(ControlField::heading(2).role, Role::Heading);
    }

    #[test]
    fn test_caret_and_activation() {
        let doc = sample();
        let cursor = doc.cursor_at(3);
        cursor.update_caret();
        assert_eq!(doc.caret_paragraph(), Some(3));
        assert!(cursor.activate());
        assert_eq!(doc.activations(), vec![3]);
    }

    #[test]
    fn test_compare_endpoints_other_document() {
        let a = sample();
        let b = sample();
        let ca = a.cursor_at(1);
        let cb = b.cursor_at(1);
        assert_eq!(ca.compare_endpoints(&cb, Endpoint::StartToStart), None);
        let ca2 = a.cursor_at(2);
        assert_eq!(
            ca.compare_endpoints(&ca2, Endpoint::StartToStart),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_from_json() {
        let doc = TextDocument::from_json(
            r#"{"paragraphs": [{"text": "Buy", "x": 40, "controls": [{"role": "button"}]}]}"#,
        )
        .unwrap();
        assert_eq!(doc.paragraph_count(), 1);
        assert_eq!(doc.cursor_at(0).horizontal_offset(), Some(40));
    }
}
