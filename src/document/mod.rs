//! Document cursor abstraction.
//!
//! Provides a trait-based interface over the host's text-range cursor,
//! isolating the navigation engine from any concrete accessibility API.
//! The engine only ever talks to [`DocumentCursor`]; [`memory::TextDocument`]
//! is an in-process implementation used by the CLI and the tests.

pub mod memory;
mod paragraph;

pub use memory::{TextBlock, TextCursor, TextDocument};
pub use paragraph::{Boundary, Direction, ElementKind, Paragraph};

use std::any::Any;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::Role;

/// Granularity of cursor movement and expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextUnit {
    /// A single character
    Character,
    /// One paragraph, boundary to boundary
    Paragraph,
    /// The whole document
    Story,
}

/// Which endpoints to compare in [`DocumentCursor::compare_endpoints`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    StartToStart,
    StartToEnd,
    EndToStart,
    EndToEnd,
}

/// State flags a host reports on an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementState {
    /// A link the user has followed
    Visited,
    /// A field whose value failed validation
    Invalid,
}

/// Structural element opened by a `ControlStart` field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlField {
    /// Element role
    pub role: Role,

    /// Heading level, when the element is a heading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<ElementState>,
}

impl ControlField {
    /// Create a control field for the given role.
    pub fn new(role: Role) -> Self {
        Self {
            role,
            ..Self::default()
        }
    }

    /// Create a heading control field.
    pub fn heading(level: u8) -> Self {
        Self {
            role: Role::Heading,
            level: Some(level),
            ..Self::default()
        }
    }

    /// Builder-style state flag.
    pub fn with_state(mut self, state: ElementState) -> Self {
        if !self.states.contains(&state) {
            self.states.push(state);
        }
        self
    }

    pub fn has_state(&self, state: ElementState) -> bool {
        self.states.contains(&state)
    }
}

/// Formatting state carried by a `FormatChange` field, keyed by host format names
/// (`font-family`, `font-size`, `color`, `background-color`, `bold`, `italic`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormatField(pub BTreeMap<String, String>);

impl FormatField {
    /// Create an empty format field.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Look up a formatting key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Merge another format change on top of this one.
    pub fn update(&mut self, other: &FormatField) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Font size in points, if present and parseable (`"12pt"`, `"12"`).
    pub fn font_size(&self) -> Option<f64> {
        self.get("font-size")
            .and_then(|s| s.trim().trim_end_matches("pt").trim().parse::<f64>().ok())
    }

    /// Check whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One item of the structured text stream returned by
/// [`DocumentCursor::text_with_fields`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextField {
    /// Plain text content
    Text(String),
    /// An enclosing element starts
    ControlStart(ControlField),
    /// The most recent element ends
    ControlEnd,
    /// Formatting changes from this point on
    FormatChange(FormatField),
}

/// Capability set the engine needs from a host text range.
///
/// A cursor is a range `[start, end)` in document order. Implementations must
/// be cheap to clone: the engine clones cursors freely and never expects
/// movement on one clone to affect another.
pub trait DocumentCursor: Send + Sync + fmt::Debug {
    /// Clone into a new boxed cursor.
    fn clone_box(&self) -> Box<dyn DocumentCursor>;

    /// Downcasting hook for implementations comparing against their own type.
    fn as_any(&self) -> &dyn Any;

    /// Collapse to the start and move by `count` units.
    /// Returns the distance actually moved (0 at a boundary).
    fn move_by(&mut self, unit: TextUnit, count: i32) -> i32;

    /// Move only the end point by `count` units. Returns the distance moved.
    fn move_end(&mut self, unit: TextUnit, count: i32) -> i32;

    /// Collapse the range to its start (or end).
    fn collapse(&mut self, to_end: bool);

    /// Expand the range to the enclosing unit.
    fn expand(&mut self, unit: TextUnit);

    /// Text covered by the range.
    fn text(&self) -> String;

    /// Structured text with control and format fields.
    fn text_with_fields(&self) -> Vec<TextField>;

    /// Compare one endpoint of this range with one endpoint of `other`.
    /// Returns `None` when the cursors belong to different documents.
    fn compare_endpoints(&self, other: &dyn DocumentCursor, which: Endpoint) -> Option<Ordering>;

    /// Place the host caret at this range.
    fn update_caret(&self);

    /// Horizontal screen offset of the range start, if the host can tell.
    fn horizontal_offset(&self) -> Option<i32>;

    /// Activate (click) the element at the range start. Returns false if nothing
    /// activatable is there.
    fn activate(&self) -> bool;

    /// Stable identity of the underlying document.
    fn document_key(&self) -> u64;
}

impl Clone for Box<dyn DocumentCursor> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_field_font_size() {
        let format = FormatField::new().with("font-size", "12pt");
        assert_eq!(format.font_size(), Some(12.0));

        let format = FormatField::new().with("font-size", "large");
        assert_eq!(format.font_size(), None);
    }

    #[test]
    fn test_format_field_update() {
        let mut base = FormatField::new().with("color", "red").with("bold", "true");
        base.update(&FormatField::new().with("color", "blue"));
        assert_eq!(base.get("color"), Some("blue"));
        assert_eq!(base.get("bold"), Some("true"));
    }
}
