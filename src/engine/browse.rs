//! Structural measures for sibling / parent / child navigation and
//! sonification.

use std::cmp::Ordering;

use super::options::{BrowseMode, NavigationOptions};
use crate::document::{FormatField, Paragraph, TextField};
use crate::feedback::BASE_FREQUENCY;

/// Lowest and highest tone emitted for a paragraph.
pub const MIN_TONE: f64 = 10.0;
pub const MAX_TONE: f64 = 20_000.0;

/// Octaves spanned by the full screen width.
const SCREEN_OCTAVES: f64 = 3.0;

/// Relation of a target paragraph to the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// Same measure
    Sibling,
    /// Outer element: smaller offset, or larger font
    Parent,
    /// Inner element: larger offset, or smaller font
    Child,
}

impl Relation {
    /// Ordering `candidate.cmp(origin)` must have in `mode`.
    fn wanted(self, mode: BrowseMode) -> Ordering {
        let outer = if mode.larger_is_parent() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
        match self {
            Relation::Sibling => Ordering::Equal,
            Relation::Parent => outer,
            Relation::Child => outer.reverse(),
        }
    }

    /// Qualifier used in "not found" messages.
    pub(crate) fn qualifier(self, mode: BrowseMode) -> &'static str {
        match self.wanted(mode) {
            Ordering::Equal => "the same",
            Ordering::Less => "smaller",
            Ordering::Greater => "greater",
        }
    }
}

/// Formatting in effect over a paragraph: all format changes merged.
pub fn formatting(paragraph: &Paragraph) -> FormatField {
    let mut merged = FormatField::new();
    for field in paragraph.fields() {
        if let TextField::FormatChange(format) = field {
            merged.update(&format);
        }
    }
    merged
}

/// Format keys compared when looking for a format change.
const FORMAT_CHANGE_KEYS: [&str; 7] = [
    "color",
    "font-family",
    "font-size",
    "bold",
    "italic",
    "strikethrough",
    "underline",
];

/// Formatting values that distinguish one run of text from another.
pub(crate) fn format_signature(paragraph: &Paragraph) -> Vec<Option<String>> {
    let format = formatting(paragraph);
    FORMAT_CHANGE_KEYS
        .iter()
        .map(|key| format.get(key).map(str::to_string))
        .collect()
}

/// Measure and style of one paragraph.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Measure {
    pub value: f64,
    pub style: Vec<Option<String>>,
}

impl Measure {
    pub fn of(paragraph: &Paragraph, mode: BrowseMode, options: &NavigationOptions) -> Option<Measure> {
        match mode {
            BrowseMode::HorizontalOffset => paragraph.horizontal_offset().map(|x| Measure {
                value: f64::from(x),
                style: Vec::new(),
            }),
            BrowseMode::FontSize | BrowseMode::FontSizeAndStyle => {
                let format = formatting(paragraph);
                let value = format.font_size()?;
                let style = if mode == BrowseMode::FontSizeAndStyle {
                    style_of(&format, options)
                } else {
                    Vec::new()
                };
                Some(Measure { value, style })
            }
        }
    }

    /// Whether `self` (a candidate) stands in `relation` to `origin`.
    pub fn relates(&self, origin: &Measure, relation: Relation, mode: BrowseMode) -> bool {
        self.style == origin.style && self.value.partial_cmp(&origin.value) == Some(relation.wanted(mode))
    }
}

fn style_of(format: &FormatField, options: &NavigationOptions) -> Vec<Option<String>> {
    let mut keys = Vec::new();
    if options.use_font_family {
        keys.push("font-family");
    }
    if options.use_color {
        keys.push("color");
    }
    if options.use_background_color {
        keys.push("background-color");
    }
    if options.use_bold_italic {
        keys.push("bold");
        keys.push("italic");
    }
    keys.into_iter()
        .map(|k| format.get(k).map(str::to_string))
        .collect()
}

/// Tone for a paragraph: offset mode spreads the screen width over three
/// octaves above the base pitch; font modes map larger fonts to lower tones.
pub fn tone(paragraph: &Paragraph, mode: BrowseMode, screen_width: u32) -> Option<f64> {
    let tone = match mode {
        BrowseMode::HorizontalOffset => {
            let offset = f64::from(paragraph.horizontal_offset()?);
            let octave = f64::from(screen_width.max(1)) / SCREEN_OCTAVES;
            BASE_FREQUENCY * 2f64.powf(offset / octave)
        }
        BrowseMode::FontSize | BrowseMode::FontSizeAndStyle => {
            let size = formatting(paragraph).font_size()?;
            if size <= 0.0 {
                return None;
            }
            3000.0 / size
        }
    };
    Some(tone.clamp(MIN_TONE, MAX_TONE))
}
