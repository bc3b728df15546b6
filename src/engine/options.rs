//! Navigation options and configuration.

use crate::script::DEFAULT_STEP_LIMIT;

/// Runtime behaviour of the navigator.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationOptions {
    /// Volume of the distance crackle (0 = off)
    pub crackle_volume: u8,

    /// Volume of sonification tones (0 = off)
    pub beep_volume: u8,

    /// Volume of the end-of-document chord
    pub no_next_text_chime_volume: u8,

    /// Whether to speak a message at the end of the document
    pub no_next_text_message: bool,

    /// What structural navigation compares
    pub browse_mode: BrowseMode,

    /// Style comparison switches for [`BrowseMode::FontSizeAndStyle`]
    pub use_font_family: bool,
    pub use_color: bool,
    pub use_background_color: bool,
    pub use_bold_italic: bool,

    /// Skip blank paragraphs in paragraph movement
    pub skip_empty_paragraphs: bool,

    /// Volume of the chime played per skipped clutter paragraph
    pub skip_chime_volume: u8,

    /// Screen width in pixels, used to map offsets onto pitch
    pub screen_width: u32,

    /// Instruction budget of one script run
    pub step_limit: u64,

    /// Worker threads probing offsets for hierarchical levels
    pub level_scan_threads: usize,
}

impl NavigationOptions {
    /// Create new options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_crackle_volume(mut self, volume: u8) -> Self {
        self.crackle_volume = volume.min(100);
        self
    }

    pub fn with_beep_volume(mut self, volume: u8) -> Self {
        self.beep_volume = volume.min(100);
        self
    }

    /// Set the end-of-document chord volume.
    pub fn with_chime_volume(mut self, volume: u8) -> Self {
        self.no_next_text_chime_volume = volume.min(100);
        self
    }

    /// Enable or disable the spoken end-of-document message.
    pub fn with_end_message(mut self, enabled: bool) -> Self {
        self.no_next_text_message = enabled;
        self
    }

    pub fn with_browse_mode(mut self, mode: BrowseMode) -> Self {
        self.browse_mode = mode;
        self
    }

    /// Compare font size only, ignoring every style switch.
    pub fn without_style(mut self) -> Self {
        self.use_font_family = false;
        self.use_color = false;
        self.use_background_color = false;
        self.use_bold_italic = false;
        self
    }

    pub fn with_skip_empty_paragraphs(mut self, skip: bool) -> Self {
        self.skip_empty_paragraphs = skip;
        self
    }

    pub fn with_skip_chime_volume(mut self, volume: u8) -> Self {
        self.skip_chime_volume = volume.min(100);
        self
    }

    pub fn with_screen_width(mut self, width: u32) -> Self {
        self.screen_width = width.max(1);
        self
    }

    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn with_level_scan_threads(mut self, threads: usize) -> Self {
        self.level_scan_threads = threads.max(1);
        self
    }

    /// Mute every sound.
    pub fn silent(mut self) -> Self {
        self.crackle_volume = 0;
        self.beep_volume = 0;
        self.no_next_text_chime_volume = 0;
        self.skip_chime_volume = 0;
        self
    }
}

impl Default for NavigationOptions {
    fn default() -> Self {
        Self {
            crackle_volume: 25,
            beep_volume: 60,
            no_next_text_chime_volume: 50,
            no_next_text_message: true,
            browse_mode: BrowseMode::HorizontalOffset,
            use_font_family: true,
            use_color: true,
            use_background_color: true,
            use_bold_italic: true,
            skip_empty_paragraphs: true,
            skip_chime_volume: 25,
            screen_width: 1920,
            step_limit: DEFAULT_STEP_LIMIT,
            level_scan_threads: 5,
        }
    }
}

/// What sibling / parent / child navigation compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BrowseMode {
    /// Screen indentation
    #[default]
    HorizontalOffset,
    /// Font size
    FontSize,
    /// Font size, and the style must match
    FontSizeAndStyle,
}

impl BrowseMode {
    pub const ALL: [BrowseMode; 3] = [
        BrowseMode::HorizontalOffset,
        BrowseMode::FontSize,
        BrowseMode::FontSizeAndStyle,
    ];

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            BrowseMode::HorizontalOffset => "horizontal offset",
            BrowseMode::FontSize => "font size",
            BrowseMode::FontSizeAndStyle => "font size and same style",
        }
    }

    /// Next mode in rotor order.
    pub fn next(self) -> Self {
        match self {
            BrowseMode::HorizontalOffset => BrowseMode::FontSize,
            BrowseMode::FontSize => BrowseMode::FontSizeAndStyle,
            BrowseMode::FontSizeAndStyle => BrowseMode::HorizontalOffset,
        }
    }

    /// Whether a larger measure means an outer element.
    pub(crate) fn larger_is_parent(self) -> bool {
        !matches!(self, BrowseMode::HorizontalOffset)
    }
}

impl std::str::FromStr for BrowseMode {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.to_lowercase().replace(['-', '_'], " ").trim() {
            "offset" | "horizontal offset" | "indent" => Ok(BrowseMode::HorizontalOffset),
            "font" | "font size" => Ok(BrowseMode::FontSize),
            "style" | "font size and style" | "font size and same style" => Ok(BrowseMode::FontSizeAndStyle),
            other => Err(crate::error::Error::Other(format!("unknown browse mode '{}'", other))),
        }
    }
}
