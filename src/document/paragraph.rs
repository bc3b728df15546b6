//! Paragraph: an immutable cursor spanning exactly one paragraph.

use std::borrow::Cow;
use std::cmp::Ordering;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use super::{ControlField, DocumentCursor, ElementState, Endpoint, TextField, TextUnit};
use crate::error::{Error, Result};
use crate::model::{extract_attributes, Attribute, AttributeMatch, AttributeSet, Role};

/// Special positions a paragraph can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Boundary {
    /// Before the first paragraph
    Home,
    /// After the last paragraph
    End,
    /// An ordinary paragraph
    Normal,
}

/// Scan direction through the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    /// Paragraph step: `1` or `-1`.
    pub fn step(self) -> i32 {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }

    /// Direction of a signed count; `None` for zero.
    pub fn of(count: i32) -> Option<Self> {
        match count.signum() {
            1 => Some(Direction::Forward),
            -1 => Some(Direction::Backward),
            _ => None,
        }
    }

    /// Ordering a target must have relative to the origin to lie ahead.
    fn ahead(self) -> Ordering {
        match self {
            Direction::Forward => Ordering::Greater,
            Direction::Backward => Ordering::Less,
        }
    }
}

/// Named element kinds for quick navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Any heading, or a heading of one level
    Heading(Option<u8>),
    Link,
    Table,
    FormField,
    List,
    ListItem,
    Button,
    Edit,
    Frame,
    Separator,
    RadioButton,
    ComboBox,
    CheckBox,
    Graphic,
    BlockQuote,
    Landmark,
    EmbeddedObject,
    Article,
    Grouping,
    VisitedLink,
    UnvisitedLink,
    Annotation,
    /// A field whose value failed validation
    Error,
    Tab,
    Dialog,
    Menu,
    TreeView,
    ToolBar,
}

impl ElementKind {
    const NAMED: &'static [(&'static str, ElementKind)] = &[
        ("heading", ElementKind::Heading(None)),
        ("link", ElementKind::Link),
        ("table", ElementKind::Table),
        ("formfield", ElementKind::FormField),
        ("list", ElementKind::List),
        ("listitem", ElementKind::ListItem),
        ("button", ElementKind::Button),
        ("edit", ElementKind::Edit),
        ("frame", ElementKind::Frame),
        ("separator", ElementKind::Separator),
        ("radiobutton", ElementKind::RadioButton),
        ("combobox", ElementKind::ComboBox),
        ("checkbox", ElementKind::CheckBox),
        ("graphic", ElementKind::Graphic),
        ("blockquote", ElementKind::BlockQuote),
        ("landmark", ElementKind::Landmark),
        ("embeddedobject", ElementKind::EmbeddedObject),
        ("article", ElementKind::Article),
        ("grouping", ElementKind::Grouping),
        ("visitedlink", ElementKind::VisitedLink),
        ("unvisitedlink", ElementKind::UnvisitedLink),
        ("annotation", ElementKind::Annotation),
        ("error", ElementKind::Error),
        ("tab", ElementKind::Tab),
        ("dialog", ElementKind::Dialog),
        ("menu", ElementKind::Menu),
        ("treeview", ElementKind::TreeView),
        ("toolbar", ElementKind::ToolBar),
    ];

    const MENU_ROLES: [Role; 8] = [
        Role::Menu,
        Role::MenuBar,
        Role::MenuItem,
        Role::PopupMenu,
        Role::CheckMenuItem,
        Role::RadioMenuItem,
        Role::TearOffMenu,
        Role::MenuButton,
    ];

    /// Parse a quick-nav element name such as `Heading2`, `link` or `formField`.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.to_lowercase();
        if let Some(level) = name.strip_prefix("heading") {
            if level.is_empty() {
                return Some(ElementKind::Heading(None));
            }
            return match level.parse::<u8>() {
                Ok(n @ 1..=6) => Some(ElementKind::Heading(Some(n))),
                _ => None,
            };
        }
        Self::NAMED
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, kind)| *kind)
    }

    /// Spoken name, as in "No next tree view".
    pub fn label(self) -> Cow<'static, str> {
        let name = match self {
            ElementKind::Heading(Some(level)) => return Cow::Owned(format!("heading at level {}", level)),
            ElementKind::Heading(None) => "heading",
            ElementKind::Link => "link",
            ElementKind::Table => "table",
            ElementKind::FormField => "form field",
            ElementKind::List => "list",
            ElementKind::ListItem => "list item",
            ElementKind::Button => "button",
            ElementKind::Edit => "edit field",
            ElementKind::Frame => "frame",
            ElementKind::Separator => "separator",
            ElementKind::RadioButton => "radio button",
            ElementKind::ComboBox => "combo box",
            ElementKind::CheckBox => "check box",
            ElementKind::Graphic => "graphic",
            ElementKind::BlockQuote => "block quote",
            ElementKind::Landmark => "landmark",
            ElementKind::EmbeddedObject => "embedded object",
            ElementKind::Article => "article",
            ElementKind::Grouping => "grouping",
            ElementKind::VisitedLink => "visited link",
            ElementKind::UnvisitedLink => "unvisited link",
            ElementKind::Annotation => "annotation",
            ElementKind::Error => "error",
            ElementKind::Tab => "tab",
            ElementKind::Dialog => "dialog",
            ElementKind::Menu => "menu",
            ElementKind::TreeView => "tree view",
            ElementKind::ToolBar => "tool bar",
        };
        Cow::Borrowed(name)
    }

    /// Whether a paragraph with these fields contains this element.
    pub fn matches(self, fields: &[TextField]) -> bool {
        let control = |accept: &dyn Fn(&ControlField) -> bool| {
            fields.iter().any(|field| matches!(field, TextField::ControlStart(c) if accept(c)))
        };
        match self {
            ElementKind::VisitedLink => {
                return control(&|c: &ControlField| c.role == Role::Link && c.has_state(ElementState::Visited));
            }
            ElementKind::UnvisitedLink => {
                return control(&|c: &ControlField| c.role == Role::Link && !c.has_state(ElementState::Visited));
            }
            ElementKind::Error => return control(&|c: &ControlField| c.has_state(ElementState::Invalid)),
            _ => {}
        }

        let attributes = extract_attributes(fields);
        let has = |role: Role| attributes.contains(&Attribute::Role(role));
        match self {
            ElementKind::Heading(None) => {
                has(Role::Heading) || attributes.iter().any(|a| matches!(a, Attribute::Heading(_)))
            }
            ElementKind::Heading(Some(level)) => attributes.contains(&Attribute::Heading(level)),
            ElementKind::Link => has(Role::Link),
            ElementKind::Table => has(Role::Table),
            ElementKind::FormField => [
                Role::EditableText,
                Role::CheckBox,
                Role::RadioButton,
                Role::ComboBox,
                Role::Button,
                Role::ToggleButton,
            ]
            .into_iter()
            .any(has),
            ElementKind::List => has(Role::List),
            ElementKind::ListItem => has(Role::ListItem),
            ElementKind::Button => has(Role::Button) || has(Role::ToggleButton),
            ElementKind::Edit => has(Role::EditableText),
            ElementKind::Frame => has(Role::Frame),
            ElementKind::Separator => has(Role::Separator),
            ElementKind::RadioButton => has(Role::RadioButton),
            ElementKind::ComboBox => has(Role::ComboBox),
            ElementKind::CheckBox => has(Role::CheckBox),
            ElementKind::Graphic => has(Role::Graphic),
            ElementKind::BlockQuote => has(Role::BlockQuote),
            ElementKind::Landmark => has(Role::Landmark),
            ElementKind::EmbeddedObject => has(Role::EmbeddedObject),
            ElementKind::Article => has(Role::Article),
            ElementKind::Grouping => has(Role::Grouping),
            ElementKind::Annotation => has(Role::Annotation),
            ElementKind::Tab => has(Role::Tab) || has(Role::TabControl),
            ElementKind::Dialog => has(Role::Dialog) || has(Role::Application),
            ElementKind::Menu => Self::MENU_ROLES.into_iter().any(has),
            ElementKind::TreeView => has(Role::TreeView),
            ElementKind::ToolBar => has(Role::ToolBar),
            ElementKind::VisitedLink | ElementKind::UnvisitedLink | ElementKind::Error => false,
        }
    }
}

/// One paragraph of the document.
///
/// Movement never mutates the paragraph or the document; it returns a new
/// paragraph or [`Error::NotFound`] at a document boundary.
#[derive(Debug, Clone)]
pub struct Paragraph {
    cursor: Box<dyn DocumentCursor>,
    boundary: Boundary,
}

impl Paragraph {
    /// Build the paragraph containing the start of `cursor`.
    pub fn from_cursor(cursor: Box<dyn DocumentCursor>) -> Self {
        let mut cursor = cursor;
        cursor.collapse(false);
        cursor.expand(TextUnit::Paragraph);
        Self {
            cursor,
            boundary: Boundary::Normal,
        }
    }

    /// Build from any concrete cursor.
    pub fn new(cursor: impl DocumentCursor + 'static) -> Self {
        Self::from_cursor(Box::new(cursor))
    }

    /// Underlying cursor.
    pub fn cursor(&self) -> &dyn DocumentCursor {
        self.cursor.as_ref()
    }

    pub fn boundary(&self) -> Boundary {
        self.boundary
    }

    /// Move by `count` paragraphs. Anything short of exactly `count` is
    /// `NotFound`.
    pub fn move_by(&self, count: i32) -> Result<Paragraph> {
        if count == 0 {
            return Ok(self.clone());
        }
        let mut cursor = self.cursor.clone();
        let wanted = match self.boundary {
            Boundary::Home if count < 0 => return Err(Error::NotFound),
            Boundary::End if count > 0 => return Err(Error::NotFound),
            Boundary::Home => {
                if self.is_empty_document() {
                    return Err(Error::NotFound);
                }
                count - 1
            }
            Boundary::End | Boundary::Normal => count,
        };
        if wanted != 0 && cursor.move_by(TextUnit::Paragraph, wanted) != wanted {
            return Err(Error::NotFound);
        }
        Ok(Paragraph::from_cursor(cursor))
    }

    pub fn next(&self) -> Result<Paragraph> {
        self.move_by(1)
    }

    pub fn previous(&self) -> Result<Paragraph> {
        self.move_by(-1)
    }

    /// Step once in `direction`.
    pub fn step(&self, direction: Direction) -> Result<Paragraph> {
        self.move_by(direction.step())
    }

    /// Position before the first paragraph.
    pub fn home(&self) -> Paragraph {
        let mut cursor = self.cursor.clone();
        cursor.expand(TextUnit::Story);
        cursor.collapse(false);
        Paragraph {
            cursor,
            boundary: Boundary::Home,
        }
    }

    /// Position after the last paragraph.
    pub fn end(&self) -> Paragraph {
        let mut cursor = self.cursor.clone();
        cursor.expand(TextUnit::Story);
        cursor.collapse(true);
        Paragraph {
            cursor,
            boundary: Boundary::End,
        }
    }

    fn is_empty_document(&self) -> bool {
        let mut story = self.cursor.clone();
        story.expand(TextUnit::Story);
        story.compare_endpoints(story.as_ref(), Endpoint::StartToEnd) == Some(Ordering::Equal)
    }

    /// Successive paragraphs in `direction`, not including this one.
    pub fn walk(&self, direction: Direction) -> Walk {
        Walk {
            current: Some(self.clone()),
            direction,
        }
    }

    pub fn text(&self) -> String {
        self.cursor.text()
    }

    /// Whether the paragraph holds only whitespace.
    pub fn is_blank(&self) -> bool {
        self.text().trim().is_empty()
    }

    /// Structured field stream.
    pub fn fields(&self) -> Vec<TextField> {
        self.cursor.text_with_fields()
    }

    /// Attribute set, computed fresh on every call.
    pub fn attributes(&self) -> AttributeSet {
        extract_attributes(&self.fields())
    }

    /// Whether every filter matches this paragraph.
    pub fn matches_filters(&self, filters: &[AttributeMatch]) -> bool {
        if filters.is_empty() {
            return true;
        }
        let attributes = self.attributes();
        filters.iter().all(|f| f.matches(&attributes))
    }

    /// Roles of enclosing elements, outermost first.
    pub fn roles(&self) -> Vec<Role> {
        self.fields()
            .into_iter()
            .filter_map(|f| match f {
                TextField::ControlStart(c) if c.role != Role::Unknown => Some(c.role),
                _ => None,
            })
            .collect()
    }

    pub fn heading_level(&self) -> Option<u8> {
        self.attributes().into_iter().find_map(|a| match a {
            Attribute::Heading(level) => Some(level),
            _ => None,
        })
    }

    pub fn horizontal_offset(&self) -> Option<i32> {
        self.cursor.horizontal_offset()
    }

    /// Document order of the start points; `None` across documents.
    pub fn compare(&self, other: &Paragraph) -> Option<Ordering> {
        self.cursor
            .compare_endpoints(other.cursor.as_ref(), Endpoint::StartToStart)
    }

    pub fn same_position(&self, other: &Paragraph) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    /// Whether this paragraph lies strictly beyond `origin` in `direction`.
    pub fn is_beyond(&self, origin: &Paragraph, direction: Direction) -> bool {
        self.compare(origin) == Some(direction.ahead())
    }

    /// Move the host caret here.
    pub fn update_caret(&self) {
        self.cursor.update_caret();
    }

    /// Activate the element here.
    pub fn activate(&self) -> bool {
        self.cursor.activate()
    }

    pub fn document_key(&self) -> u64 {
        self.cursor.document_key()
    }

    /// Next paragraph in `direction` containing `needle`. Both sides are
    /// NFC-normalised before comparison.
    pub fn find_text(&self, needle: &str, case_sensitive: bool, direction: Direction) -> Result<Paragraph> {
        let normalize = |s: &str| -> String {
            let s: String = s.nfc().collect();
            if case_sensitive {
                s
            } else {
                s.to_lowercase()
            }
        };
        let needle = normalize(needle);
        self.walk(direction)
            .find(|p| normalize(&p.text()).contains(&needle))
            .ok_or(Error::NotFound)
    }

    /// Next paragraph in `direction` whose text matches `regex`.
    pub fn find_regex(&self, regex: &Regex, direction: Direction) -> Result<Paragraph> {
        self.walk(direction)
            .find(|p| regex.is_match(&p.text()))
            .ok_or(Error::NotFound)
    }

    /// Next paragraph in `direction` containing an element of `kind`.
    pub fn find_element(&self, kind: ElementKind, direction: Direction) -> Result<Paragraph> {
        self.walk(direction)
            .find(|p| kind.matches(&p.fields()))
            .ok_or(Error::NotFound)
    }
}

/// Iterator returned by [`Paragraph::walk`].
#[derive(Debug)]
pub struct Walk {
    current: Option<Paragraph>,
    direction: Direction,
}

impl Iterator for Walk {
    type Item = Paragraph;

    fn next(&mut self) -> Option<Paragraph> {
        let next = self.current.take()?.step(self.direction).ok()?;
        self.current = Some(next.clone());
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ControlField, TextBlock, TextDocument};

    fn doc() -> std::sync::Arc<TextDocument> {
        TextDocument::new(vec![
            TextBlock::new("Intro").with_control(ControlField::heading(1)),
            TextBlock::new("Go home").with_control(ControlField::new(Role::Link)),
            TextBlock::new("Café au lait"),
            TextBlock::new("Submit").with_control(ControlField::new(Role::Button)),
        ])
    }

    #[test]
    fn test_home_boundary() {
        let doc = doc();
        let p = Paragraph::new(doc.cursor_at(2));
        let home = p.home();
        assert_eq!(home.boundary(), Boundary::Home);
        assert!(home.previous().unwrap_err().is_not_found());
        assert_eq!(home.next().unwrap().text(), "Intro");
        assert_eq!(home.move_by(2).unwrap().text(), "Go home");
    }

    #[test]
    fn test_end_boundary() {
        let doc = doc();
        let end = Paragraph::new(doc.cursor_at(0)).end();
        assert!(end.next().is_err());
        assert_eq!(end.previous().unwrap().text(), "Submit");
    }

    #[test]
    fn test_move_past_end_is_not_found() {
        let doc = doc();
        let p = Paragraph::new(doc.cursor_at(2));
        assert!(p.move_by(2).is_err());
        assert_eq!(p.move_by(1).unwrap().text(), "Submit");
        assert!(p.move_by(-3).is_err());
    }

    #[test]
    fn test_find_text_normalizes() {
        let doc = doc();
        let p = Paragraph::new(doc.cursor_at(0));
        let found = p.find_text("CAFE\u{301}", false, Direction::Forward).unwrap();
        assert_eq!(found.text(), "Café au lait");
        assert!(p.find_text("Intro", true, Direction::Forward).is_err());
    }

    #[test]
    fn test_find_element() {
        let doc = doc();
        let p = Paragraph::new(doc.cursor_at(0));
        let button = p.find_element(ElementKind::Button, Direction::Forward).unwrap();
        assert_eq!(button.text(), "Submit");
        let heading = button
            .find_element(ElementKind::Heading(Some(1)), Direction::Backward)
            .unwrap();
        assert_eq!(heading.text(), "Intro");
        assert!(button.find_element(ElementKind::Table, Direction::Backward).is_err());
    }

    #[test]
    fn test_link_states_and_role_groups() {
        let doc = TextDocument::new(vec![
            TextBlock::new("Seen").with_control(ControlField::new(Role::Link).with_state(ElementState::Visited)),
            TextBlock::new("Fresh").with_control(ControlField::new(Role::Link)),
            TextBlock::new("Email").with_control(ControlField::new(Role::EditableText).with_state(ElementState::Invalid)),
            TextBlock::new("File").with_control(ControlField::new(Role::MenuBar)),
            TextBlock::new("Settings").with_control(ControlField::new(Role::TabControl)),
        ]);
        let home = Paragraph::new(doc.cursor_at(0)).home();
        let find = |kind| home.find_element(kind, Direction::Forward).map(|p| p.text());
        assert_eq!(find(ElementKind::VisitedLink).unwrap(), "Seen");
        assert_eq!(find(ElementKind::UnvisitedLink).unwrap(), "Fresh");
        assert_eq!(find(ElementKind::Error).unwrap(), "Email");
        assert_eq!(find(ElementKind::Menu).unwrap(), "File");
        assert_eq!(find(ElementKind::Tab).unwrap(), "Settings");
        assert!(find(ElementKind::TreeView).is_err());
        assert_eq!(ElementKind::TreeView.label(), "tree view");
        assert_eq!(ElementKind::Heading(Some(2)).label(), "heading at level 2");
    }

    #[test]
    fn test_element_names() {
        assert_eq!(ElementKind::from_name("Heading3"), Some(ElementKind::Heading(Some(3))));
        assert_eq!(ElementKind::from_name("formField"), Some(ElementKind::FormField));
        assert_eq!(ElementKind::from_name("toolBar"), Some(ElementKind::ToolBar));
        assert_eq!(ElementKind::from_name("heading9"), None);
        assert_eq!(ElementKind::from_name("spaceship"), None);
    }

    #[test]
    fn test_is_beyond() {
        let doc = doc();
        let a = Paragraph::new(doc.cursor_at(1));
        let b = a.next().unwrap();
        assert!(b.is_beyond(&a, Direction::Forward));
        assert!(!b.is_beyond(&a, Direction::Backward));
        assert!(!a.is_beyond(&a, Direction::Forward));
    }
}
