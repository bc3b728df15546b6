//! Paragraph attributes and attribute filters.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::TextField;
use crate::error::{Error, Result};

macro_rules! roles {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Role of a structural document element.
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum Role {
            $(
                #[serde(rename = $name)]
                $variant,
            )+
            /// Element without a known role
            #[default]
            #[serde(rename = "unknown")]
            Unknown,
        }

        impl Role {
            /// Every role, in declaration order.
            pub const ALL: &'static [Role] = &[$(Role::$variant,)+ Role::Unknown];

            /// Canonical name used in rule files and filter strings.
            pub fn name(self) -> &'static str {
                match self {
                    $(Role::$variant => $name,)+
                    Role::Unknown => "unknown",
                }
            }
        }
    };
}

roles! {
    Link => "link",
    Button => "button",
    Heading => "heading",
    Table => "table",
    TableRow => "tableRow",
    TableCell => "tableCell",
    EditableText => "editableText",
    CheckBox => "checkBox",
    RadioButton => "radioButton",
    ComboBox => "comboBox",
    ToggleButton => "toggleButton",
    List => "list",
    ListItem => "listItem",
    Graphic => "graphic",
    BlockQuote => "blockQuote",
    Landmark => "landmark",
    Frame => "frame",
    Separator => "separator",
    Article => "article",
    Grouping => "grouping",
    Document => "document",
    Paragraph => "paragraph",
    Section => "section",
    Form => "form",
    MenuItem => "menuItem",
    Tab => "tab",
    TreeViewItem => "treeViewItem",
    StaticText => "staticText",
    EmbeddedObject => "embeddedObject",
    Dialog => "dialog",
    Application => "application",
    TabControl => "tabControl",
    Menu => "menu",
    MenuBar => "menuBar",
    PopupMenu => "popupMenu",
    CheckMenuItem => "checkMenuItem",
    RadioMenuItem => "radioMenuItem",
    TearOffMenu => "tearOffMenu",
    MenuButton => "menuButton",
    TreeView => "treeView",
    ToolBar => "toolBar",
    Annotation => "annotation",
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Role {
    type Err = Error;

    /// Case-insensitive; spaces, dashes and underscores are ignored
    /// (`"edit box"` is not a role, `"editable_text"` is).
    fn from_str(s: &str) -> Result<Self> {
        let wanted: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();
        Role::ALL
            .iter()
            .copied()
            .find(|role| role.name().to_lowercase() == wanted)
            .ok_or_else(|| Error::InvalidAttribute(format!("unknown role '{}'", s)))
    }
}

/// Kind of a paragraph attribute. Declaration order is the sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AttributeKind {
    Role,
    Heading,
    FontSize,
    FontFamily,
    Color,
    BackgroundColor,
    Bold,
    Italic,
}

impl AttributeKind {
    const ALL: [AttributeKind; 8] = [
        AttributeKind::Role,
        AttributeKind::Heading,
        AttributeKind::FontSize,
        AttributeKind::FontFamily,
        AttributeKind::Color,
        AttributeKind::BackgroundColor,
        AttributeKind::Bold,
        AttributeKind::Italic,
    ];

    /// Name as used in rule files, filter strings and host format fields.
    pub fn name(self) -> &'static str {
        match self {
            AttributeKind::Role => "role",
            AttributeKind::Heading => "heading",
            AttributeKind::FontSize => "font-size",
            AttributeKind::FontFamily => "font-family",
            AttributeKind::Color => "color",
            AttributeKind::BackgroundColor => "background-color",
            AttributeKind::Bold => "bold",
            AttributeKind::Italic => "italic",
        }
    }
}

impl FromStr for AttributeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| Error::InvalidAttribute(format!("unknown attribute '{}'", s)))
    }
}

/// One structural or formatting fact about a paragraph.
///
/// Attributes are totally ordered by `(kind, value)` so sets of them are
/// stable regardless of extraction order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawAttribute", into = "RawAttribute")]
pub enum Attribute {
    Role(Role),
    Heading(u8),
    FontSize(String),
    FontFamily(String),
    Color(String),
    BackgroundColor(String),
    Bold(bool),
    Italic(bool),
}

impl Attribute {
    /// Kind of this attribute.
    pub fn kind(&self) -> AttributeKind {
        match self {
            Attribute::Role(_) => AttributeKind::Role,
            Attribute::Heading(_) => AttributeKind::Heading,
            Attribute::FontSize(_) => AttributeKind::FontSize,
            Attribute::FontFamily(_) => AttributeKind::FontFamily,
            Attribute::Color(_) => AttributeKind::Color,
            Attribute::BackgroundColor(_) => AttributeKind::BackgroundColor,
            Attribute::Bold(_) => AttributeKind::Bold,
            Attribute::Italic(_) => AttributeKind::Italic,
        }
    }

    /// Build an attribute from a kind and its textual value.
    pub fn parse(kind: AttributeKind, value: &str) -> Result<Self> {
        let value = value.trim();
        Ok(match kind {
            AttributeKind::Role => Attribute::Role(value.parse()?),
            AttributeKind::Heading => Attribute::Heading(value.parse().map_err(|_| {
                Error::InvalidAttribute(format!("heading level must be a number, got '{}'", value))
            })?),
            AttributeKind::FontSize => Attribute::FontSize(value.to_string()),
            AttributeKind::FontFamily => Attribute::FontFamily(value.to_string()),
            AttributeKind::Color => Attribute::Color(value.to_string()),
            AttributeKind::BackgroundColor => Attribute::BackgroundColor(value.to_string()),
            AttributeKind::Bold => Attribute::Bold(parse_flag(value)?),
            AttributeKind::Italic => Attribute::Italic(parse_flag(value)?),
        })
    }

    /// Value rendered as text.
    pub fn value_string(&self) -> String {
        match self {
            Attribute::Role(role) => role.name().to_string(),
            Attribute::Heading(level) => level.to_string(),
            Attribute::FontSize(s)
            | Attribute::FontFamily(s)
            | Attribute::Color(s)
            | Attribute::BackgroundColor(s) => s.clone(),
            Attribute::Bold(b) | Attribute::Italic(b) => b.to_string(),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind().name(), self.value_string())
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => Err(Error::InvalidAttribute(format!("expected a boolean, got '{}'", other))),
    }
}

/// Serialized shape: `{"attribute": "role", "value": "link"}`.
#[derive(Serialize, Deserialize)]
struct RawAttribute {
    attribute: String,
    value: Value,
}

impl TryFrom<RawAttribute> for Attribute {
    type Error = Error;

    fn try_from(raw: RawAttribute) -> Result<Self> {
        let kind: AttributeKind = raw.attribute.parse()?;
        let value = match &raw.value {
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            other => {
                return Err(Error::InvalidAttribute(format!(
                    "unsupported value {} for {}",
                    other,
                    kind.name()
                )))
            }
        };
        Attribute::parse(kind, &value)
    }
}

impl From<Attribute> for RawAttribute {
    fn from(attribute: Attribute) -> Self {
        let value = match &attribute {
            Attribute::Heading(level) => Value::from(*level),
            Attribute::Bold(b) | Attribute::Italic(b) => Value::Bool(*b),
            other => Value::String(other.value_string()),
        };
        RawAttribute {
            attribute: attribute.kind().name().to_string(),
            value,
        }
    }
}

/// Set of attributes of one paragraph.
pub type AttributeSet = BTreeSet<Attribute>;

/// A filter condition over a paragraph's attributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeMatch {
    /// Match when the attribute is absent instead of present
    #[serde(default)]
    pub invert: bool,

    /// Attribute to look for
    pub attribute: Attribute,
}

impl AttributeMatch {
    /// Create a positive filter.
    pub fn new(attribute: Attribute) -> Self {
        Self {
            invert: false,
            attribute,
        }
    }

    /// Create an inverted filter.
    pub fn not(attribute: Attribute) -> Self {
        Self {
            invert: true,
            attribute,
        }
    }

    /// `invert XOR (attribute ∈ set)`.
    pub fn matches(&self, attributes: &AttributeSet) -> bool {
        self.invert != attributes.contains(&self.attribute)
    }
}

/// True when every filter matches (an empty filter list always matches).
pub fn matches_all(filters: &[AttributeMatch], attributes: &AttributeSet) -> bool {
    filters.iter().all(|f| f.matches(attributes))
}

impl FromStr for AttributeMatch {
    type Err = Error;

    /// Parse the compact grammar `"[!]kind:value"`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (invert, body) = match s.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let tokens: Vec<&str> = body.split(':').collect();
        if tokens.len() != 2 {
            return Err(Error::InvalidAttribute(format!(
                "expected 'kind:value', found {} tokens in '{}'",
                tokens.len(),
                s
            )));
        }
        let kind: AttributeKind = tokens[0].parse()?;
        Ok(Self {
            invert,
            attribute: Attribute::parse(kind, tokens[1])?,
        })
    }
}

impl fmt::Display for AttributeMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.invert {
            f.write_str("!")?;
        }
        write!(f, "{}", self.attribute)
    }
}

/// Compute the attribute set of a paragraph from its field stream.
pub fn extract_attributes(fields: &[TextField]) -> AttributeSet {
    let mut set = AttributeSet::new();
    let mut heading: Option<u8> = None;
    for field in fields {
        match field {
            TextField::ControlStart(control) => {
                if control.role != Role::Unknown {
                    set.insert(Attribute::Role(control.role));
                }
                if let Some(level) = control.level {
                    heading = Some(heading.map_or(level, |h| h.max(level)));
                }
            }
            TextField::FormatChange(format) => {
                for (key, value) in &format.0 {
                    let Ok(kind) = key.parse::<AttributeKind>() else {
                        continue;
                    };
                    if matches!(kind, AttributeKind::Role | AttributeKind::Heading) {
                        continue;
                    }
                    if let Ok(attribute) = Attribute::parse(kind, value) {
                        set.insert(attribute);
                    }
                }
            }
            TextField::Text(_) | TextField::ControlEnd => {}
        }
    }
    if let Some(level) = heading {
        set.insert(Attribute::Heading(level));
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ControlField, FormatField};

    #[test]
    fn test_role_parsing() {
        assert_eq!("link".parse::<Role>().unwrap(), Role::Link);
        assert_eq!("Editable_Text".parse::<Role>().unwrap(), Role::EditableText);
        assert!("spaceship".parse::<Role>().is_err());
    }

    #[test]
    fn test_attribute_ordering() {
        let mut set = AttributeSet::new();
        set.insert(Attribute::Bold(true));
        set.insert(Attribute::Heading(2));
        set.insert(Attribute::Role(Role::Link));
        let kinds: Vec<_> = set.iter().map(Attribute::kind).collect();
        assert_eq!(
            kinds,
            vec![AttributeKind::Role, AttributeKind::Heading, AttributeKind::Bold]
        );
    }

    #[test]
    fn test_match_grammar() {
        let m: AttributeMatch = "!role:button".parse().unwrap();
        assert!(m.invert);
        assert_eq!(m.attribute, Attribute::Role(Role::Button));
        assert_eq!(m.to_string(), "!role:button");

        let m: AttributeMatch = "heading:2".parse().unwrap();
        assert_eq!(m.attribute, Attribute::Heading(2));

        assert!("role".parse::<AttributeMatch>().is_err());
        assert!("role:link:extra".parse::<AttributeMatch>().is_err());
        assert!("weight:heavy".parse::<AttributeMatch>().is_err());
    }

    #[test]
    fn test_invert_semantics() {
        let set: AttributeSet = [Attribute::Role(Role::Link)].into_iter().collect();
        assert!(AttributeMatch::new(Attribute::Role(Role::Link)).matches(&set));
        assert!(!AttributeMatch::not(Attribute::Role(Role::Link)).matches(&set));
        assert!(AttributeMatch::not(Attribute::Role(Role::Button)).matches(&set));
    }

    #[test]
    fn test_serde_shape() {
        let m = AttributeMatch::new(Attribute::Heading(3));
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"invert": false, "attribute": {"attribute": "heading", "value": 3}})
        );
        let back: AttributeMatch = serde_json::from_value(json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn test_extract_attributes() {
        let fields = vec![
            TextField::ControlStart(ControlField::new(Role::ListItem)),
            TextField::ControlStart(ControlField::heading(2)),
            TextField::FormatChange(
                FormatField::new()
                    .with("font-size", "12pt")
                    .with("bold", "true")
                    .with("text-align", "left"),
            ),
            TextField::Text("Title".into()),
            TextField::ControlEnd,
            TextField::ControlEnd,
        ];
        let set = extract_attributes(&fields);
        assert!(set.contains(&Attribute::Role(Role::ListItem)));
        assert!(set.contains(&Attribute::Role(Role::Heading)));
        assert!(set.contains(&Attribute::Heading(2)));
        assert!(set.contains(&Attribute::FontSize("12pt".into())));
        assert!(set.contains(&Attribute::Bold(true)));
        assert_eq!(set.len(), 5);
    }
}
