//! Rule model: attributes, bookmarks, sites and the rule configuration.
//!
//! These are immutable value types. A bookmark compiles its pattern and
//! script once when it is constructed; sites and configs are replaced
//! wholesale rather than edited in place.

/// Declare a fieldless enum persisted as its integer discriminant.
macro_rules! int_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(into = "u8", try_from = "u8")]
        $vis enum $name {
            $($(#[$vmeta])* $variant = $value,)+
        }

        impl $name {
            /// Every value, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value as u8
            }
        }

        impl TryFrom<u8> for $name {
            type Error = crate::error::Error;

            fn try_from(value: u8) -> crate::error::Result<Self> {
                match value {
                    $($value => Ok($name::$variant),)+
                    other => Err(crate::error::Error::Other(format!(
                        "invalid {} value {}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

mod attribute;
mod bookmark;
mod config;
mod site;

pub use attribute::{
    extract_attributes, matches_all, Attribute, AttributeKind, AttributeMatch, AttributeSet, Role,
};
pub use bookmark::{AutoSpeakMode, Bookmark, BookmarkCategory, BookmarkData, BookmarkId, PatternMatch};
pub use config::{Config, ConfigId, ConfigStore};
pub use site::{get_domain, DebugBeepMode, FocusMode, LiveRegionMode, Site, UrlMatch};
