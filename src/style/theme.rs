//! Document theme: a color scheme and a major/minor font scheme.
//!
//! Shared by reference across every resolution in one document and never
//! mutated after load.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{EdgeSet, FontRef, PropertySet, StyleFamily, DEFAULT_CELL_MARGIN};

/// Color slot aliases used by run properties that resolve to scheme slots.
const COLOR_ALIASES: &[(&str, &str)] = &[
    ("text1", "dk1"),
    ("background1", "lt1"),
    ("text2", "dk2"),
    ("background2", "lt2"),
    ("tx1", "dk1"),
    ("bg1", "lt1"),
    ("tx2", "dk2"),
    ("bg2", "lt2"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Theme {
    pub name: String,
    /// Slot name (`dk1`, `accent1`, ...) to hex color.
    pub colors: HashMap<String, String>,
    pub fonts: FontScheme,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FontScheme {
    pub major: ScriptFonts,
    pub minor: ScriptFonts,
}

/// Typeface names per script class. Empty means "not set".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScriptFonts {
    pub latin: String,
    pub east_asia: String,
    pub complex: String,
}

/// A reference into the font scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ThemeFontSlot {
    MajorLatin,
    MinorLatin,
    MajorEastAsia,
    MinorEastAsia,
    MajorComplex,
    MinorComplex,
}

impl Default for FontScheme {
    fn default() -> Self {
        Self {
            major: ScriptFonts {
                latin: "Calibri Light".to_string(),
                ..Default::default()
            },
            minor: ScriptFonts {
                latin: "Calibri".to_string(),
                ..Default::default()
            },
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        let colors = [
            ("dk1", "000000"),
            ("lt1", "FFFFFF"),
            ("dk2", "44546A"),
            ("lt2", "E7E6E6"),
            ("accent1", "4472C4"),
            ("accent2", "ED7D31"),
            ("accent3", "A5A5A5"),
            ("accent4", "FFC000"),
            ("accent5", "5B9BD5"),
            ("accent6", "70AD47"),
            ("hlink", "0563C1"),
            ("folHlink", "954F72"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self {
            name: "Office".to_string(),
            colors,
            fonts: FontScheme::default(),
        }
    }
}

impl Theme {
    /// Hex value for a color slot, following the `text1`/`background1` aliases.
    pub fn color(&self, slot: &str) -> Option<&str> {
        if let Some(hex) = self.colors.get(slot) {
            return Some(hex);
        }
        COLOR_ALIASES
            .iter()
            .find(|(alias, _)| *alias == slot)
            .and_then(|(_, target)| self.colors.get(*target))
            .map(String::as_str)
    }

    /// Typeface name for a font slot, or `None` if the scheme leaves it empty.
    pub fn font(&self, slot: ThemeFontSlot) -> Option<&str> {
        let name = match slot {
            ThemeFontSlot::MajorLatin => &self.fonts.major.latin,
            ThemeFontSlot::MinorLatin => &self.fonts.minor.latin,
            ThemeFontSlot::MajorEastAsia => &self.fonts.major.east_asia,
            ThemeFontSlot::MinorEastAsia => &self.fonts.minor.east_asia,
            ThemeFontSlot::MajorComplex => &self.fonts.major.complex,
            ThemeFontSlot::MinorComplex => &self.fonts.minor.complex,
        };
        (!name.is_empty()).then_some(name.as_str())
    }

    /// The lowest cascade layer for a style family: body text in the minor
    /// fonts, and the usual cell padding for tables.
    pub fn defaults_for(&self, family: StyleFamily) -> PropertySet {
        let mut props = PropertySet::default();
        if family == StyleFamily::Numbering {
            return props;
        }
        props.run.fonts.ascii = Some(FontRef::Theme {
            theme: ThemeFontSlot::MinorLatin,
        });
        props.run.fonts.east_asia = Some(FontRef::Theme {
            theme: ThemeFontSlot::MinorEastAsia,
        });
        props.run.fonts.complex = Some(FontRef::Theme {
            theme: ThemeFontSlot::MinorComplex,
        });
        if family == StyleFamily::Table {
            props.table.cell_margins = EdgeSet {
                left: Some(DEFAULT_CELL_MARGIN),
                right: Some(DEFAULT_CELL_MARGIN),
                ..Default::default()
            };
        }
        props
    }
}
