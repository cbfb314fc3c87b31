//! # Style System
//!
//! A closed property schema for word-processing formatting, plus the cascade
//! that flattens theme defaults, named-style inheritance and direct
//! formatting into one [`ResolvedStyle`] per element.
//!
//! We don't try to model every formatting attribute a word processor knows.
//! We model the ones that change layout or that renderers need to draw, and
//! keep everything else in an open `extra` map that merges the same way.

pub mod cascade;
pub mod catalog;
pub mod theme;

pub use cascade::{cascade, StyleEngine, StyleRequest, StyleTarget};
pub use catalog::{StyleCatalog, StyleDefinition, StyleFamily};
pub use theme::{FontScheme, Theme, ThemeFontSlot};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Open map for properties outside the closed schema.
pub type PropertyMap = serde_json::Map<String, Value>;

/// Font size used when nothing in the cascade sets one (points).
pub const DEFAULT_FONT_SIZE: f64 = 10.0;
/// Typeface used when nothing in the cascade names one.
pub const DEFAULT_FONT_FAMILY: &str = "Helvetica";
/// Left/right cell padding when neither table nor cell sets one (points).
pub const DEFAULT_CELL_MARGIN: f64 = 5.4;

fn is_default<T: Default + PartialEq>(value: &T) -> bool {
    *value == T::default()
}

/// Key-wise override: scalars replace, nested groups recurse, keys only
/// present in `over` are added. Order matters; chaining is associative.
pub trait Merge {
    fn merge_from(&mut self, over: &Self);

    fn merged(mut self, over: &Self) -> Self
    where
        Self: Sized,
    {
        self.merge_from(over);
        self
    }
}

macro_rules! merge_fields {
    ($ty:ty; scalars: [$($scalar:ident),* $(,)?]; groups: [$($group:ident),* $(,)?]) => {
        impl Merge for $ty {
            fn merge_from(&mut self, over: &Self) {
                $(
                    if over.$scalar.is_some() {
                        self.$scalar = over.$scalar.clone();
                    }
                )*
                $( self.$group.merge_from(&over.$group); )*
            }
        }
    };
}

impl Merge for PropertyMap {
    fn merge_from(&mut self, over: &Self) {
        for (key, value) in over {
            let nested = matches!(
                (self.get(key), value),
                (Some(Value::Object(_)), Value::Object(_))
            );
            if nested {
                if let (Some(Value::Object(base)), Value::Object(inner)) = (self.get_mut(key), value)
                {
                    base.merge_from(inner);
                }
            } else {
                self.insert(key.clone(), value.clone());
            }
        }
    }
}

// ── Schema ──────────────────────────────────────────────────────

/// The complete set of formatting properties one element can carry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PropertySet {
    #[serde(skip_serializing_if = "is_default")]
    pub paragraph: ParagraphProperties,
    #[serde(skip_serializing_if = "is_default")]
    pub run: RunProperties,
    #[serde(skip_serializing_if = "is_default")]
    pub table: TableProperties,
    #[serde(skip_serializing_if = "is_default")]
    pub cell: CellProperties,
    /// Keys outside the schema, deep-merged.
    #[serde(skip_serializing_if = "PropertyMap::is_empty")]
    pub extra: PropertyMap,
}

merge_fields!(PropertySet; scalars: []; groups: [paragraph, run, table, cell, extra]);

impl PropertySet {
    pub fn is_empty(&self) -> bool {
        *self == PropertySet::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParagraphProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alignment: Option<Alignment>,
    #[serde(skip_serializing_if = "is_default")]
    pub spacing: Spacing,
    #[serde(skip_serializing_if = "is_default")]
    pub indentation: Indentation,
    /// Keep this paragraph on the same page as the next one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_next: Option<bool>,
    /// Never split this paragraph across pages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_lines: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_break_before: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub widow_control: Option<bool>,
}

merge_fields!(ParagraphProperties;
    scalars: [alignment, keep_next, keep_lines, page_break_before, widow_control];
    groups: [spacing, indentation]);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Spacing {
    /// Points above the paragraph.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<f64>,
    /// Points below the paragraph.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<LineSpacing>,
}

merge_fields!(Spacing; scalars: [before, after, line]; groups: []);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Indentation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_line: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hanging: Option<f64>,
}

merge_fields!(Indentation; scalars: [left, right, first_line, hanging]; groups: []);

/// Line pitch rule for a paragraph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "value", rename_all = "camelCase")]
pub enum LineSpacing {
    /// Multiple of the font's natural line height.
    Auto(f64),
    /// Exactly this many points, regardless of content.
    Exact(f64),
    /// At least this many points.
    AtLeast(f64),
}

impl Default for LineSpacing {
    fn default() -> Self {
        LineSpacing::Auto(1.0)
    }
}

impl LineSpacing {
    /// Apply the rule to a natural line height.
    pub fn apply(&self, natural: f64) -> f64 {
        match *self {
            LineSpacing::Auto(multiple) => natural * multiple.max(0.0),
            LineSpacing::Exact(points) => points.max(0.0),
            LineSpacing::AtLeast(points) => natural.max(points),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    #[serde(alias = "start")]
    Left,
    Center,
    #[serde(alias = "end")]
    Right,
    #[serde(alias = "both", alias = "distribute")]
    Justify,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FontSlots {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ascii: Option<FontRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub east_asia: Option<FontRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complex: Option<FontRef>,
}

merge_fields!(FontSlots; scalars: [ascii, east_asia, complex]; groups: []);

/// A typeface, either by name or through the theme's font scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FontRef {
    Theme { theme: ThemeFontSlot },
    Named(String),
}

impl FontRef {
    pub fn named(name: &str) -> Self {
        FontRef::Named(name.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunProperties {
    #[serde(skip_serializing_if = "is_default")]
    pub fonts: FontSlots,
    /// Font size in points.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strike: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<ColorValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight: Option<ColorValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertical_align: Option<VerticalAlign>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caps: Option<bool>,
    /// Extra space after each character, in points.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub letter_spacing: Option<f64>,
}

merge_fields!(RunProperties;
    scalars: [size, bold, italic, underline, strike, color, highlight, vertical_align, caps, letter_spacing];
    groups: [fonts]);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VerticalAlign {
    #[default]
    Baseline,
    Superscript,
    Subscript,
}

/// Per-side optional lengths (points).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EdgeSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<f64>,
}

merge_fields!(EdgeSet; scalars: [top, right, bottom, left]; groups: []);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TableProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<TableWidth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alignment: Option<Alignment>,
    /// Offset of the table from the leading content edge (points).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indent: Option<f64>,
    /// Default padding for every cell of the table.
    #[serde(skip_serializing_if = "is_default")]
    pub cell_margins: EdgeSet,
}

merge_fields!(TableProperties; scalars: [width, alignment, indent]; groups: [cell_margins]);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TableWidth {
    Auto,
    Points(f64),
    /// Percentage (0-100) of the available width.
    Percent(f64),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CellProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shading: Option<ColorValue>,
    #[serde(skip_serializing_if = "is_default")]
    pub margins: EdgeSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertical_align: Option<CellVerticalAlign>,
}

merge_fields!(CellProperties; scalars: [shading, vertical_align]; groups: [margins]);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellVerticalAlign {
    #[default]
    Top,
    Center,
    Bottom,
}

// ── Colors ──────────────────────────────────────────────────────

/// A color as written in the document: a hex string (or `auto`), or a
/// slot in the theme's color scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorValue {
    Theme { theme: String },
    Hex(String),
}

impl ColorValue {
    pub fn hex(hex: &str) -> Self {
        ColorValue::Hex(hex.to_string())
    }

    pub fn theme(slot: &str) -> Self {
        ColorValue::Theme {
            theme: slot.to_string(),
        }
    }

    /// `auto` leaves the choice to the renderer.
    pub fn is_auto(&self) -> bool {
        matches!(self, ColorValue::Hex(h) if h.eq_ignore_ascii_case("auto"))
    }

    /// Concrete color, if this is a (non-auto) hex value.
    pub fn to_color(&self) -> Option<Color> {
        match self {
            ColorValue::Hex(h) if !self.is_auto() => Color::parse_hex(h),
            _ => None,
        }
    }
}

/// An RGB color with channels in 0.0 - 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    /// Parse `#rgb`, `rgb`, `#rrggbb` or `rrggbb`.
    pub fn parse_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim_start_matches('#').as_bytes();
        if !hex.iter().all(u8::is_ascii_hexdigit) {
            return None;
        }
        let digit = |i: usize| (hex[i] as char).to_digit(16).map(|d| d as u8);
        let (r, g, b) = match hex.len() {
            3 => (digit(0)? * 17, digit(1)? * 17, digit(2)? * 17),
            6 => (
                digit(0)? * 16 + digit(1)?,
                digit(2)? * 16 + digit(3)?,
                digit(4)? * 16 + digit(5)?,
            ),
            _ => return None,
        };
        Some(Self {
            r: r as f64 / 255.0,
            g: g as f64 / 255.0,
            b: b as f64 / 255.0,
        })
    }
}

// ── Resolved ────────────────────────────────────────────────────

/// The flattened result of the cascade for one element.
///
/// Theme references have already been substituted, so renderers read the
/// values directly; no further cascade is needed downstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResolvedStyle {
    properties: PropertySet,
}

impl ResolvedStyle {
    /// Flatten `properties`, replacing theme colors and fonts with the
    /// concrete values from `theme`.
    pub fn from_properties(mut properties: PropertySet, theme: &Theme) -> Self {
        let run = &mut properties.run;
        for slot in [
            &mut run.fonts.ascii,
            &mut run.fonts.east_asia,
            &mut run.fonts.complex,
        ] {
            if let Some(FontRef::Theme { theme: font_slot }) = slot {
                *slot = theme.font(*font_slot).map(FontRef::named);
            }
        }
        for color in [
            &mut run.color,
            &mut run.highlight,
            &mut properties.cell.shading,
        ] {
            if let Some(ColorValue::Theme { theme: name }) = color {
                *color = theme.color(name).map(ColorValue::hex);
            }
        }
        Self { properties }
    }

    pub fn properties(&self) -> &PropertySet {
        &self.properties
    }

    pub fn font_size(&self) -> f64 {
        self.properties
            .run
            .size
            .filter(|s| *s > 0.0)
            .unwrap_or(DEFAULT_FONT_SIZE)
    }

    pub fn font_family(&self) -> &str {
        match &self.properties.run.fonts.ascii {
            Some(FontRef::Named(name)) => name,
            _ => DEFAULT_FONT_FAMILY,
        }
    }

    pub fn bold(&self) -> bool {
        self.properties.run.bold.unwrap_or(false)
    }

    pub fn italic(&self) -> bool {
        self.properties.run.italic.unwrap_or(false)
    }

    pub fn caps(&self) -> bool {
        self.properties.run.caps.unwrap_or(false)
    }

    pub fn letter_spacing(&self) -> f64 {
        self.properties.run.letter_spacing.unwrap_or(0.0)
    }

    pub fn vertical_align(&self) -> VerticalAlign {
        self.properties.run.vertical_align.unwrap_or_default()
    }

    pub fn color(&self) -> Option<Color> {
        self.properties.run.color.as_ref().and_then(|c| c.to_color())
    }

    pub fn alignment(&self) -> Alignment {
        self.properties.paragraph.alignment.unwrap_or_default()
    }

    pub fn space_before(&self) -> f64 {
        self.properties.paragraph.spacing.before.unwrap_or(0.0).max(0.0)
    }

    pub fn space_after(&self) -> f64 {
        self.properties.paragraph.spacing.after.unwrap_or(0.0).max(0.0)
    }

    pub fn line_spacing(&self) -> LineSpacing {
        self.properties.paragraph.spacing.line.unwrap_or_default()
    }

    pub fn indent_left(&self) -> f64 {
        self.properties.paragraph.indentation.left.unwrap_or(0.0)
    }

    pub fn indent_right(&self) -> f64 {
        self.properties.paragraph.indentation.right.unwrap_or(0.0)
    }

    /// First-line offset relative to `indent_left`; negative when hanging.
    pub fn first_line_offset(&self) -> f64 {
        let indentation = &self.properties.paragraph.indentation;
        match indentation.hanging {
            Some(hanging) => -hanging,
            None => indentation.first_line.unwrap_or(0.0),
        }
    }

    pub fn keep_lines(&self) -> bool {
        self.properties.paragraph.keep_lines.unwrap_or(false)
    }

    pub fn keep_next(&self) -> bool {
        self.properties.paragraph.keep_next.unwrap_or(false)
    }

    pub fn page_break_before(&self) -> bool {
        self.properties.paragraph.page_break_before.unwrap_or(false)
    }

    pub fn widow_control(&self) -> bool {
        self.properties.paragraph.widow_control.unwrap_or(true)
    }

    pub fn table_width(&self) -> TableWidth {
        self.properties.table.width.unwrap_or(TableWidth::Auto)
    }

    pub fn table_alignment(&self) -> Alignment {
        self.properties.table.alignment.unwrap_or_default()
    }

    pub fn table_indent(&self) -> f64 {
        self.properties.table.indent.unwrap_or(0.0)
    }

    /// Cell padding: the cell's own margins, then the table defaults.
    pub fn cell_margins(&self) -> crate::model::Edges {
        let cell = &self.properties.cell.margins;
        let table = &self.properties.table.cell_margins;
        crate::model::Edges {
            top: cell.top.or(table.top).unwrap_or(0.0),
            right: cell.right.or(table.right).unwrap_or(DEFAULT_CELL_MARGIN),
            bottom: cell.bottom.or(table.bottom).unwrap_or(0.0),
            left: cell.left.or(table.left).unwrap_or(DEFAULT_CELL_MARGIN),
        }
    }

    pub fn cell_vertical_align(&self) -> CellVerticalAlign {
        self.properties.cell.vertical_align.unwrap_or_default()
    }

    pub fn shading(&self) -> Option<Color> {
        self.properties
            .cell
            .shading
            .as_ref()
            .and_then(|c| c.to_color())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run_size(size: f64) -> PropertySet {
        PropertySet {
            run: RunProperties {
                size: Some(size),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn scalar_keys_replace() {
        let merged = run_size(10.0).merged(&run_size(14.0));
        assert_eq!(merged.run.size, Some(14.0));
    }

    #[test]
    fn absent_keys_keep_the_base() {
        let mut base = run_size(10.0);
        base.run.bold = Some(true);
        let merged = base.merged(&run_size(12.0));
        assert_eq!(merged.run.bold, Some(true));
        assert_eq!(merged.run.size, Some(12.0));
    }

    #[test]
    fn nested_groups_recurse() {
        let mut base = PropertySet::default();
        base.paragraph.spacing.before = Some(6.0);
        let mut over = PropertySet::default();
        over.paragraph.spacing.after = Some(12.0);
        let merged = base.merged(&over);
        assert_eq!(merged.paragraph.spacing.before, Some(6.0));
        assert_eq!(merged.paragraph.spacing.after, Some(12.0));
    }

    #[test]
    fn extra_map_deep_merges() {
        let mut base = PropertySet::default();
        base.extra = json!({"border": {"top": 1, "bottom": 1}, "kern": 8})
            .as_object()
            .cloned()
            .unwrap();
        let mut over = PropertySet::default();
        over.extra = json!({"border": {"top": 3}, "lang": "en-US"})
            .as_object()
            .cloned()
            .unwrap();
        let merged = base.merged(&over);
        assert_eq!(
            Value::Object(merged.extra),
            json!({"border": {"top": 3, "bottom": 1}, "kern": 8, "lang": "en-US"})
        );
    }

    #[test]
    fn order_matters() {
        let a = run_size(8.0);
        let b = run_size(16.0);
        assert_ne!(
            a.clone().merged(&b).run.size,
            b.merged(&a).run.size
        );
    }

    #[test]
    fn hex_color_parsing() {
        let c = Color::parse_hex("#FF8000").unwrap();
        assert!((c.r - 1.0).abs() < 1e-9);
        assert!((c.g - 128.0 / 255.0).abs() < 1e-9);
        assert_eq!(c.b, 0.0);
        assert_eq!(Color::parse_hex("fff").map(|c| c.g), Some(1.0));
        assert!(Color::parse_hex("nope").is_none());
        assert!(Color::parse_hex("#éa").is_none());
        assert!(Color::parse_hex("é").is_none());
        assert!(Color::parse_hex("#ab").is_none());
        assert!(Color::parse_hex("+fffff").is_none());
        assert_eq!(Color::parse_hex("#0f0").map(|c| c.g), Some(1.0));
        assert!(ColorValue::hex("auto").to_color().is_none());
    }

    #[test]
    fn line_spacing_rules() {
        assert_eq!(LineSpacing::Auto(1.5).apply(10.0), 15.0);
        assert_eq!(LineSpacing::Exact(20.0).apply(10.0), 20.0);
        assert_eq!(LineSpacing::AtLeast(8.0).apply(10.0), 10.0);
    }

    #[test]
    fn property_set_json_shape() {
        let props: PropertySet = serde_json::from_value(json!({
            "paragraph": {"alignment": "both", "spacing": {"line": {"rule": "auto", "value": 1.15}}},
            "run": {"fonts": {"ascii": {"theme": "minorLatin"}}, "color": {"theme": "accent1"}, "size": 11},
            "table": {"width": {"percent": 100.0}}
        }))
        .unwrap();
        assert_eq!(props.paragraph.alignment, Some(Alignment::Justify));
        assert_eq!(
            props.run.fonts.ascii,
            Some(FontRef::Theme {
                theme: ThemeFontSlot::MinorLatin
            })
        );
        assert_eq!(props.run.color, Some(ColorValue::theme("accent1")));
        assert_eq!(props.table.width, Some(TableWidth::Percent(100.0)));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn props_strategy() -> impl Strategy<Value = PropertySet> {
            (
                proptest::option::of(4.0f64..72.0),
                proptest::option::of(any::<bool>()),
                proptest::option::of(0.0f64..24.0),
                proptest::option::of(0.0f64..24.0),
                proptest::option::of(prop_oneof![
                    Just(Alignment::Left),
                    Just(Alignment::Center),
                    Just(Alignment::Justify)
                ]),
            )
                .prop_map(|(size, bold, before, after, alignment)| {
                    let mut p = PropertySet::default();
                    p.run.size = size;
                    p.run.bold = bold;
                    p.paragraph.spacing.before = before;
                    p.paragraph.spacing.after = after;
                    p.paragraph.alignment = alignment;
                    p
                })
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            #[test]
            fn merge_is_associative(a in props_strategy(), b in props_strategy(), c in props_strategy()) {
                let left = a.clone().merged(&b).merged(&c);
                let right = a.merged(&b.merged(&c));
                prop_assert_eq!(left, right);
            }

            #[test]
            fn empty_override_is_identity(a in props_strategy()) {
                prop_assert_eq!(a.clone().merged(&PropertySet::default()), a);
            }
        }
    }
}
