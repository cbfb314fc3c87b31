//! # Section Geometry
//!
//! Turns raw section properties (twips, possibly absent, possibly garbage)
//! into concrete page templates in points.
//!
//! Absent values inherit from the previous section; the first section falls
//! back to US Letter with one-inch margins. A malformed value is replaced by
//! its fallback and reported, never fatal.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostics, Warning};
use crate::model::{Edges, Rect, Size};

/// Twentieths of a point, the unit section properties are written in.
pub const TWIPS_PER_POINT: f64 = 20.0;

/// Most text columns a section may declare.
pub const MAX_COLUMNS: u32 = 45;

/// Highest page number a section may restart at.
pub const MAX_PAGE_NUMBER_START: u32 = 32_767;

/// A raw numeric value: a number or a string that should hold one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawMeasure {
    Number(f64),
    Text(String),
}

impl RawMeasure {
    fn parse(&self) -> Option<f64> {
        let value = match self {
            RawMeasure::Number(n) => *n,
            RawMeasure::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

impl fmt::Display for RawMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawMeasure::Number(n) => write!(f, "{n}"),
            RawMeasure::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for RawMeasure {
    fn from(value: f64) -> Self {
        RawMeasure::Number(value)
    }
}

/// Header/footer part ids per variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HeaderFooterRefs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub even: Option<String>,
}

impl HeaderFooterRefs {
    fn inherit(&self, previous: &HeaderFooterRefs) -> HeaderFooterRefs {
        HeaderFooterRefs {
            default: self.default.clone().or_else(|| previous.default.clone()),
            first: self.first.clone().or_else(|| previous.first.clone()),
            even: self.even.clone().or_else(|| previous.even.clone()),
        }
    }

    pub fn get(&self, variant: HeaderFooterVariant) -> Option<&str> {
        match variant {
            HeaderFooterVariant::Default => self.default.as_deref(),
            HeaderFooterVariant::First => self.first.as_deref(),
            HeaderFooterVariant::Even => self.even.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderFooterVariant {
    Default,
    First,
    Even,
}

/// Section properties as parsed, all values in twips.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawSection {
    pub page_width: Option<RawMeasure>,
    pub page_height: Option<RawMeasure>,
    pub orientation: Option<String>,
    pub margin_top: Option<RawMeasure>,
    pub margin_right: Option<RawMeasure>,
    pub margin_bottom: Option<RawMeasure>,
    pub margin_left: Option<RawMeasure>,
    pub header_distance: Option<RawMeasure>,
    pub footer_distance: Option<RawMeasure>,
    pub gutter: Option<RawMeasure>,
    pub columns: Option<RawMeasure>,
    pub column_spacing: Option<RawMeasure>,
    pub page_number_start: Option<RawMeasure>,
    pub page_number_format: Option<String>,
    pub start_type: Option<String>,
    pub title_page: Option<bool>,
    pub headers: HeaderFooterRefs,
    pub footers: HeaderFooterRefs,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SectionStart {
    #[default]
    NextPage,
    Continuous,
    EvenPage,
    OddPage,
    NextColumn,
}

impl SectionStart {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "nextPage" => Some(SectionStart::NextPage),
            "continuous" => Some(SectionStart::Continuous),
            "evenPage" => Some(SectionStart::EvenPage),
            "oddPage" => Some(SectionStart::OddPage),
            "nextColumn" => Some(SectionStart::NextColumn),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NumberFormat {
    #[default]
    Decimal,
    LowerRoman,
    UpperRoman,
    LowerLetter,
    UpperLetter,
}

impl NumberFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "decimal" => Some(NumberFormat::Decimal),
            "lowerRoman" => Some(NumberFormat::LowerRoman),
            "upperRoman" => Some(NumberFormat::UpperRoman),
            "lowerLetter" => Some(NumberFormat::LowerLetter),
            "upperLetter" => Some(NumberFormat::UpperLetter),
            _ => None,
        }
    }

    /// Render a page number. Zero, and anything past the highest restart
    /// value, has no roman or letter form and falls back to decimal.
    pub fn format(self, n: u32) -> String {
        if n == 0 || n > MAX_PAGE_NUMBER_START {
            return n.to_string();
        }
        match self {
            NumberFormat::Decimal => n.to_string(),
            NumberFormat::LowerRoman => to_roman(n).to_lowercase(),
            NumberFormat::UpperRoman => to_roman(n),
            NumberFormat::LowerLetter => to_letters(n).to_lowercase(),
            NumberFormat::UpperLetter => to_letters(n),
        }
    }
}

fn to_roman(mut n: u32) -> String {
    const NUMERALS: &[(u32, &str)] = &[
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut out = String::new();
    for &(value, numeral) in NUMERALS {
        while n >= value {
            out.push_str(numeral);
            n -= value;
        }
    }
    out
}

/// A, B, ..., Z, AA, BB, ...: the letter repeats once per pass.
fn to_letters(n: u32) -> String {
    let index = (n - 1) % 26;
    let repeat = (n - 1) / 26 + 1;
    let letter = char::from(b'A' + index as u8);
    std::iter::repeat(letter).take(repeat as usize).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnLayout {
    pub count: u32,
    /// Gap between columns in points.
    pub spacing: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageNumbering {
    /// Restart numbering at this value when the section begins.
    pub start: Option<u32>,
    pub format: NumberFormat,
}

/// A resolved page template, all lengths in points.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub index: usize,
    pub page_size: Size,
    pub orientation: Orientation,
    pub margins: Edges,
    pub header_distance: f64,
    pub footer_distance: f64,
    pub gutter: f64,
    pub columns: ColumnLayout,
    pub numbering: PageNumbering,
    pub start: SectionStart,
    pub title_page: bool,
    pub headers: HeaderFooterRefs,
    pub footers: HeaderFooterRefs,
}

impl Default for Section {
    /// US Letter, portrait, one-inch margins, one column.
    fn default() -> Self {
        Self {
            index: 0,
            page_size: Size {
                width: 612.0,
                height: 792.0,
            },
            orientation: Orientation::Portrait,
            margins: Edges::uniform(72.0),
            header_distance: 36.0,
            footer_distance: 36.0,
            gutter: 0.0,
            columns: ColumnLayout {
                count: 1,
                spacing: 36.0,
            },
            numbering: PageNumbering::default(),
            start: SectionStart::NextPage,
            title_page: false,
            headers: HeaderFooterRefs::default(),
            footers: HeaderFooterRefs::default(),
        }
    }
}

impl Section {
    /// Page rect minus margins (and the gutter, on the binding side).
    pub fn content_box(&self) -> Rect {
        Rect {
            x: self.margins.left + self.gutter,
            y: self.margins.top,
            width: self.page_size.width - self.margins.horizontal() - self.gutter,
            height: self.page_size.height - self.margins.vertical(),
        }
    }

    pub fn has_positive_content_box(&self) -> bool {
        let content = self.content_box();
        content.width > 0.0 && content.height > 0.0
    }

    /// Horizontal extents `(x, width)` of each text column.
    pub fn column_boxes(&self) -> Vec<(f64, f64)> {
        let content = self.content_box();
        let count = self.columns.count.max(1) as usize;
        let mut spacing = self.columns.spacing.max(0.0);
        if count > 1 && spacing * (count - 1) as f64 >= content.width {
            spacing = 0.0;
        }
        let width = (content.width - spacing * (count - 1) as f64) / count as f64;
        (0..count)
            .map(|i| (content.x + i as f64 * (width + spacing), width))
            .collect()
    }

    /// True when a page of this section can continue a page of `other`.
    pub fn same_page_geometry(&self, other: &Section) -> bool {
        self.page_size == other.page_size
            && self.margins == other.margins
            && self.gutter == other.gutter
    }
}

/// Resolve raw sections in document order. Never empty.
pub fn resolve_sections(raw: &[RawSection], diagnostics: &mut Diagnostics) -> Vec<Section> {
    if raw.is_empty() {
        return vec![Section::default()];
    }
    let mut sections: Vec<Section> = Vec::with_capacity(raw.len());
    for (index, raw) in raw.iter().enumerate() {
        let previous = sections.last().cloned().unwrap_or_default();
        let section = resolve_one(index, raw, &previous, diagnostics);
        log::debug!(
            "section {index}: {:.0}x{:.0}pt, {} column(s)",
            section.page_size.width,
            section.page_size.height,
            section.columns.count
        );
        sections.push(section);
    }
    sections
}

struct FieldReader<'a> {
    section: usize,
    diagnostics: &'a mut Diagnostics,
}

impl FieldReader<'_> {
    /// Twips to points, or the fallback (already in points).
    fn length(
        &mut self,
        field: &'static str,
        raw: Option<&RawMeasure>,
        fallback: f64,
        valid: impl Fn(f64) -> bool,
    ) -> f64 {
        let Some(raw) = raw else {
            return fallback;
        };
        match raw.parse().map(|twips| twips / TWIPS_PER_POINT) {
            Some(points) if valid(points) => points,
            _ => {
                self.malformed(field, raw.to_string(), format!("{fallback}pt"));
                fallback
            }
        }
    }

    fn count(
        &mut self,
        field: &'static str,
        raw: Option<&RawMeasure>,
        fallback: u32,
        max: u32,
    ) -> u32 {
        let Some(raw) = raw else {
            return fallback;
        };
        match raw.parse() {
            Some(n) if n >= 1.0 && n.fract() == 0.0 && n <= max as f64 => n as u32,
            _ => {
                self.malformed(field, raw.to_string(), fallback.to_string());
                fallback
            }
        }
    }

    fn keyword<T: Copy + fmt::Debug>(
        &mut self,
        field: &'static str,
        raw: Option<&String>,
        fallback: T,
        parse: impl Fn(&str) -> Option<T>,
    ) -> T {
        let Some(raw) = raw else {
            return fallback;
        };
        parse(raw).unwrap_or_else(|| {
            self.malformed(field, raw.clone(), format!("{fallback:?}"));
            fallback
        })
    }

    fn malformed(&mut self, field: &'static str, value: String, fallback: String) {
        self.diagnostics.warn(Warning::MalformedSection {
            section: self.section,
            field,
            value,
            fallback,
        });
    }
}

fn resolve_one(
    index: usize,
    raw: &RawSection,
    previous: &Section,
    diagnostics: &mut Diagnostics,
) -> Section {
    let mut read = FieldReader {
        section: index,
        diagnostics,
    };
    let positive = |v: f64| v > 0.0;
    let any = |_: f64| true;
    let non_negative = |v: f64| v >= 0.0;

    let mut width = read.length(
        "pageWidth",
        raw.page_width.as_ref(),
        previous.page_size.width,
        positive,
    );
    let mut height = read.length(
        "pageHeight",
        raw.page_height.as_ref(),
        previous.page_size.height,
        positive,
    );
    let implied = if width > height {
        Orientation::Landscape
    } else if width < height {
        Orientation::Portrait
    } else {
        previous.orientation
    };
    let orientation = read.keyword("orientation", raw.orientation.as_ref(), implied, |v| {
        match v {
            "portrait" => Some(Orientation::Portrait),
            "landscape" => Some(Orientation::Landscape),
            _ => None,
        }
    });
    // A stated orientation wins over contradictory dimensions.
    if orientation != implied && width != height {
        std::mem::swap(&mut width, &mut height);
    }

    let margins = Edges {
        top: read.length("marginTop", raw.margin_top.as_ref(), previous.margins.top, any),
        right: read.length(
            "marginRight",
            raw.margin_right.as_ref(),
            previous.margins.right,
            any,
        ),
        bottom: read.length(
            "marginBottom",
            raw.margin_bottom.as_ref(),
            previous.margins.bottom,
            any,
        ),
        left: read.length(
            "marginLeft",
            raw.margin_left.as_ref(),
            previous.margins.left,
            any,
        ),
    };
    let header_distance = read.length(
        "headerDistance",
        raw.header_distance.as_ref(),
        previous.header_distance,
        non_negative,
    );
    let footer_distance = read.length(
        "footerDistance",
        raw.footer_distance.as_ref(),
        previous.footer_distance,
        non_negative,
    );
    let gutter = read.length("gutter", raw.gutter.as_ref(), previous.gutter, non_negative);
    let columns = ColumnLayout {
        count: read.count(
            "columns",
            raw.columns.as_ref(),
            previous.columns.count,
            MAX_COLUMNS,
        ),
        spacing: read.length(
            "columnSpacing",
            raw.column_spacing.as_ref(),
            previous.columns.spacing,
            non_negative,
        ),
    };

    // Numbering restarts only where a section asks for it.
    let start_at = match raw.page_number_start.as_ref() {
        None => None,
        Some(raw) => match raw.parse() {
            Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= MAX_PAGE_NUMBER_START as f64 => {
                Some(n as u32)
            }
            _ => {
                read.malformed("pageNumberStart", raw.to_string(), "continue".to_string());
                None
            }
        },
    };
    let numbering = PageNumbering {
        start: start_at,
        format: read.keyword(
            "pageNumberFormat",
            raw.page_number_format.as_ref(),
            previous.numbering.format,
            NumberFormat::parse,
        ),
    };
    // The start type describes this section's own break, so it is never
    // inherited.
    let start = read.keyword(
        "startType",
        raw.start_type.as_ref(),
        SectionStart::NextPage,
        SectionStart::parse,
    );

    Section {
        index,
        page_size: Size { width, height },
        orientation,
        margins,
        header_distance,
        footer_distance,
        gutter,
        columns,
        numbering,
        start,
        title_page: raw.title_page.unwrap_or(false),
        headers: raw.headers.inherit(&previous.headers),
        footers: raw.footers.inherit(&previous.footers),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn twips(v: f64) -> Option<RawMeasure> {
        Some(RawMeasure::Number(v))
    }

    #[test]
    fn no_sections_yields_one_default() {
        let mut diags = Diagnostics::new();
        let sections = resolve_sections(&[], &mut diags);
        assert_eq!(sections, vec![Section::default()]);
        assert!(diags.is_empty());
    }

    #[test]
    fn absent_fields_inherit_from_previous_section() {
        let a4 = RawSection {
            page_width: twips(11906.0),
            page_height: twips(16838.0),
            margin_left: twips(720.0),
            columns: twips(2.0),
            ..Default::default()
        };
        let next = RawSection {
            margin_top: twips(2880.0),
            ..Default::default()
        };
        let mut diags = Diagnostics::new();
        let sections = resolve_sections(&[a4, next], &mut diags);
        assert_eq!(sections[1].page_size, sections[0].page_size);
        assert!((sections[1].page_size.width - 595.3).abs() < 1e-9);
        assert_eq!(sections[1].margins.left, 36.0);
        assert_eq!(sections[1].margins.top, 144.0);
        assert_eq!(sections[1].columns.count, 2);
        assert!(diags.is_empty());
    }

    #[test]
    fn malformed_values_fall_back_with_a_warning() {
        let raw = RawSection {
            page_width: Some(RawMeasure::Text("wide".to_string())),
            page_height: twips(-5.0),
            columns: twips(0.0),
            margin_top: Some(RawMeasure::Text("1080".to_string())),
            ..Default::default()
        };
        let mut diags = Diagnostics::new();
        let sections = resolve_sections(&[raw], &mut diags);
        assert_eq!(sections[0].page_size.width, 612.0);
        assert_eq!(sections[0].page_size.height, 792.0);
        assert_eq!(sections[0].columns.count, 1);
        assert_eq!(sections[0].margins.top, 54.0);
        assert_eq!(diags.len(), 3);
    }

    #[test]
    fn landscape_swaps_portrait_dimensions() {
        let raw = RawSection {
            orientation: Some("landscape".to_string()),
            ..Default::default()
        };
        let sections = resolve_sections(&[raw], &mut Diagnostics::new());
        assert_eq!(sections[0].page_size.width, 792.0);
        assert_eq!(sections[0].page_size.height, 612.0);
    }

    #[test]
    fn column_boxes_share_the_content_width() {
        let mut section = Section::default();
        section.columns = ColumnLayout {
            count: 2,
            spacing: 36.0,
        };
        let boxes = section.column_boxes();
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0], (72.0, 216.0));
        assert_eq!(boxes[1], (324.0, 216.0));
    }

    #[test]
    fn start_type_is_not_inherited() {
        let first = RawSection {
            start_type: Some("oddPage".to_string()),
            ..Default::default()
        };
        let sections = resolve_sections(&[first, RawSection::default()], &mut Diagnostics::new());
        assert_eq!(sections[0].start, SectionStart::OddPage);
        assert_eq!(sections[1].start, SectionStart::NextPage);
    }

    #[test]
    fn page_number_formats() {
        assert_eq!(NumberFormat::Decimal.format(12), "12");
        assert_eq!(NumberFormat::LowerRoman.format(14), "xiv");
        assert_eq!(NumberFormat::UpperRoman.format(1994), "MCMXCIV");
        assert_eq!(NumberFormat::UpperLetter.format(3), "C");
        assert_eq!(NumberFormat::LowerLetter.format(28), "bb");
        assert_eq!(NumberFormat::UpperRoman.format(u32::MAX), "4294967295");
    }

    #[test]
    fn content_box_subtracts_margins_and_gutter() {
        let mut section = Section::default();
        section.gutter = 18.0;
        let content = section.content_box();
        assert_eq!(content.x, 90.0);
        assert_eq!(content.width, 612.0 - 144.0 - 18.0);
        assert_eq!(content.height, 792.0 - 144.0);
        section.margins.left = 700.0;
        assert!(!section.has_positive_content_box());
    }

    #[test]
    fn stated_dimensions_keep_their_orientation() {
        let wide = RawSection {
            page_width: twips(8000.0),
            page_height: twips(2880.0),
            ..Default::default()
        };
        let sections = resolve_sections(&[wide.clone()], &mut Diagnostics::new());
        assert_eq!(sections[0].page_size.width, 400.0);
        assert_eq!(sections[0].page_size.height, 144.0);
        assert_eq!(sections[0].orientation, Orientation::Landscape);

        let portrait = RawSection {
            orientation: Some("portrait".to_string()),
            ..wide
        };
        let sections = resolve_sections(&[portrait], &mut Diagnostics::new());
        assert_eq!(sections[0].page_size.width, 144.0);
        assert_eq!(sections[0].page_size.height, 400.0);
    }

    #[test]
    fn oversized_column_counts_fall_back() {
        let raw = RawSection {
            columns: twips(u32::MAX as f64),
            ..Default::default()
        };
        let mut diags = Diagnostics::new();
        let sections = resolve_sections(&[raw], &mut diags);
        assert_eq!(sections[0].columns.count, 1);
        assert_eq!(sections[0].column_boxes().len(), 1);
        assert!(matches!(
            diags.iter().next().map(|d| &d.warning),
            Some(Warning::MalformedSection { field: "columns", .. })
        ));

        let widest = RawSection {
            columns: twips(MAX_COLUMNS as f64),
            ..Default::default()
        };
        let sections = resolve_sections(&[widest], &mut Diagnostics::new());
        assert_eq!(sections[0].columns.count, MAX_COLUMNS);
    }

    #[test]
    fn huge_page_number_start_is_malformed() {
        let raw = RawSection {
            page_number_start: twips(u32::MAX as f64),
            ..Default::default()
        };
        let mut diags = Diagnostics::new();
        let sections = resolve_sections(&[raw], &mut diags);
        assert_eq!(sections[0].numbering.start, None);
        assert_eq!(diags.len(), 1);

        let highest = RawSection {
            page_number_start: twips(MAX_PAGE_NUMBER_START as f64),
            ..Default::default()
        };
        let sections = resolve_sections(&[highest], &mut Diagnostics::new());
        assert_eq!(sections[0].numbering.start, Some(MAX_PAGE_NUMBER_START));
    }
}
