//! # Font Metrics
//!
//! Glyph advances and vertical metrics for line breaking. Layout talks to
//! the [`FontMetrics`] trait only; [`FontBook`] is the implementation that
//! ships with the crate.
//!
//! Faces registered with real font data are measured with `ttf-parser`.
//! Everything else gets a proportional approximation shaped like a generic
//! sans-serif, so a document with no fonts registered still lays out
//! plausibly (and deterministically).

use std::collections::HashMap;

/// A face at a size. Family names are matched case-insensitively.
#[derive(Debug, Clone, PartialEq)]
pub struct FontFace {
    pub family: String,
    pub size: f64,
    pub bold: bool,
    pub italic: bool,
}

impl FontFace {
    pub fn new(family: &str, size: f64) -> Self {
        Self {
            family: family.to_string(),
            size,
            bold: false,
            italic: false,
        }
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            size: self.size * factor,
            ..self.clone()
        }
    }
}

/// What line breaking needs to know about a face.
pub trait FontMetrics: Send + Sync {
    /// Advance width of one character in points.
    fn advance(&self, face: &FontFace, ch: char) -> f64;

    /// Distance from baseline to the top of the line box.
    fn ascent(&self, face: &FontFace) -> f64;

    /// Natural line height (ascent + descent + line gap).
    fn line_height(&self, face: &FontFace) -> f64;

    fn measure(&self, face: &FontFace, text: &str, letter_spacing: f64) -> f64 {
        text.chars()
            .map(|ch| self.advance(face, ch) + letter_spacing)
            .sum()
    }
}

// Approximate sans-serif metrics, in em units.
const FALLBACK_ASCENT: f64 = 0.905;
const FALLBACK_DESCENT: f64 = 0.212;
const FALLBACK_LINE_GAP: f64 = 0.033;
const BOLD_WIDTH_FACTOR: f64 = 1.06;

fn fallback_advance_em(ch: char) -> f64 {
    match ch {
        ' ' | '\u{00A0}' => 0.278,
        'i' | 'j' | 'l' | '!' | '|' | '\'' | '.' | ',' | ':' | ';' => 0.24,
        'f' | 't' | 'r' | 'I' | '(' | ')' | '[' | ']' | '-' => 0.333,
        'm' | 'w' => 0.833,
        'M' | 'W' | '@' => 0.9,
        '0'..='9' => 0.556,
        'A'..='Z' => 0.667,
        'a'..='z' => 0.53,
        '\u{2E80}'..='\u{9FFF}' | '\u{AC00}'..='\u{D7AF}' | '\u{FF00}'..='\u{FFEF}' => 1.0,
        c if c.is_control() => 0.0,
        _ => 0.6,
    }
}

/// Metrics parsed from a TrueType/OpenType face.
#[derive(Debug, Clone)]
pub struct FaceMetrics {
    pub units_per_em: u16,
    pub advance_widths: HashMap<char, u16>,
    pub default_advance: u16,
    pub ascender: i16,
    pub descender: i16,
    pub line_gap: i16,
}

impl FaceMetrics {
    /// Parse the horizontal metrics of face 0 in `data`.
    pub fn from_font_data(data: &[u8]) -> Option<Self> {
        let face = ttf_parser::Face::parse(data, 0).ok()?;
        let units_per_em = face.units_per_em();

        let mut advance_widths = HashMap::new();
        let mut default_advance = 0u16;
        for code in 32u32..=0xFFFF {
            let Some(ch) = char::from_u32(code) else {
                continue;
            };
            if let Some(glyph) = face.glyph_index(ch) {
                let advance = face.glyph_hor_advance(glyph).unwrap_or(0);
                advance_widths.insert(ch, advance);
                if ch == ' ' {
                    default_advance = advance;
                }
            }
        }
        if default_advance == 0 {
            default_advance = units_per_em / 2;
        }

        Some(FaceMetrics {
            units_per_em,
            advance_widths,
            default_advance,
            ascender: face.ascender(),
            descender: face.descender(),
            line_gap: face.line_gap(),
        })
    }

    fn scale(&self, units: f64, size: f64) -> f64 {
        units / self.units_per_em.max(1) as f64 * size
    }

    pub fn char_width(&self, ch: char, size: f64) -> f64 {
        let units = self
            .advance_widths
            .get(&ch)
            .copied()
            .unwrap_or(self.default_advance);
        self.scale(units as f64, size)
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct FaceKey {
    family: String,
    bold: bool,
    italic: bool,
}

impl FaceKey {
    fn new(family: &str, bold: bool, italic: bool) -> Self {
        Self {
            family: family.to_lowercase(),
            bold,
            italic,
        }
    }
}

/// Registered faces plus the built-in approximation.
#[derive(Debug, Clone, Default)]
pub struct FontBook {
    faces: HashMap<FaceKey, FaceMetrics>,
}

impl FontBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a face from font file bytes. Returns `false` (and keeps
    /// using the approximation) when the data does not parse.
    pub fn register(&mut self, family: &str, bold: bool, italic: bool, data: &[u8]) -> bool {
        match FaceMetrics::from_font_data(data) {
            Some(metrics) => {
                self.faces
                    .insert(FaceKey::new(family, bold, italic), metrics);
                true
            }
            None => {
                log::warn!("font data for `{family}` did not parse; using approximate metrics");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Exact style first, then the family's regular face.
    fn lookup(&self, face: &FontFace) -> Option<&FaceMetrics> {
        self.faces
            .get(&FaceKey::new(&face.family, face.bold, face.italic))
            .or_else(|| self.faces.get(&FaceKey::new(&face.family, false, false)))
    }
}

impl FontMetrics for FontBook {
    fn advance(&self, face: &FontFace, ch: char) -> f64 {
        match self.lookup(face) {
            Some(metrics) => metrics.char_width(ch, face.size),
            None => {
                let em = fallback_advance_em(ch) * face.size;
                if face.bold {
                    em * BOLD_WIDTH_FACTOR
                } else {
                    em
                }
            }
        }
    }

    fn ascent(&self, face: &FontFace) -> f64 {
        match self.lookup(face) {
            Some(m) => m.scale(m.ascender as f64, face.size),
            None => FALLBACK_ASCENT * face.size,
        }
    }

    fn line_height(&self, face: &FontFace) -> f64 {
        match self.lookup(face) {
            Some(m) => m.scale(
                m.ascender as f64 - m.descender as f64 + m.line_gap as f64,
                face.size,
            ),
            None => (FALLBACK_ASCENT + FALLBACK_DESCENT + FALLBACK_LINE_GAP) * face.size,
        }
    }
}
