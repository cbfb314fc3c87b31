//! # Text Layout
//!
//! Greedy line breaking over styled characters.
//!
//! Break opportunities come from UAX#14 (`unicode-linebreak`). The text is
//! cut into segments at those opportunities and segments are packed onto
//! lines left to right. Trailing spaces hang past the right edge, a segment
//! wider than an empty line is broken between characters, and mandatory
//! breaks always end the line.

use unicode_linebreak::{linebreaks, BreakOpportunity};

use crate::font::{FontFace, FontMetrics};
use crate::model::{FieldKind, NoteKind};
use crate::style::{ResolvedStyle, VerticalAlign};

/// Superscript and subscript glyphs shrink to this fraction of the size.
const SCRIPT_SCALE: f64 = 2.0 / 3.0;
/// Smallest advance a tab may have before it jumps to the following stop.
const MIN_TAB_ADVANCE: f64 = 1.0;

/// Text measurement properties of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunFace {
    pub face: FontFace,
    pub letter_spacing: f64,
    pub vertical_align: VerticalAlign,
}

impl RunFace {
    pub fn from_style(style: &ResolvedStyle) -> Self {
        Self {
            face: FontFace {
                family: style.font_family().to_string(),
                size: style.font_size(),
                bold: style.bold(),
                italic: style.italic(),
            },
            letter_spacing: style.letter_spacing(),
            vertical_align: style.vertical_align(),
        }
    }

    /// The face glyphs are actually measured with.
    fn glyph_face(&self) -> FontFace {
        match self.vertical_align {
            VerticalAlign::Baseline => self.face.clone(),
            _ => self.face.scaled(SCRIPT_SCALE),
        }
    }
}

/// Where a character came from.
#[derive(Debug, Clone, PartialEq)]
pub enum InlineKind {
    Text,
    Tab,
    /// Digits of a note reference ordinal.
    NoteRef { kind: NoteKind, id: String },
    /// Placeholder digits of a field, replaced when the page is known.
    Field(FieldKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StyledChar {
    pub ch: char,
    /// Index into the paragraph's run faces.
    pub run: usize,
    pub kind: InlineKind,
}

impl StyledChar {
    pub fn text(ch: char, run: usize) -> Self {
        Self {
            ch,
            run,
            kind: InlineKind::Text,
        }
    }
}

/// A stretch of one line sharing a run and an inline kind.
#[derive(Debug, Clone, PartialEq)]
pub struct LineFragment {
    pub run: usize,
    pub kind: InlineKind,
    pub text: String,
    /// Offset from the line start.
    pub x: f64,
    pub width: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub fragments: Vec<LineFragment>,
    /// Width without hanging trailing spaces.
    pub width: f64,
    pub ascent: f64,
    /// Natural height before line spacing is applied.
    pub height: f64,
    /// Notes referenced on this line, in order.
    pub notes: Vec<(NoteKind, String)>,
    pub hard_break: bool,
}

fn is_newline(ch: char) -> bool {
    matches!(ch, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

/// UAX#14 opportunity *before* each char index; index 0 is always `None`.
fn break_opportunities(text: &str) -> Vec<Option<BreakOpportunity>> {
    let char_count = text.chars().count();
    let mut result = vec![None; char_count];
    let mut byte_to_char = vec![0usize; text.len() + 1];
    for (char_idx, (byte_idx, _)) in text.char_indices().enumerate() {
        byte_to_char[byte_idx] = char_idx;
    }
    byte_to_char[text.len()] = char_count;
    for (byte_offset, opportunity) in linebreaks(text) {
        let char_idx = byte_to_char[byte_offset];
        if char_idx < char_count {
            result[char_idx] = Some(opportunity);
        }
    }
    result
}

pub struct TextLayout<'f> {
    fonts: &'f dyn FontMetrics,
    tab_stop: f64,
}

struct LineBuilder<'a> {
    faces: &'a [RunFace],
    mark: &'a RunFace,
    fonts: &'a dyn FontMetrics,
    fragments: Vec<LineFragment>,
    notes: Vec<(NoteKind, String)>,
    x: f64,
}

impl<'a> LineBuilder<'a> {
    fn face(&self, run: usize) -> &'a RunFace {
        self.faces.get(run).unwrap_or(self.mark)
    }

    fn push(&mut self, sc: &StyledChar, width: f64) {
        if let InlineKind::NoteRef { kind, id } = &sc.kind {
            let starts_ref = !matches!(
                self.fragments.last(),
                Some(f) if f.run == sc.run && f.kind == sc.kind
            );
            if starts_ref {
                self.notes.push((*kind, id.clone()));
            }
        }
        match self.fragments.last_mut() {
            Some(f) if f.run == sc.run && f.kind == sc.kind && sc.kind != InlineKind::Tab => {
                f.text.push(sc.ch);
                f.width += width;
            }
            _ => self.fragments.push(LineFragment {
                run: sc.run,
                kind: sc.kind.clone(),
                text: sc.ch.to_string(),
                x: self.x,
                width,
            }),
        }
        self.x += width;
    }

    fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    fn finish(&mut self, hard_break: bool) -> TextLine {
        let fragments = std::mem::take(&mut self.fragments);
        let notes = std::mem::take(&mut self.notes);
        self.x = 0.0;

        let mut width = 0.0;
        for f in &fragments {
            let trimmed = if f.kind == InlineKind::Text {
                f.text.trim_end_matches(' ')
            } else {
                f.text.as_str()
            };
            if !trimmed.is_empty() {
                let hanging = f.text.len() - trimmed.len();
                let space = self
                    .fonts
                    .advance(&self.face(f.run).glyph_face(), ' ')
                    + self.face(f.run).letter_spacing;
                width = f.x + f.width - hanging as f64 * space;
            }
        }

        let mut runs: Vec<usize> = fragments.iter().map(|f| f.run).collect();
        runs.dedup();
        let (ascent, height) = if runs.is_empty() {
            (
                self.fonts.ascent(&self.mark.face),
                self.fonts.line_height(&self.mark.face),
            )
        } else {
            runs.iter().fold((0.0f64, 0.0f64), |(a, h), run| {
                let face = &self.face(*run).face;
                (
                    a.max(self.fonts.ascent(face)),
                    h.max(self.fonts.line_height(face)),
                )
            })
        };

        TextLine {
            fragments,
            width: width.max(0.0),
            ascent,
            height,
            notes,
            hard_break,
        }
    }
}

impl<'f> TextLayout<'f> {
    pub fn new(fonts: &'f dyn FontMetrics, tab_stop: f64) -> Self {
        Self {
            fonts,
            tab_stop: if tab_stop > 0.0 { tab_stop } else { 36.0 },
        }
    }

    fn char_width(&self, faces: &[RunFace], mark: &RunFace, sc: &StyledChar, x: f64) -> f64 {
        if sc.kind == InlineKind::Tab {
            let mut stop = ((x / self.tab_stop).floor() + 1.0) * self.tab_stop;
            if stop - x < MIN_TAB_ADVANCE {
                stop += self.tab_stop;
            }
            return stop - x;
        }
        if is_newline(sc.ch) {
            return 0.0;
        }
        let face = faces.get(sc.run).unwrap_or(mark);
        self.fonts.advance(&face.glyph_face(), sc.ch) + face.letter_spacing
    }

    /// Break `chars` into lines. The first line is `first_width` wide, the
    /// rest `width`. `mark` sizes empty lines (the paragraph mark's face).
    pub fn break_into_lines(
        &self,
        chars: &[StyledChar],
        faces: &[RunFace],
        mark: &RunFace,
        first_width: f64,
        width: f64,
    ) -> Vec<TextLine> {
        let mut builder = LineBuilder {
            faces,
            mark,
            fonts: self.fonts,
            fragments: Vec::new(),
            notes: Vec::new(),
            x: 0.0,
        };
        if chars.is_empty() {
            return vec![builder.finish(false)];
        }

        let plain: String = chars.iter().map(|sc| sc.ch).collect();
        let opportunities = break_opportunities(&plain);

        // Segment boundaries: (end index, ends with a mandatory break).
        let mut segments = Vec::new();
        let mut start = 0;
        for (i, opportunity) in opportunities.iter().enumerate().skip(1) {
            if let Some(op) = opportunity {
                segments.push((start, i, *op == BreakOpportunity::Mandatory));
                start = i;
            }
        }
        segments.push((start, chars.len(), false));

        let mut lines = Vec::new();
        let available = |lines: &Vec<TextLine>| {
            if lines.is_empty() {
                first_width
            } else {
                width
            }
        };

        for (start, end, mandatory) in segments {
            let segment = &chars[start..end];
            let fits = self.segment_fits(segment, faces, mark, builder.x, available(&lines));
            if !fits && !builder.is_empty() {
                lines.push(builder.finish(false));
            }
            let fits = self.segment_fits(segment, faces, mark, builder.x, available(&lines));
            if fits {
                for sc in segment.iter().filter(|sc| !is_newline(sc.ch)) {
                    let w = self.char_width(faces, mark, sc, builder.x);
                    builder.push(sc, w);
                }
            } else {
                // Wider than an empty line: break between characters.
                for sc in segment.iter().filter(|sc| !is_newline(sc.ch)) {
                    let w = self.char_width(faces, mark, sc, builder.x);
                    let is_space = sc.ch == ' ';
                    if !builder.is_empty() && !is_space && builder.x + w > available(&lines) {
                        lines.push(builder.finish(false));
                    }
                    let w = self.char_width(faces, mark, sc, builder.x);
                    builder.push(sc, w);
                }
            }
            if mandatory {
                lines.push(builder.finish(true));
            }
        }
        if !builder.is_empty() || lines.last().map_or(true, |l| l.hard_break) {
            lines.push(builder.finish(false));
        }
        lines
    }

    /// Does the segment fit at `x`, ignoring trailing spaces and newlines?
    fn segment_fits(
        &self,
        segment: &[StyledChar],
        faces: &[RunFace],
        mark: &RunFace,
        x: f64,
        available: f64,
    ) -> bool {
        let mut cursor = x;
        let mut visible_end = x;
        for sc in segment {
            cursor += self.char_width(faces, mark, sc, cursor);
            if sc.ch != ' ' && !is_newline(sc.ch) {
                visible_end = cursor;
            }
        }
        visible_end <= available + 1e-9
    }
}
