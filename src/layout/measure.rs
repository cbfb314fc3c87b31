//! Measurement: elements in, sized pieces out.
//!
//! Everything measured here is laid out relative to a region origin at
//! `(0, 0)`; the flow engine decides where that origin lands on a page and
//! translates. Results are cached per `(element, width)`, so measuring the
//! same paragraph again after it moves to the next page is free and hands
//! out the same note ordinals.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;

use crate::assets::MediaStore;
use crate::diagnostics::{Diagnostics, Warning};
use crate::font::FontMetrics;
use crate::model::{
    Container, Document, ElementId, ElementKind, Image, NoteKind, Rect, RunContent, Size,
};
use crate::options::LayoutOptions;
use crate::style::{Alignment, CellVerticalAlign, ResolvedStyle, StyleEngine, VerticalAlign};
use crate::text::{InlineKind, LineFragment, RunFace, StyledChar, TextLayout};

use super::grid::{self, MergeRole, TableGrid};
use super::notes::NoteRegistry;
use super::{
    BlockKind, CellBox, FragmentKind, ImageContent, LayoutBlock, LayoutContent, LayoutFragment,
    LayoutLine, LayoutRow, ParagraphContent, TableContent,
};

/// Width a field placeholder reserves until its value is known.
const FIELD_PLACEHOLDER: &str = "00";

#[derive(Debug, Clone)]
pub struct MeasuredLine {
    pub fragments: Vec<LineFragment>,
    /// Line start, from the region's left edge.
    pub x: f64,
    /// Width the line was broken against.
    pub available: f64,
    pub ascent: f64,
    /// Height before line spacing.
    pub natural: f64,
    pub height: f64,
    pub word_spacing: f64,
    pub notes: Vec<(NoteKind, String)>,
}

#[derive(Debug)]
pub struct MeasuredParagraph {
    pub id: ElementId,
    pub width: f64,
    pub style: Arc<ResolvedStyle>,
    pub run_styles: Vec<Arc<ResolvedStyle>>,
    pub lines: Vec<MeasuredLine>,
    pub space_before: f64,
    pub space_after: f64,
}

impl MeasuredParagraph {
    /// Heights of lines `from..`, paragraph spacing folded into the first
    /// and last line of the whole paragraph.
    pub fn line_heights(&self, from: usize) -> Vec<f64> {
        let last = self.lines.len().saturating_sub(1);
        self.lines
            .iter()
            .enumerate()
            .skip(from)
            .map(|(i, line)| {
                let mut height = line.height;
                if i == 0 {
                    height += self.space_before;
                }
                if i == last {
                    height += self.space_after;
                }
                height
            })
            .collect()
    }

    pub fn height(&self) -> f64 {
        self.line_heights(0).iter().sum()
    }

    pub fn notes(&self, lines: Range<usize>) -> Vec<(NoteKind, String)> {
        self.lines[lines]
            .iter()
            .flat_map(|l| l.notes.iter().cloned())
            .collect()
    }

    /// A block holding `lines`, its top-left corner at `(x, y)`.
    pub fn block(&self, lines: Range<usize>, x: f64, y: f64) -> LayoutBlock {
        let mut cursor = y;
        if lines.start == 0 {
            cursor += self.space_before;
        }
        let mut out = Vec::with_capacity(lines.len());
        for line in &self.lines[lines.clone()] {
            let frame = Rect {
                x: x + line.x,
                y: cursor,
                width: line.available,
                height: line.height,
            };
            let baseline = if line.height >= line.natural {
                cursor + line.height - line.natural + line.ascent
            } else {
                cursor + line.ascent * line.height / line.natural
            };
            let fragments = line
                .fragments
                .iter()
                .map(|f| LayoutFragment {
                    run: f.run,
                    x: frame.x + f.x,
                    width: f.width,
                    text: f.text.clone(),
                    kind: fragment_kind(&f.kind, &f.text),
                })
                .collect();
            out.push(LayoutLine {
                frame,
                baseline,
                word_spacing: line.word_spacing,
                fragments,
            });
            cursor += line.height;
        }
        if lines.end >= self.lines.len() {
            cursor += self.space_after;
        }
        LayoutBlock {
            frame: Rect {
                x,
                y,
                width: self.width,
                height: cursor - y,
            },
            kind: BlockKind::Paragraph,
            element: Some(self.id),
            continued: lines.start > 0,
            style: (*self.style).clone(),
            content: LayoutContent::Paragraph(ParagraphContent {
                lines: out,
                run_styles: self.run_styles.iter().map(|s| (**s).clone()).collect(),
                first_line: lines.start,
            }),
        }
    }
}

fn fragment_kind(kind: &InlineKind, text: &str) -> FragmentKind {
    match kind {
        InlineKind::Text => FragmentKind::Text,
        InlineKind::Tab => FragmentKind::Tab,
        InlineKind::NoteRef { kind, id } => FragmentKind::NoteReference {
            note: *kind,
            id: id.clone(),
            ordinal: text.parse().unwrap_or(0),
        },
        InlineKind::Field(field) => FragmentKind::Field { field: *field },
    }
}

/// Spaces between words on a line, trailing ones excluded.
fn inner_spaces(fragments: &[LineFragment]) -> usize {
    let text: String = fragments.iter().map(|f| f.text.as_str()).collect();
    text.trim_end_matches(' ').matches(' ').count()
}

#[derive(Debug, Clone)]
pub struct MeasuredImage {
    pub id: ElementId,
    pub style: Arc<ResolvedStyle>,
    pub size: Size,
    pub media_id: String,
    pub alt: Option<String>,
    pub placeholder: bool,
}

impl MeasuredImage {
    pub fn block(&self, x: f64, y: f64, region_width: f64) -> LayoutBlock {
        let free = (region_width - self.size.width).max(0.0);
        let dx = match self.style.alignment() {
            Alignment::Center => free / 2.0,
            Alignment::Right => free,
            Alignment::Left | Alignment::Justify => 0.0,
        };
        LayoutBlock {
            frame: Rect {
                x: x + dx,
                y,
                width: self.size.width,
                height: self.size.height,
            },
            kind: BlockKind::Image,
            element: Some(self.id),
            continued: false,
            style: (*self.style).clone(),
            content: LayoutContent::Image(ImageContent {
                media_id: self.media_id.clone(),
                alt: self.alt.clone(),
                placeholder: self.placeholder,
            }),
        }
    }
}

/// Content of one grid slot, relative to the cell's padding box.
#[derive(Debug, Clone, Default)]
pub struct MeasuredCell {
    pub blocks: Vec<LayoutBlock>,
    /// Content plus vertical padding.
    pub height: f64,
}

#[derive(Debug)]
pub struct MeasuredTable {
    pub id: ElementId,
    pub style: Arc<ResolvedStyle>,
    pub grid: TableGrid,
    pub widths: Vec<f64>,
    /// Table left edge from the region's left edge.
    pub x: f64,
    pub heights: Vec<f64>,
    /// Indexed `[row][slot]`.
    pub cells: Vec<Vec<MeasuredCell>>,
    pub is_header: Vec<bool>,
    /// Leading rows repeated on continuation pages; 0 for none.
    pub header_rows: usize,
    pub groups: Vec<Range<usize>>,
    pub row_notes: Vec<Vec<(NoteKind, String)>>,
}

impl MeasuredTable {
    pub fn row_count(&self) -> usize {
        self.heights.len()
    }

    pub fn rows_height(&self, rows: Range<usize>) -> f64 {
        self.heights[rows].iter().sum()
    }

    pub fn notes(&self, rows: Range<usize>) -> Vec<(NoteKind, String)> {
        self.row_notes[rows].iter().flatten().cloned().collect()
    }

    /// A block holding `rows` (in the given order) stacked from `(x, y)`.
    pub fn block(&self, rows: &[usize], x: f64, y: f64, continued: bool) -> LayoutBlock {
        let left = x + self.x;
        let width: f64 = self.widths.iter().sum();
        let mut row_y = y;
        let mut out = Vec::with_capacity(rows.len());
        for &r in rows {
            let row_height = self.heights[r];
            let mut cells = Vec::with_capacity(self.grid.rows[r].len());
            for (s, slot) in self.grid.rows[r].iter().enumerate() {
                let rect = self.grid.slot_rect(r, s, &self.widths, &self.heights);
                let frame = Rect {
                    x: left + rect.x,
                    y: row_y,
                    width: rect.width,
                    height: if slot.merge == MergeRole::SpanContinue {
                        row_height
                    } else {
                        rect.height
                    },
                };
                let mut blocks = Vec::new();
                if slot.merge != MergeRole::SpanContinue {
                    let measured = &self.cells[r][s];
                    let margins = slot.style.cell_margins();
                    let free = (frame.height - measured.height).max(0.0);
                    let dy = match slot.style.cell_vertical_align() {
                        CellVerticalAlign::Top => 0.0,
                        CellVerticalAlign::Center => free / 2.0,
                        CellVerticalAlign::Bottom => free,
                    };
                    for block in &measured.blocks {
                        let mut block = block.clone();
                        block.translate(frame.x + margins.left, frame.y + margins.top + dy);
                        blocks.push(block);
                    }
                }
                cells.push(CellBox {
                    column: slot.column,
                    grid_span: slot.grid_span,
                    row_span: slot.row_span,
                    merge: slot.merge,
                    frame,
                    style: (*slot.style).clone(),
                    blocks,
                });
            }
            out.push(LayoutRow {
                index: r,
                frame: Rect {
                    x: left,
                    y: row_y,
                    width,
                    height: row_height,
                },
                header: self.is_header[r],
                cells,
            });
            row_y += row_height;
        }
        LayoutBlock {
            frame: Rect {
                x: left,
                y,
                width,
                height: row_y - y,
            },
            kind: BlockKind::Table,
            element: Some(self.id),
            continued,
            style: (*self.style).clone(),
            content: LayoutContent::Table(TableContent {
                columns: self.widths.clone(),
                rows: out,
            }),
        }
    }
}

/// A stack of blocks laid out top to bottom from the origin.
#[derive(Debug, Clone, Default)]
pub struct MeasuredRegion {
    pub blocks: Vec<LayoutBlock>,
    pub height: f64,
    pub notes: Vec<(NoteKind, String)>,
}

/// A zero-height stand-in for an element that cannot be laid out.
pub fn placeholder_block(
    id: ElementId,
    kind: BlockKind,
    reason: &str,
    x: f64,
    y: f64,
    width: f64,
) -> LayoutBlock {
    LayoutBlock {
        frame: Rect {
            x,
            y,
            width,
            height: 0.0,
        },
        kind,
        element: Some(id),
        continued: false,
        style: ResolvedStyle::default(),
        content: LayoutContent::Placeholder {
            reason: reason.to_string(),
        },
    }
}

type WidthKey = (ElementId, u64);

pub struct Measurer<'a> {
    document: &'a Document,
    styles: &'a StyleEngine<'a>,
    fonts: &'a dyn FontMetrics,
    media: &'a MediaStore,
    options: &'a LayoutOptions,
    paragraphs: HashMap<WidthKey, Arc<MeasuredParagraph>>,
    tables: HashMap<WidthKey, Option<Arc<MeasuredTable>>>,
    notes: HashMap<(NoteKind, String, u64), Arc<MeasuredRegion>>,
    reported_images: HashSet<ElementId>,
    reported_timeouts: HashSet<String>,
}

impl<'a> Measurer<'a> {
    pub fn new(
        document: &'a Document,
        styles: &'a StyleEngine<'a>,
        fonts: &'a dyn FontMetrics,
        media: &'a MediaStore,
        options: &'a LayoutOptions,
    ) -> Self {
        Self {
            document,
            styles,
            fonts,
            media,
            options,
            paragraphs: HashMap::new(),
            tables: HashMap::new(),
            notes: HashMap::new(),
            reported_images: HashSet::new(),
            reported_timeouts: HashSet::new(),
        }
    }

    pub fn fonts(&self) -> &'a dyn FontMetrics {
        self.fonts
    }

    /// Measure a paragraph. Note references are numbered through `notes`;
    /// without a registry (headers, footers) they are left out.
    pub fn paragraph(
        &mut self,
        id: ElementId,
        width: f64,
        notes: Option<&mut NoteRegistry>,
        diagnostics: &mut Diagnostics,
    ) -> Arc<MeasuredParagraph> {
        let key = (id, width.to_bits());
        if let Some(hit) = self.paragraphs.get(&key) {
            return hit.clone();
        }
        let measured = Arc::new(self.measure_paragraph(id, width, notes, diagnostics));
        self.paragraphs.insert(key, measured.clone());
        measured
    }

    fn measure_paragraph(
        &self,
        id: ElementId,
        width: f64,
        notes: Option<&mut NoteRegistry>,
        diagnostics: &mut Diagnostics,
    ) -> MeasuredParagraph {
        let style = self.styles.element(id);
        let mark = RunFace::from_style(&style);
        let (chars, faces, run_styles) = self.styled_chars(id, notes, diagnostics);

        let indent_left = style.indent_left();
        let available = (width - indent_left - style.indent_right()).max(1.0);
        let first_offset = style.first_line_offset();
        let first_available = (available - first_offset).max(1.0);

        let text = TextLayout::new(self.fonts, self.options.default_tab_stop);
        let raw = text.break_into_lines(&chars, &faces, &mark, first_available, available);

        let spacing = style.line_spacing();
        let alignment = style.alignment();
        let count = raw.len();
        let lines = raw
            .into_iter()
            .enumerate()
            .map(|(i, line)| {
                let (line_available, start) = if i == 0 {
                    (first_available, indent_left + first_offset)
                } else {
                    (available, indent_left)
                };
                let free = (line_available - line.width).max(0.0);
                let offset = match alignment {
                    Alignment::Center => free / 2.0,
                    Alignment::Right => free,
                    Alignment::Left | Alignment::Justify => 0.0,
                };
                let spaces = inner_spaces(&line.fragments);
                let word_spacing = if alignment == Alignment::Justify
                    && !line.hard_break
                    && i + 1 < count
                    && spaces > 0
                {
                    free / spaces as f64
                } else {
                    0.0
                };
                MeasuredLine {
                    x: start + offset,
                    available: line_available,
                    ascent: line.ascent,
                    natural: line.height,
                    height: spacing.apply(line.height),
                    word_spacing,
                    notes: line.notes,
                    fragments: line.fragments,
                }
            })
            .collect();

        MeasuredParagraph {
            id,
            width,
            space_before: style.space_before(),
            space_after: style.space_after(),
            style,
            run_styles,
            lines,
        }
    }

    fn styled_chars(
        &self,
        id: ElementId,
        mut notes: Option<&mut NoteRegistry>,
        diagnostics: &mut Diagnostics,
    ) -> (Vec<StyledChar>, Vec<RunFace>, Vec<Arc<ResolvedStyle>>) {
        let document = self.document;
        let mut chars = Vec::new();
        let mut faces = Vec::new();
        let mut run_styles = Vec::new();
        let Some(paragraph) = document.paragraph(id) else {
            return (chars, faces, run_styles);
        };
        let owner = match document.get(id).map(|e| &e.container) {
            Some(Container::Note { kind, id: note }) => Some((*kind, note.as_str())),
            _ => None,
        };

        for (r, run) in paragraph.runs.iter().enumerate() {
            let style = self.styles.run(id, r);
            let mut face = RunFace::from_style(&style);
            let marks_note = run.content.iter().any(|c| {
                matches!(
                    c,
                    RunContent::FootnoteRef { .. }
                        | RunContent::EndnoteRef { .. }
                        | RunContent::NoteReferenceMark
                )
            });
            if marks_note && face.vertical_align == VerticalAlign::Baseline {
                face.vertical_align = VerticalAlign::Superscript;
            }
            let caps = style.caps();

            for content in &run.content {
                match content {
                    RunContent::Text { text } => {
                        for ch in text.chars() {
                            if caps {
                                chars.extend(ch.to_uppercase().map(|c| StyledChar::text(c, r)));
                            } else {
                                chars.push(StyledChar::text(ch, r));
                            }
                        }
                    }
                    RunContent::Tab => chars.push(StyledChar {
                        ch: '\t',
                        run: r,
                        kind: InlineKind::Tab,
                    }),
                    RunContent::LineBreak => chars.push(StyledChar::text('\n', r)),
                    RunContent::FootnoteRef { id: note } => self.note_reference(
                        NoteKind::Footnote,
                        note,
                        r,
                        notes.as_deref_mut(),
                        &mut chars,
                        diagnostics,
                    ),
                    RunContent::EndnoteRef { id: note } => self.note_reference(
                        NoteKind::Endnote,
                        note,
                        r,
                        notes.as_deref_mut(),
                        &mut chars,
                        diagnostics,
                    ),
                    RunContent::NoteReferenceMark => {
                        if let (Some((kind, note)), Some(registry)) = (owner, notes.as_deref_mut())
                        {
                            let ordinal = registry.ordinal(kind, note);
                            chars.extend(
                                ordinal.to_string().chars().map(|c| StyledChar::text(c, r)),
                            );
                        }
                    }
                    RunContent::Field { field } => {
                        chars.extend(FIELD_PLACEHOLDER.chars().map(|ch| StyledChar {
                            ch,
                            run: r,
                            kind: InlineKind::Field(*field),
                        }))
                    }
                }
            }
            faces.push(face);
            run_styles.push(style);
        }
        (chars, faces, run_styles)
    }

    fn note_reference(
        &self,
        kind: NoteKind,
        note: &str,
        run: usize,
        notes: Option<&mut NoteRegistry>,
        chars: &mut Vec<StyledChar>,
        diagnostics: &mut Diagnostics,
    ) {
        let Some(registry) = notes else {
            return;
        };
        if self.document.note(kind, note).is_none() {
            diagnostics.warn(Warning::MissingNote {
                kind,
                id: note.to_string(),
            });
            return;
        }
        let ordinal = registry.ordinal(kind, note);
        chars.extend(ordinal.to_string().chars().map(|ch| StyledChar {
            ch,
            run,
            kind: InlineKind::NoteRef {
                kind,
                id: note.to_string(),
            },
        }));
    }

    /// Size an image for a region `max_width` wide. Missing or late media
    /// yields a placeholder at the declared extent (zero where undeclared).
    pub fn image(
        &mut self,
        id: ElementId,
        image: &Image,
        max_width: f64,
        diagnostics: &mut Diagnostics,
    ) -> MeasuredImage {
        let intrinsic = self.media.get(&image.media_id).map(|a| a.intrinsic_size());
        if intrinsic.is_none() && self.reported_images.insert(id) {
            if image.media_id.is_empty() {
                diagnostics.warn(Warning::Placeholder {
                    element: id,
                    reason: "image has no media id".to_string(),
                });
            } else if self.media.is_timed_out(&image.media_id) {
                if self.reported_timeouts.insert(image.media_id.clone()) {
                    diagnostics.warn(Warning::AssetTimeout {
                        media_id: image.media_id.clone(),
                    });
                }
            } else {
                diagnostics.warn(Warning::MissingAsset {
                    media_id: image.media_id.clone(),
                    element: id,
                });
            }
        }

        let mut size = match (image.width, image.height, intrinsic) {
            (Some(width), Some(height), _) => Size { width, height },
            (Some(width), None, Some(i)) if i.width > 0.0 => Size {
                width,
                height: i.height * width / i.width,
            },
            (None, Some(height), Some(i)) if i.height > 0.0 => Size {
                width: i.width * height / i.height,
                height,
            },
            (width, height, Some(i)) => Size {
                width: width.unwrap_or(i.width),
                height: height.unwrap_or(i.height),
            },
            (width, height, None) => Size {
                width: width.unwrap_or(0.0),
                height: height.unwrap_or(0.0),
            },
        };
        size.width = size.width.max(0.0);
        size.height = size.height.max(0.0);
        if size.width > max_width && max_width > 0.0 {
            size.height *= max_width / size.width;
            size.width = max_width;
        }

        MeasuredImage {
            id,
            style: self.styles.element(id),
            size,
            media_id: image.media_id.clone(),
            alt: image.alt.clone(),
            placeholder: intrinsic.is_none(),
        }
    }

    /// Measure a table: grid topology, column widths, cell content, row
    /// heights. `None` when the table has no rows or columns.
    pub fn table(
        &mut self,
        id: ElementId,
        width: f64,
        notes: Option<&mut NoteRegistry>,
        diagnostics: &mut Diagnostics,
    ) -> Option<Arc<MeasuredTable>> {
        let key = (id, width.to_bits());
        if let Some(hit) = self.tables.get(&key) {
            return hit.clone();
        }
        let measured = self.measure_table(id, width, notes, diagnostics).map(Arc::new);
        self.tables.insert(key, measured.clone());
        measured
    }

    fn measure_table(
        &mut self,
        id: ElementId,
        width: f64,
        mut notes: Option<&mut NoteRegistry>,
        diagnostics: &mut Diagnostics,
    ) -> Option<MeasuredTable> {
        let document = self.document;
        let styles = self.styles;
        let table = document.table(id)?;
        let columns = grid::column_count(table);
        if columns == 0 || table.rows.is_empty() {
            diagnostics.warn(Warning::Placeholder {
                element: id,
                reason: "table has no rows or columns".to_string(),
            });
            return None;
        }

        let style = styles.element(id);
        let grid = grid::resolve_grid(table, id, columns, |r, c| styles.cell(id, r, c), diagnostics);
        let indent = style.table_indent();
        let widths = grid::column_widths(
            &table.grid,
            columns,
            style.table_width(),
            (width - indent.max(0.0)).max(1.0),
        );
        let total: f64 = widths.iter().sum();
        let x = match style.table_alignment() {
            Alignment::Center => ((width - total) / 2.0).max(0.0),
            Alignment::Right => (width - total).max(0.0),
            Alignment::Left | Alignment::Justify => indent,
        };

        let mut cells = Vec::with_capacity(grid.rows.len());
        let mut row_notes = Vec::with_capacity(grid.rows.len());
        for (r, slots) in grid.rows.iter().enumerate() {
            let mut row_cells = Vec::with_capacity(slots.len());
            let mut found = Vec::new();
            for slot in slots {
                let measured = match slot.cell.filter(|_| slot.has_content()) {
                    Some(c) => {
                        let cell = &table.rows[r].cells[c];
                        let margins = slot.style.cell_margins();
                        let inner = (grid::span_width(
                            slot.column,
                            slot.column + slot.grid_span,
                            &widths,
                        ) - margins.horizontal())
                        .max(1.0);
                        let region =
                            self.region(&cell.blocks, inner, notes.as_deref_mut(), diagnostics);
                        found.extend(region.notes);
                        MeasuredCell {
                            height: region.height + margins.vertical(),
                            blocks: region.blocks,
                        }
                    }
                    None => MeasuredCell::default(),
                };
                row_cells.push(measured);
            }
            cells.push(row_cells);
            row_notes.push(found);
        }

        let min_heights: Vec<Option<f64>> = table.rows.iter().map(|r| r.min_height).collect();
        let heights = grid.row_heights(&min_heights, |r, s| cells[r][s].height);
        let groups = grid.row_groups();
        let is_header: Vec<bool> = table.rows.iter().map(|r| r.is_header).collect();
        let mut header_rows = is_header.iter().take_while(|h| **h).count();
        if header_rows > 0 {
            for group in &groups {
                if group.start < header_rows {
                    header_rows = header_rows.max(group.end);
                }
            }
        }
        if header_rows >= table.rows.len() {
            header_rows = 0;
        }

        Some(MeasuredTable {
            id,
            style,
            grid,
            widths,
            x,
            heights,
            cells,
            is_header,
            header_rows,
            groups,
            row_notes,
        })
    }

    /// Lay out a list of blocks top to bottom: cell content, note bodies,
    /// header and footer parts. Nested tables are never split here.
    pub fn region(
        &mut self,
        ids: &[ElementId],
        width: f64,
        mut notes: Option<&mut NoteRegistry>,
        diagnostics: &mut Diagnostics,
    ) -> MeasuredRegion {
        let document = self.document;
        let mut region = MeasuredRegion::default();
        for &id in ids {
            let Some(element) = document.get(id) else {
                diagnostics.warn(Warning::DanglingElement { element: id });
                continue;
            };
            let block = match &element.kind {
                ElementKind::Paragraph(_) => {
                    let measured = self.paragraph(id, width, notes.as_deref_mut(), diagnostics);
                    let lines = 0..measured.lines.len();
                    region.notes.extend(measured.notes(lines.clone()));
                    measured.block(lines, 0.0, region.height)
                }
                ElementKind::Table(_) => {
                    match self.table(id, width, notes.as_deref_mut(), diagnostics) {
                        Some(table) => {
                            let rows: Vec<usize> = (0..table.row_count()).collect();
                            region.notes.extend(table.notes(0..table.row_count()));
                            table.block(&rows, 0.0, region.height, false)
                        }
                        None => placeholder_block(
                            id,
                            BlockKind::Table,
                            "table has no rows or columns",
                            0.0,
                            region.height,
                            width,
                        ),
                    }
                }
                ElementKind::Image(image) => {
                    self.image(id, image, width, diagnostics)
                        .block(0.0, region.height, width)
                }
                ElementKind::PageBreak | ElementKind::ColumnBreak | ElementKind::SectionBreak { .. } => {
                    continue
                }
            };
            region.height += block.frame.height;
            region.blocks.push(block);
        }
        region
    }

    /// A footnote or endnote body at `width`.
    pub fn note(
        &mut self,
        kind: NoteKind,
        id: &str,
        width: f64,
        notes: &mut NoteRegistry,
        diagnostics: &mut Diagnostics,
    ) -> Arc<MeasuredRegion> {
        let key = (kind, id.to_string(), width.to_bits());
        if let Some(hit) = self.notes.get(&key) {
            return hit.clone();
        }
        let document = self.document;
        let ids = document.note(kind, id).unwrap_or_default();
        let region = Arc::new(self.region(ids, width, Some(notes), diagnostics));
        self.notes.insert(key, region.clone());
        region
    }
}
