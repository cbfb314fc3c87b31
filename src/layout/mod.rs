//! # Page-Native Flow Engine
//!
//! Content is flowed INTO pages, never laid out on a tall canvas and sliced.
//!
//! 1. Open a page for the active section: page box, header, footer, columns
//! 2. Take the next element and ask: does it fit in what is left?
//! 3. If it fits: place it, register its footnotes, move the cursor down
//! 4. If not: paragraphs split between lines (widow/orphan aware), tables
//!    split between row groups with header rows repeated, anything else
//!    moves to the next column or page
//! 5. Before a page closes, its footnotes claim space at the bottom; body
//!    content they push too far is reflowed once
//!
//! The output is the [`UnifiedLayout`]: absolute frames in points, every
//! block carrying its flattened style, so renderers never cascade again.

mod flow;
pub mod grid;
mod measure;
pub mod notes;
pub mod page_break;

use serde::Serialize;

use crate::assets::{AssetBarrier, MediaStore};
use crate::diagnostics::{Diagnostic, Diagnostics, Severity};
use crate::error::{FolioError, LayoutError};
use crate::font::{FontBook, FontMetrics};
use crate::model::{Document, Edges, ElementId, FieldKind, Metadata, NoteKind, Rect, Size};
use crate::options::LayoutOptions;
use crate::section::resolve_sections;
use crate::style::{ResolvedStyle, StyleEngine};

use flow::Paginator;
use grid::MergeRole;
use measure::Measurer;

// ── Output model ────────────────────────────────────────────────

/// Every page of a document, in order. The contract with renderers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedLayout {
    pub pages: Vec<LayoutPage>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutPage {
    /// Physical position, 1-based.
    pub number: u32,
    /// The number as printed, formatted per the section.
    pub display_number: String,
    pub section: usize,
    pub size: Size,
    /// Section margins; the bottom grows by the footnote area height.
    pub margins: Edges,
    pub blocks: Vec<LayoutBlock>,
}

impl LayoutPage {
    /// Blocks flowed from the element stream, in placement order.
    pub fn body_blocks(&self) -> impl Iterator<Item = &LayoutBlock> {
        self.blocks.iter().filter(|b| b.kind.is_body())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Paragraph,
    Table,
    Image,
    Header,
    Footer,
    Footnotes,
}

impl BlockKind {
    pub fn is_body(self) -> bool {
        matches!(self, BlockKind::Paragraph | BlockKind::Table | BlockKind::Image)
    }
}

/// A positioned unit on a page. Immutable once its page closes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutBlock {
    pub frame: Rect,
    #[serde(rename = "blockType")]
    pub kind: BlockKind,
    /// The element this block was cut from; `None` for page furniture.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<ElementId>,
    /// True when an earlier page holds the start of the same element.
    pub continued: bool,
    pub style: ResolvedStyle,
    pub content: LayoutContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LayoutContent {
    Paragraph(ParagraphContent),
    Table(TableContent),
    Image(ImageContent),
    /// Header or footer part content.
    Region {
        part: String,
        blocks: Vec<LayoutBlock>,
    },
    Footnotes(FootnoteArea),
    /// Stands in for an element that could not be laid out.
    Placeholder { reason: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphContent {
    pub lines: Vec<LayoutLine>,
    /// Indexed by [`LayoutFragment::run`].
    pub run_styles: Vec<ResolvedStyle>,
    /// Index of the first line within the whole paragraph.
    pub first_line: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutLine {
    pub frame: Rect,
    pub baseline: f64,
    /// Extra advance per space on justified lines.
    pub word_spacing: f64,
    pub fragments: Vec<LayoutFragment>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutFragment {
    pub run: usize,
    pub x: f64,
    pub width: f64,
    pub text: String,
    pub kind: FragmentKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FragmentKind {
    Text,
    Tab,
    NoteReference {
        note: NoteKind,
        id: String,
        ordinal: u32,
    },
    Field { field: FieldKind },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableContent {
    pub columns: Vec<f64>,
    pub rows: Vec<LayoutRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutRow {
    /// Row index in the source table.
    pub index: usize,
    pub frame: Rect,
    pub header: bool,
    pub cells: Vec<CellBox>,
}

/// One grid slot. Span starts cover every row of their span; continuations
/// keep their own row box and carry no content.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellBox {
    pub column: usize,
    pub grid_span: usize,
    pub row_span: usize,
    pub merge: MergeRole,
    pub frame: Rect,
    pub style: ResolvedStyle,
    pub blocks: Vec<LayoutBlock>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageContent {
    pub media_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    /// The media was missing or late; draw a placeholder box.
    pub placeholder: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FootnoteArea {
    /// Band holding the separator rule.
    pub separator: Rect,
    pub notes: Vec<PlacedNote>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedNote {
    pub kind: NoteKind,
    pub id: String,
    pub ordinal: u32,
    pub blocks: Vec<LayoutBlock>,
}

impl LayoutBlock {
    /// Move the block and everything inside it.
    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.frame = self.frame.translated(dx, dy);
        match &mut self.content {
            LayoutContent::Paragraph(p) => {
                for line in &mut p.lines {
                    line.frame = line.frame.translated(dx, dy);
                    line.baseline += dy;
                    for fragment in &mut line.fragments {
                        fragment.x += dx;
                    }
                }
            }
            LayoutContent::Table(t) => {
                for row in &mut t.rows {
                    row.frame = row.frame.translated(dx, dy);
                    for cell in &mut row.cells {
                        cell.frame = cell.frame.translated(dx, dy);
                        for block in &mut cell.blocks {
                            block.translate(dx, dy);
                        }
                    }
                }
            }
            LayoutContent::Region { blocks, .. } => {
                for block in blocks {
                    block.translate(dx, dy);
                }
            }
            LayoutContent::Footnotes(area) => {
                area.separator = area.separator.translated(dx, dy);
                for block in area.notes.iter_mut().flat_map(|n| n.blocks.iter_mut()) {
                    block.translate(dx, dy);
                }
            }
            LayoutContent::Image(_) | LayoutContent::Placeholder { .. } => {}
        }
    }

    /// Visit every text fragment, however deeply nested.
    pub fn for_each_fragment_mut(&mut self, f: &mut impl FnMut(&mut LayoutFragment)) {
        match &mut self.content {
            LayoutContent::Paragraph(p) => {
                for fragment in p.lines.iter_mut().flat_map(|l| l.fragments.iter_mut()) {
                    f(fragment);
                }
            }
            LayoutContent::Table(t) => {
                for block in t
                    .rows
                    .iter_mut()
                    .flat_map(|r| r.cells.iter_mut())
                    .flat_map(|c| c.blocks.iter_mut())
                {
                    block.for_each_fragment_mut(f);
                }
            }
            LayoutContent::Region { blocks, .. } => {
                for block in blocks {
                    block.for_each_fragment_mut(f);
                }
            }
            LayoutContent::Footnotes(area) => {
                for block in area.notes.iter_mut().flat_map(|n| n.blocks.iter_mut()) {
                    block.for_each_fragment_mut(f);
                }
            }
            LayoutContent::Image(_) | LayoutContent::Placeholder { .. } => {}
        }
    }

    /// Concatenated text, nested blocks included.
    pub fn text(&self) -> String {
        match &self.content {
            LayoutContent::Paragraph(p) => p
                .lines
                .iter()
                .flat_map(|l| l.fragments.iter())
                .map(|f| f.text.as_str())
                .collect(),
            LayoutContent::Table(t) => t
                .rows
                .iter()
                .flat_map(|r| r.cells.iter())
                .flat_map(|c| c.blocks.iter())
                .map(LayoutBlock::text)
                .collect(),
            LayoutContent::Region { blocks, .. } => blocks.iter().map(LayoutBlock::text).collect(),
            LayoutContent::Footnotes(area) => area
                .notes
                .iter()
                .flat_map(|n| n.blocks.iter())
                .map(LayoutBlock::text)
                .collect(),
            LayoutContent::Image(_) | LayoutContent::Placeholder { .. } => String::new(),
        }
    }
}

/// Replace field placeholders of one kind with their value.
pub(crate) fn resolve_fields(block: &mut LayoutBlock, field: FieldKind, value: &str) {
    block.for_each_fragment_mut(&mut |fragment| {
        if fragment.kind == (FragmentKind::Field { field }) {
            fragment.text = value.to_string();
        }
    });
}

// ── Result ──────────────────────────────────────────────────────

/// A best-effort layout plus everything that went wrong producing it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutResult {
    pub layout: UnifiedLayout,
    pub diagnostics: Vec<Diagnostic>,
    pub errors: Vec<LayoutError>,
}

impl LayoutResult {
    /// No structural errors and nothing above info severity.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
            && self
                .diagnostics
                .iter()
                .all(|d| d.severity == Severity::Info)
    }

    /// The layout, or the first structural error.
    pub fn into_strict(self) -> Result<UnifiedLayout, FolioError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(error.into()),
            None => Ok(self.layout),
        }
    }
}

// ── Engine ──────────────────────────────────────────────────────

/// Entry point: configure once, lay out any number of documents.
pub struct LayoutEngine {
    options: LayoutOptions,
    fonts: Box<dyn FontMetrics>,
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self::new(LayoutOptions::default())
    }
}

impl LayoutEngine {
    pub fn new(options: LayoutOptions) -> Self {
        Self {
            options,
            fonts: Box::new(FontBook::new()),
        }
    }

    /// Measure text with `fonts` instead of the built-in approximation.
    pub fn with_fonts(mut self, fonts: impl FontMetrics + 'static) -> Self {
        self.fonts = Box::new(fonts);
        self
    }

    pub fn options(&self) -> &LayoutOptions {
        &self.options
    }

    /// Lay out with the media already attached to the document.
    pub fn layout(&self, document: &Document) -> LayoutResult {
        self.run(document, &document.media)
    }

    /// Wait once on `barrier` (bounded by the asset timeout), then lay out.
    /// Media still outstanding at the deadline becomes placeholders.
    pub fn layout_with_barrier(&self, document: &Document, barrier: AssetBarrier) -> LayoutResult {
        let mut media = document.media.clone();
        media.absorb(barrier.wait(self.options.asset_timeout()));
        self.run(document, &media)
    }

    fn run(&self, document: &Document, media: &MediaStore) -> LayoutResult {
        let styles = StyleEngine::new(document);
        styles.begin_pass();
        if self.options.parallel_styles {
            styles.prefetch();
        }

        let mut diagnostics = Diagnostics::new();
        let sections = resolve_sections(&document.sections, &mut diagnostics);
        let measurer = Measurer::new(document, &styles, self.fonts.as_ref(), media, &self.options);
        let (pages, mut diagnostics, errors) =
            Paginator::new(document, sections, measurer, &self.options, diagnostics).run();

        for warning in styles.take_warnings() {
            diagnostics.warn(warning);
        }
        log::debug!(
            "laid out {} element(s) into {} page(s), {} diagnostic(s)",
            document.len(),
            pages.len(),
            diagnostics.len()
        );

        LayoutResult {
            layout: UnifiedLayout {
                pages,
                metadata: document.metadata.clone(),
            },
            diagnostics: diagnostics.into_vec(),
            errors,
        }
    }
}
