//! # Document Model
//!
//! The in-memory document the layout engine consumes. The input arrives as a
//! nested tree ([`SourceDocument`]); [`Document::from_source`] flattens it
//! into an arena where every paragraph, table, image and break owns a stable
//! [`ElementId`]. Everything downstream (the style cache, diagnostics, the
//! layout output) refers to elements by id only.
//!
//! Each element also remembers its [`Container`], so inheritance that crosses
//! levels (a paragraph in a table cell picking up the table's formatting)
//! is a lookup, not a pointer chase.

pub mod source;

pub use source::{SourceBlock, SourceDocument, SourceNote, SourcePart};

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::assets::MediaStore;
use crate::error::FolioError;
use crate::section::RawSection;
use crate::style::{PropertySet, StyleCatalog, Theme};

/// Stable arena index of one element, assigned when the tree is flattened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(pub u32);

impl ElementId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ── Geometry ────────────────────────────────────────────────────

/// Edge values (top, right, bottom, left) used for margins and padding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Edges {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl Edges {
    pub fn uniform(v: f64) -> Self {
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }

    pub fn horizontal(&self) -> f64 {
        self.left + self.right
    }

    pub fn vertical(&self) -> f64 {
        self.top + self.bottom
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// A rectangle in page space. Points, origin top-left, y grows downward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn translated(mut self, dx: f64, dy: f64) -> Self {
        self.x += dx;
        self.y += dy;
        self
    }
}

// ── Elements ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteKind {
    Footnote,
    Endnote,
}

impl fmt::Display for NoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NoteKind::Footnote => "footnote",
            NoteKind::Endnote => "endnote",
        })
    }
}

/// Where an element lives in the original tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "in", rename_all = "camelCase")]
pub enum Container {
    Body,
    Cell {
        table: ElementId,
        row: usize,
        cell: usize,
    },
    Note {
        kind: NoteKind,
        id: String,
    },
    HeaderFooter {
        id: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub id: ElementId,
    pub container: Container,
    pub kind: ElementKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    Paragraph(Paragraph),
    Table(Table<ElementId>),
    Image(Image),
    PageBreak,
    ColumnBreak,
    /// Ends the current section; `section` is the index of the one it starts.
    SectionBreak {
        section: usize,
    },
}

impl ElementKind {
    pub fn name(&self) -> &'static str {
        match self {
            ElementKind::Paragraph(_) => "paragraph",
            ElementKind::Table(_) => "table",
            ElementKind::Image(_) => "image",
            ElementKind::PageBreak => "pageBreak",
            ElementKind::ColumnBreak => "columnBreak",
            ElementKind::SectionBreak { .. } => "sectionBreak",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Paragraph {
    pub style_id: Option<String>,
    /// Direct formatting on the paragraph.
    pub properties: PropertySet,
    pub runs: Vec<Run>,
}

impl Paragraph {
    pub fn text(text: &str) -> Self {
        Self {
            runs: vec![Run::text(text)],
            ..Default::default()
        }
    }

    pub fn with_style(mut self, style_id: &str) -> Self {
        self.style_id = Some(style_id.to_string());
        self
    }

    pub fn with_run(mut self, run: Run) -> Self {
        self.runs.push(run);
        self
    }

    pub fn plain_text(&self) -> String {
        self.runs
            .iter()
            .flat_map(|r| r.content.iter())
            .filter_map(|c| match c {
                RunContent::Text { text } => Some(text.as_str()),
                RunContent::Tab => Some("\t"),
                RunContent::LineBreak => Some("\n"),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Run {
    pub style_id: Option<String>,
    pub properties: PropertySet,
    pub content: Vec<RunContent>,
}

impl Run {
    pub fn text(text: &str) -> Self {
        Self::with(RunContent::Text {
            text: text.to_string(),
        })
    }

    pub fn with(content: RunContent) -> Self {
        Self {
            content: vec![content],
            ..Default::default()
        }
    }

    pub fn footnote(id: &str) -> Self {
        Self::with(RunContent::FootnoteRef { id: id.to_string() })
    }

    pub fn endnote(id: &str) -> Self {
        Self::with(RunContent::EndnoteRef { id: id.to_string() })
    }

    pub fn with_properties(mut self, properties: PropertySet) -> Self {
        self.properties = properties;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RunContent {
    Text { text: String },
    Tab,
    LineBreak,
    FootnoteRef { id: String },
    EndnoteRef { id: String },
    /// Inside a note body: renders the owning note's ordinal.
    NoteReferenceMark,
    Field { field: FieldKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldKind {
    Page,
    NumPages,
}

/// A table. `B` is the block type of cell content: nested source blocks on
/// input, arena ids once flattened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table<B> {
    #[serde(default)]
    pub style_id: Option<String>,
    #[serde(default)]
    pub properties: PropertySet,
    /// Declared column widths in points (`w:tblGrid`). May be empty.
    #[serde(default)]
    pub grid: Vec<f64>,
    #[serde(default = "Vec::new")]
    pub rows: Vec<TableRow<B>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow<B> {
    /// Repeats at the top of each continuation page.
    #[serde(default)]
    pub is_header: bool,
    #[serde(default)]
    pub min_height: Option<f64>,
    #[serde(default = "Vec::new")]
    pub cells: Vec<TableCell<B>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCell<B> {
    #[serde(default)]
    pub properties: PropertySet,
    #[serde(default = "default_span")]
    pub grid_span: u32,
    /// Explicit vertical span (HTML-style); an alternative to `vertical_merge`.
    #[serde(default)]
    pub row_span: Option<u32>,
    #[serde(default)]
    pub vertical_merge: Option<VerticalMerge>,
    #[serde(default = "Vec::new")]
    pub blocks: Vec<B>,
}

fn default_span() -> u32 {
    1
}

impl<B> TableCell<B> {
    pub fn new(blocks: Vec<B>) -> Self {
        Self {
            properties: PropertySet::default(),
            grid_span: 1,
            row_span: None,
            vertical_merge: None,
            blocks,
        }
    }

    pub fn spanning(mut self, columns: u32) -> Self {
        self.grid_span = columns;
        self
    }

    pub fn merge(mut self, merge: VerticalMerge) -> Self {
        self.vertical_merge = Some(merge);
        self
    }
}

impl<B> TableRow<B> {
    pub fn new(cells: Vec<TableCell<B>>) -> Self {
        Self {
            is_header: false,
            min_height: None,
            cells,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VerticalMerge {
    Restart,
    Continue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Image {
    pub media_id: String,
    /// Display extent in points; falls back to the media's intrinsic size.
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub alt: Option<String>,
    pub properties: PropertySet,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DocumentSettings {
    /// Use distinct `even` header/footer parts on even pages.
    pub even_and_odd_headers: bool,
}

/// Passed through to the layout result untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

// ── Document ────────────────────────────────────────────────────

/// A flattened, immutable document ready for layout.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub elements: Vec<Element>,
    /// Top-level element order.
    pub body: Vec<ElementId>,
    pub theme: Theme,
    pub styles: StyleCatalog,
    pub sections: Vec<RawSection>,
    pub footnotes: HashMap<String, Vec<ElementId>>,
    pub endnotes: HashMap<String, Vec<ElementId>>,
    pub headers_footers: HashMap<String, Vec<ElementId>>,
    pub settings: DocumentSettings,
    pub metadata: Metadata,
    pub media: MediaStore,
}

impl Document {
    /// Parse a JSON source tree and flatten it.
    pub fn from_json(json: &str) -> Result<Self, FolioError> {
        let source: SourceDocument =
            serde_json::from_str(json).map_err(|e| FolioError::parse("document", e))?;
        Ok(Self::from_source(source))
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn paragraph(&self, id: ElementId) -> Option<&Paragraph> {
        match &self.get(id)?.kind {
            ElementKind::Paragraph(p) => Some(p),
            _ => None,
        }
    }

    pub fn table(&self, id: ElementId) -> Option<&Table<ElementId>> {
        match &self.get(id)?.kind {
            ElementKind::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn note(&self, kind: NoteKind, id: &str) -> Option<&[ElementId]> {
        let notes = match kind {
            NoteKind::Footnote => &self.footnotes,
            NoteKind::Endnote => &self.endnotes,
        };
        notes.get(id).map(Vec::as_slice)
    }

    /// Number of section breaks in the body, i.e. sections implied by content.
    pub fn section_breaks(&self) -> usize {
        self.body
            .iter()
            .filter_map(|id| self.get(*id))
            .filter(|e| matches!(e.kind, ElementKind::SectionBreak { .. }))
            .count()
    }
}
