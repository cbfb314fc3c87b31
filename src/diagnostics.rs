//! Recoverable layout diagnostics.
//!
//! Nothing in this module aborts anything. Malformed styles, sections, spans
//! and assets are degraded to safe defaults at the point of use; the reason
//! is recorded here and handed back next to the layout so a validator can
//! surface it (or not).

use serde::Serialize;
use thiserror::Error;

use crate::model::{ElementId, NoteKind};
use crate::style::StyleFamily;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

/// One recoverable condition found while resolving or paginating.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "code", rename_all = "camelCase")]
pub enum Warning {
    #[error("style `{style_id}` reaches `{repeated}` twice through basedOn; chain truncated")]
    CyclicInheritance { style_id: String, repeated: String },

    #[error("{family} style `{style_id}` is not defined; falling back to the family default")]
    UnresolvedStyle {
        style_id: String,
        family: StyleFamily,
    },

    #[error("style `{style_id}` is a {found} style, not a {expected} style; ignored")]
    StyleFamilyMismatch {
        style_id: String,
        expected: StyleFamily,
        found: StyleFamily,
    },

    #[error("section {section}: {field} value `{value}` is unusable; using {fallback}")]
    MalformedSection {
        section: usize,
        field: &'static str,
        value: String,
        fallback: String,
    },

    #[error("section break #{index} has no section of its own; staying in section {reused}")]
    ExtraSectionBreak { index: usize, reused: usize },

    #[error("table {table} row {row}: cell spans exceed {columns} columns; last cell clipped to {clipped_to}")]
    GridSpanClipped {
        table: ElementId,
        row: usize,
        columns: usize,
        clipped_to: u32,
    },

    #[error("table {table} row {row}: cell {cell} has no free grid column left and was dropped")]
    CellWithoutSlot {
        table: ElementId,
        row: usize,
        cell: usize,
    },

    #[error("table {table} row {row}: merge continuation at column {column} has no open span")]
    OrphanMergeContinuation {
        table: ElementId,
        row: usize,
        column: usize,
    },

    #[error("table {table}: row span starting at row {row} runs past the last row")]
    RowSpanClipped { table: ElementId, row: usize },

    #[error("element {element} needs {height:.1}pt but an empty region holds {available:.1}pt; placed with overflow")]
    Overflow {
        element: ElementId,
        height: f64,
        available: f64,
    },

    #[error("media `{media_id}` for element {element} is not available; placeholder used")]
    MissingAsset { media_id: String, element: ElementId },

    #[error("media `{media_id}` was not resolved before the readiness deadline; placeholder used")]
    AssetTimeout { media_id: String },

    #[error("{kind} `{id}` is referenced but not defined")]
    MissingNote { kind: NoteKind, id: String },

    #[error("header/footer part `{id}` is not defined")]
    MissingHeaderFooter { id: String },

    #[error("page {page}: footnotes push the body {overflow:.1}pt past its limit (tolerance {tolerance:.1}pt)")]
    FootnoteOverflowAccepted {
        page: u32,
        overflow: f64,
        tolerance: f64,
    },

    #[error("page {page}: footnotes push the body {overflow:.1}pt past its limit; element {element} reflowed to the next page")]
    FootnoteReflow {
        page: u32,
        overflow: f64,
        element: ElementId,
    },

    #[error("page {page}: body still overflows the footnote area by {overflow:.1}pt")]
    FootnoteOverflow { page: u32, overflow: f64 },

    #[error("page {page}: footnote area capped at {limit:.1}pt ({needed:.1}pt needed)")]
    FootnoteAreaTruncated { page: u32, needed: f64, limit: f64 },

    #[error("element {element} is malformed ({reason}); placeholder used")]
    Placeholder { element: ElementId, reason: String },

    #[error("body references element {element} which is not in the document")]
    DanglingElement { element: ElementId },
}

/// A warning plus how loudly it should be surfaced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub warning: Warning,
}

impl Diagnostic {
    pub fn message(&self) -> String {
        self.warning.to_string()
    }
}

/// Append-only collector. Every entry is also emitted through `log`.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, warning: Warning) {
        log::warn!("{warning}");
        self.entries.push(Diagnostic {
            severity: Severity::Warning,
            warning,
        });
    }

    pub fn info(&mut self, warning: Warning) {
        log::info!("{warning}");
        self.entries.push(Diagnostic {
            severity: Severity::Info,
            warning,
        });
    }

    /// Merge entries that were already logged elsewhere.
    pub fn extend(&mut self, entries: impl IntoIterator<Item = Diagnostic>) {
        self.entries.extend(entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.entries.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}
