//! # Folio
//!
//! A page-native layout engine for word-processing documents.
//!
//! A document arrives as an element arena (paragraphs, tables, images,
//! breaks) plus a style catalog, a theme and section properties. Styles are
//! cascaded exactly once per element; the flattened result rides along on
//! every placed block, so a renderer downstream never resolves a style
//! again. Content is flowed INTO pages: every break decision is made against
//! the page it lands on, never by slicing a tall canvas afterwards.
//!
//! ## Architecture
//!
//! ```text
//! Input (JSON or SourceDocument)
//!       ↓
//!   [model]     Element arena, containers, sections, notes
//!       ↓
//!   [style]     basedOn chains + theme + defaults, cached per element
//!       ↓
//!   [section]   Twips to points, page templates, numbering
//!       ↓
//!   [layout]    Grid topology, line breaking, pagination, footnotes
//!       ↓
//!   UnifiedLayout + diagnostics
//! ```
//!
//! Malformed input never panics and never aborts a layout. Recoverable
//! problems are returned as [`diagnostics::Diagnostic`]s next to the pages;
//! structural ones as [`error::LayoutError`]s, still with a best-effort
//! layout. Call [`layout::LayoutResult::into_strict`] to turn the latter
//! into a hard failure.

pub mod assets;
pub mod diagnostics;
pub mod error;
pub mod font;
pub mod layout;
pub mod model;
pub mod options;
pub mod section;
pub mod style;
pub mod text;

pub use diagnostics::{Diagnostic, Severity, Warning};
pub use error::{FolioError, LayoutError};
pub use layout::{LayoutEngine, LayoutResult, UnifiedLayout};
pub use model::Document;
pub use options::LayoutOptions;

/// Lay out a document with default options and approximate font metrics.
pub fn layout(document: &Document) -> LayoutResult {
    LayoutEngine::default().layout(document)
}

/// Lay out a document described as JSON.
///
/// Only malformed JSON is an error here; everything wrong *inside* a
/// well-formed document is reported through the result.
pub fn layout_json(json: &str) -> Result<LayoutResult, FolioError> {
    let document = Document::from_json(json)?;
    Ok(layout(&document))
}
