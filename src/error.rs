//! Structured error types for the folio layout engine.
//!
//! Two layers: `FolioError` covers failures at the API boundary (input that
//! does not parse), `LayoutError` covers structural impossibilities found
//! during pagination. Recoverable problems are not errors at all; they are
//! collected as [`crate::diagnostics::Diagnostic`]s.

use serde::Serialize;
use thiserror::Error;

use crate::model::ElementId;

/// The unified error type returned by the public folio API functions.
#[derive(Debug, Error)]
pub enum FolioError {
    /// JSON input failed to parse as a valid folio document or option set.
    #[error("failed to parse {what}: {source}{}", hint_suffix(.hint))]
    ParseError {
        what: &'static str,
        #[source]
        source: serde_json::Error,
        hint: String,
    },
    /// Layout finished, but a section or element could not be placed.
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

fn hint_suffix(hint: &str) -> String {
    if hint.is_empty() {
        String::new()
    } else {
        format!("\n  Hint: {hint}")
    }
}

impl FolioError {
    pub(crate) fn parse(what: &'static str, e: serde_json::Error) -> Self {
        let hint = match e.classify() {
            serde_json::error::Category::Syntax => {
                "Check for trailing commas, missing quotes, or unescaped characters.".to_string()
            }
            serde_json::error::Category::Data => {
                "The JSON is valid but doesn't match the folio schema. Check field names and types."
                    .to_string()
            }
            serde_json::error::Category::Eof => {
                "Unexpected end of input; is the JSON truncated?".to_string()
            }
            serde_json::error::Category::Io => String::new(),
        };
        FolioError::ParseError {
            what,
            source: e,
            hint,
        }
    }
}

impl From<serde_json::Error> for FolioError {
    fn from(e: serde_json::Error) -> Self {
        FolioError::parse("document", e)
    }
}

/// A structural impossibility: content that can never be placed as declared.
///
/// These interrupt pagination of the affected section (or mark the offending
/// element) but never discard the rest of the layout.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "code", rename_all = "camelCase")]
pub enum LayoutError {
    #[error("section {section}: content box is {width:.1}x{height:.1}pt after margins; nothing can be placed")]
    NonPositiveContentBox {
        section: usize,
        width: f64,
        height: f64,
    },
    #[error("table {table}: rows {first_row}..={last_row} need {height:.1}pt but a page body holds {available:.1}pt")]
    RowExceedsPage {
        table: ElementId,
        first_row: usize,
        last_row: usize,
        height: f64,
        available: f64,
    },
}
