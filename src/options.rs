//! Layout configuration. Every field has a default, so `{}` is a valid
//! option set.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FolioError;

/// How far footnotes may push already-placed body content past its limit
/// before the last body block is moved to the next page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OverflowTolerance {
    /// One line height of the block that would be moved.
    LineHeight,
    /// A fixed distance in points.
    Points(f64),
}

impl OverflowTolerance {
    pub fn resolve(self, line_height: f64) -> f64 {
        match self {
            OverflowTolerance::LineHeight => line_height,
            OverflowTolerance::Points(points) => points.max(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutOptions {
    /// Upper bound on the footnote area as a fraction of the page height.
    pub footnote_area_max_fraction: f64,
    pub footnote_overflow_tolerance: OverflowTolerance,
    /// Space reserved for the separator line above the footnote area.
    pub footnote_separator_height: f64,
    /// How long to wait for outstanding media before laying out.
    pub asset_timeout_ms: u64,
    /// Resolve styles on the rayon pool before pagination.
    pub parallel_styles: bool,
    /// Distance between default tab stops, in points.
    pub default_tab_stop: f64,
    /// Minimum lines left at the bottom of a page when a paragraph splits.
    pub orphan_lines: usize,
    /// Minimum lines carried to the next page when a paragraph splits.
    pub widow_lines: usize,
    /// Repeat table header rows at the top of continuation pages.
    pub repeat_header_rows: bool,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            footnote_area_max_fraction: 0.5,
            footnote_overflow_tolerance: OverflowTolerance::LineHeight,
            footnote_separator_height: 8.0,
            asset_timeout_ms: 2_000,
            parallel_styles: true,
            default_tab_stop: 36.0,
            orphan_lines: 2,
            widow_lines: 2,
            repeat_header_rows: true,
        }
    }
}

impl LayoutOptions {
    pub fn from_json(json: &str) -> Result<Self, FolioError> {
        serde_json::from_str(json).map_err(|e| FolioError::parse("layout options", e))
    }

    pub fn asset_timeout(&self) -> Duration {
        Duration::from_millis(self.asset_timeout_ms)
    }

    /// The area fraction clamped to something usable.
    pub fn footnote_fraction(&self) -> f64 {
        if self.footnote_area_max_fraction.is_finite() {
            self.footnote_area_max_fraction.clamp(0.0, 1.0)
        } else {
            LayoutOptions::default().footnote_area_max_fraction
        }
    }
}
