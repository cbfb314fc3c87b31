//! # Page Break Decisions
//!
//! What to do with a paragraph that reaches the bottom of a region: keep it,
//! move it, or split it between two lines.

/// Outcome for one block at the bottom of a region.
#[derive(Debug, Clone, PartialEq)]
pub enum BreakDecision {
    /// The whole block fits.
    Place,
    /// Nothing should stay here; try the next region.
    MoveToNextPage,
    /// Keep the first `lines_here` lines, continue the rest.
    Split { lines_here: usize },
}

/// Minimum lines on either side of a split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakRules {
    /// Lines that must stay at the bottom of the current region.
    pub orphans: usize,
    /// Lines that must move to the top of the next region.
    pub widows: usize,
}

impl BreakRules {
    /// No widow/orphan control: any line boundary will do.
    pub const NONE: BreakRules = BreakRules {
        orphans: 1,
        widows: 1,
    };

    pub fn new(orphans: usize, widows: usize) -> Self {
        Self {
            orphans: orphans.max(1),
            widows: widows.max(1),
        }
    }
}

/// Decide how a block with the given line heights meets `remaining` space.
///
/// Line heights include any space before the first line and after the last.
pub fn decide_break(
    remaining: f64,
    line_heights: &[f64],
    breakable: bool,
    rules: BreakRules,
) -> BreakDecision {
    let total: f64 = line_heights.iter().sum();
    if total <= remaining + 1e-6 {
        return BreakDecision::Place;
    }
    if !breakable {
        return BreakDecision::MoveToNextPage;
    }

    let mut used = 0.0;
    let mut fit = 0;
    for &h in line_heights {
        if used + h > remaining + 1e-6 {
            break;
        }
        used += h;
        fit += 1;
    }

    let lines = line_heights.len();
    if fit == 0 || fit < rules.orphans {
        return BreakDecision::MoveToNextPage;
    }

    let carried = lines - fit;
    if carried < rules.widows {
        // Pull lines forward so the next page gets enough of them.
        let pulled_back = fit.saturating_sub(rules.widows - carried);
        if pulled_back == 0 || pulled_back < rules.orphans {
            return BreakDecision::MoveToNextPage;
        }
        return BreakDecision::Split {
            lines_here: pulled_back,
        };
    }

    BreakDecision::Split { lines_here: fit }
}
