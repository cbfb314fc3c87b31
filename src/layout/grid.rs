//! # Table Grid
//!
//! Two passes over a table. The topology pass expands `gridSpan`, `rowSpan`
//! and `verticalMerge` declarations into a grid where every row covers every
//! column exactly once. The geometry pass turns measured content heights
//! into row heights and cell rectangles once all spans are known.
//!
//! Malformed span data never fails: over-wide rows are clipped, cells with no
//! room left are dropped, orphan merge continuations render as plain cells,
//! and each repair is reported.

use std::ops::Range;
use std::sync::Arc;

use serde::Serialize;

use crate::diagnostics::{Diagnostics, Warning};
use crate::model::{ElementId, Rect, Table, VerticalMerge};
use crate::style::{ResolvedStyle, TableWidth};

/// How a grid slot relates to a vertical span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeRole {
    Solo,
    SpanStart,
    /// Reserves its slot but renders no content; the span start's
    /// rectangle covers it.
    SpanContinue,
}

/// One placed cell (or reserved slot) of the grid.
#[derive(Debug, Clone)]
pub struct GridSlot {
    pub column: usize,
    pub grid_span: usize,
    /// Rows covered, for span starts; 1 otherwise.
    pub row_span: usize,
    pub merge: MergeRole,
    /// Index of the source cell in its row. `None` for slots the resolver
    /// synthesised (padding, or the continuation of an explicit row span).
    pub cell: Option<usize>,
    /// `(row, column)` of the span start this slot continues.
    pub origin: Option<(usize, usize)>,
    pub style: Arc<ResolvedStyle>,
}

impl GridSlot {
    /// Slots whose own content is laid out.
    pub fn has_content(&self) -> bool {
        self.merge != MergeRole::SpanContinue && self.cell.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct TableGrid {
    pub columns: usize,
    pub rows: Vec<Vec<GridSlot>>,
}

/// Column count of a table: its declared grid, else its widest row.
pub fn column_count<B>(table: &Table<B>) -> usize {
    if !table.grid.is_empty() {
        return table.grid.len();
    }
    table
        .rows
        .iter()
        .map(|row| {
            row.cells
                .iter()
                .map(|c| c.grid_span.max(1) as usize)
                .sum::<usize>()
        })
        .max()
        .unwrap_or(0)
}

#[derive(Clone, Copy)]
struct Reservation {
    origin: (usize, usize),
    rows_left: usize,
}

/// Topology pass. `cascade(row, cell)` supplies each source cell's style.
pub fn resolve_grid<B>(
    table: &Table<B>,
    table_id: ElementId,
    column_count: usize,
    cascade: impl Fn(usize, usize) -> Arc<ResolvedStyle>,
    diagnostics: &mut Diagnostics,
) -> TableGrid {
    let columns = column_count;
    let empty_style = Arc::new(ResolvedStyle::default());
    let mut reserved: Vec<Option<Reservation>> = vec![None; columns];
    let mut open_merge: Vec<Option<(usize, usize)>> = vec![None; columns];
    let mut rows = Vec::with_capacity(table.rows.len());

    for (r, row) in table.rows.iter().enumerate() {
        let mut slots: Vec<Option<GridSlot>> = vec![None; columns];
        let is_reserved = |c: usize, reserved: &[Option<Reservation>]| {
            reserved[c].is_some_and(|res| res.rows_left > 0)
        };

        // Reserved columns first, so cells flow around them.
        let mut c = 0;
        while c < columns {
            let Some(res) = reserved[c].filter(|res| res.rows_left > 0) else {
                c += 1;
                continue;
            };
            let mut span = 1;
            while c + span < columns
                && reserved[c + span].is_some_and(|o| o.origin == res.origin && o.rows_left > 0)
            {
                span += 1;
            }
            slots[c] = Some(GridSlot {
                column: c,
                grid_span: span,
                row_span: 1,
                merge: MergeRole::SpanContinue,
                cell: None,
                origin: Some(res.origin),
                style: empty_style.clone(),
            });
            for merge in &mut open_merge[c..c + span] {
                *merge = None;
            }
            c += span;
        }

        let mut col = 0;
        for (ci, cell) in row.cells.iter().enumerate() {
            while col < columns && is_reserved(col, &reserved) {
                col += 1;
            }
            if col >= columns {
                diagnostics.warn(Warning::CellWithoutSlot {
                    table: table_id,
                    row: r,
                    cell: ci,
                });
                continue;
            }
            let free = (col..columns)
                .take_while(|&k| !is_reserved(k, &reserved))
                .count();
            let mut span = cell.grid_span.max(1) as usize;
            if span > free {
                diagnostics.warn(Warning::GridSpanClipped {
                    table: table_id,
                    row: r,
                    columns,
                    clipped_to: free as u32,
                });
                span = free;
            }

            let style = cascade(r, ci);
            let mut slot = GridSlot {
                column: col,
                grid_span: span,
                row_span: 1,
                merge: MergeRole::Solo,
                cell: Some(ci),
                origin: None,
                style,
            };
            match cell.vertical_merge {
                Some(VerticalMerge::Continue) => match open_merge[col] {
                    Some(origin) => {
                        slot.merge = MergeRole::SpanContinue;
                        slot.origin = Some(origin);
                    }
                    None => {
                        diagnostics.warn(Warning::OrphanMergeContinuation {
                            table: table_id,
                            row: r,
                            column: col,
                        });
                    }
                },
                Some(VerticalMerge::Restart) => slot.merge = MergeRole::SpanStart,
                None => {
                    if let Some(n) = cell.row_span.filter(|n| *n > 1) {
                        slot.merge = MergeRole::SpanStart;
                        for k in col..col + span {
                            reserved[k] = Some(Reservation {
                                origin: (r, col),
                                rows_left: n as usize - 1,
                            });
                        }
                    }
                }
            }
            let merge_origin = match slot.merge {
                MergeRole::SpanStart if cell.vertical_merge.is_some() => Some((r, col)),
                MergeRole::SpanContinue => slot.origin,
                _ => None,
            };
            for k in col..col + span {
                open_merge[k] = merge_origin;
            }
            slots[col] = Some(slot);
            col += span;
        }

        // Consume this row's share of the explicit reservations.
        for res in reserved.iter_mut().flatten() {
            if res.origin.0 < r {
                res.rows_left = res.rows_left.saturating_sub(1);
            }
        }

        rows.push(finish_row(slots, &empty_style, &mut open_merge));
    }

    if reserved.iter().flatten().any(|res| res.rows_left > 0) {
        let mut origins: Vec<usize> = reserved
            .iter()
            .flatten()
            .filter(|res| res.rows_left > 0)
            .map(|res| res.origin.0)
            .collect();
        origins.dedup();
        for row in origins {
            diagnostics.warn(Warning::RowSpanClipped {
                table: table_id,
                row,
            });
        }
    }

    let mut grid = TableGrid { columns, rows };
    grid.count_row_spans();
    grid
}

/// Fill uncovered columns with empty solo slots and drop the `Option`s.
fn finish_row(
    slots: Vec<Option<GridSlot>>,
    empty_style: &Arc<ResolvedStyle>,
    open_merge: &mut [Option<(usize, usize)>],
) -> Vec<GridSlot> {
    let mut out = Vec::new();
    let mut c = 0;
    while c < slots.len() {
        match &slots[c] {
            Some(slot) => {
                c += slot.grid_span.max(1);
                out.push(slot.clone());
            }
            None => {
                open_merge[c] = None;
                out.push(GridSlot {
                    column: c,
                    grid_span: 1,
                    row_span: 1,
                    merge: MergeRole::Solo,
                    cell: None,
                    origin: None,
                    style: empty_style.clone(),
                });
                c += 1;
            }
        }
    }
    out
}

impl TableGrid {
    /// Set `row_span` on every span start from its continuations.
    fn count_row_spans(&mut self) {
        for r in 0..self.rows.len() {
            for s in 0..self.rows[r].len() {
                if self.rows[r][s].merge != MergeRole::SpanStart {
                    continue;
                }
                let origin = (r, self.rows[r][s].column);
                let continued = self.rows[r + 1..]
                    .iter()
                    .take_while(|row| {
                        row.iter().any(|slot| {
                            slot.merge == MergeRole::SpanContinue && slot.origin == Some(origin)
                        })
                    })
                    .count();
                self.rows[r][s].row_span = 1 + continued;
            }
        }
    }

    /// Sum of column occupancy in a row; equals `columns` for every row.
    pub fn occupancy(&self, row: usize) -> usize {
        self.rows
            .get(row)
            .map_or(0, |slots| slots.iter().map(|s| s.grid_span).sum())
    }

    /// Consecutive row ranges that must stay on one page together.
    pub fn row_groups(&self) -> Vec<Range<usize>> {
        let mut groups = Vec::new();
        let mut start = 0;
        while start < self.rows.len() {
            let mut end = start;
            let mut k = start;
            while k <= end {
                for slot in &self.rows[k] {
                    if slot.merge == MergeRole::SpanStart {
                        end = end.max(k + slot.row_span - 1);
                    }
                }
                k += 1;
            }
            let end = end.min(self.rows.len() - 1);
            groups.push(start..end + 1);
            start = end + 1;
        }
        groups
    }

    /// Geometry pass: row heights from measured content.
    ///
    /// `content_height(row, slot)` is the height a slot's content needs,
    /// padding included. Single-row slots size their own row; a spanning
    /// cell that needs more than its rows provide grows the last row of
    /// its span.
    pub fn row_heights(
        &self,
        min_heights: &[Option<f64>],
        content_height: impl Fn(usize, usize) -> f64,
    ) -> Vec<f64> {
        let mut heights: Vec<f64> = (0..self.rows.len())
            .map(|r| min_heights.get(r).copied().flatten().unwrap_or(0.0).max(0.0))
            .collect();
        for (r, slots) in self.rows.iter().enumerate() {
            for (s, slot) in slots.iter().enumerate() {
                if slot.merge != MergeRole::SpanContinue && slot.row_span <= 1 {
                    heights[r] = heights[r].max(content_height(r, s));
                }
            }
        }
        for (r, slots) in self.rows.iter().enumerate() {
            for (s, slot) in slots.iter().enumerate() {
                if slot.merge == MergeRole::SpanStart && slot.row_span > 1 {
                    let last = (r + slot.row_span - 1).min(self.rows.len() - 1);
                    let covered: f64 = heights[r..=last].iter().sum();
                    let deficit = content_height(r, s) - covered;
                    if deficit > 0.0 {
                        heights[last] += deficit;
                    }
                }
            }
        }
        heights
    }

    /// Rectangle of a slot relative to the table origin. Span starts cover
    /// their whole span; continuations get their own row's box.
    pub fn slot_rect(&self, row: usize, slot: usize, widths: &[f64], heights: &[f64]) -> Rect {
        let Some(s) = self.rows.get(row).and_then(|r| r.get(slot)) else {
            return Rect::default();
        };
        let rows = if s.merge == MergeRole::SpanStart {
            s.row_span.max(1)
        } else {
            1
        };
        let last = (row + rows).min(heights.len());
        Rect {
            x: column_x_offset(s.column, widths),
            y: heights[..row.min(heights.len())].iter().sum(),
            width: span_width(s.column, s.column + s.grid_span, widths),
            height: heights[row.min(last)..last].iter().sum(),
        }
    }
}

/// Resolve concrete column widths for a table `available` points wide.
///
/// Declared grid widths are kept when they fit and scaled down when they
/// don't; `Points`/`Percent` table widths stretch or shrink the grid to
/// match. Without a declared grid the width is divided evenly.
pub fn column_widths(declared: &[f64], columns: usize, width: TableWidth, available: f64) -> Vec<f64> {
    if columns == 0 {
        return Vec::new();
    }
    let target = match width {
        TableWidth::Points(points) if points > 0.0 => Some(points.min(available)),
        TableWidth::Percent(pct) if pct > 0.0 => Some(available * (pct / 100.0).min(1.0)),
        _ => None,
    };
    let declared: Vec<f64> = (0..columns)
        .map(|c| declared.get(c).copied().unwrap_or(0.0).max(0.0))
        .collect();
    let declared_total: f64 = declared.iter().sum();
    if declared_total <= 0.0 {
        let total = target.unwrap_or(available);
        return vec![total / columns as f64; columns];
    }
    let total = match target {
        Some(t) => t,
        None if declared_total > available => available,
        None => return declared,
    };
    let scale = total / declared_total;
    declared.iter().map(|w| w * scale).collect()
}

/// X offset of a column from the table's left edge.
pub fn column_x_offset(col: usize, widths: &[f64]) -> f64 {
    widths.iter().take(col).sum()
}

/// Width covered by columns `start..end`.
pub fn span_width(start: usize, end: usize, widths: &[f64]) -> f64 {
    widths
        .iter()
        .skip(start)
        .take(end.saturating_sub(start))
        .sum()
}
