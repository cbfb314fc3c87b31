//! # Pagination
//!
//! A small state machine over a queue of pending work:
//!
//! ```text
//! AwaitingSection ─► FlowingBody ─► PlacingFootnotes ─► ClosingPage
//!        ▲                                                  │
//!        └──────────────── more content ◄───────────────────┘
//! ```
//!
//! Split elements go back to the front of the queue with the line or row
//! they resume at, so a page only ever sees "the next thing to place".

use std::collections::{HashSet, VecDeque};

use crate::diagnostics::{Diagnostics, Warning};
use crate::error::LayoutError;
use crate::font::FontFace;
use crate::model::{Document, Edges, ElementId, ElementKind, FieldKind, Image, NoteKind, Rect, Size};
use crate::options::LayoutOptions;
use crate::section::{HeaderFooterRefs, HeaderFooterVariant, Section, SectionStart};
use crate::style::{ResolvedStyle, DEFAULT_FONT_FAMILY, DEFAULT_FONT_SIZE};

use super::measure::{placeholder_block, Measurer};
use super::notes::{NoteRegistry, PageNotes};
use super::page_break::{decide_break, BreakDecision, BreakRules};
use super::{
    resolve_fields, BlockKind, FootnoteArea, LayoutBlock, LayoutContent, LayoutPage, PlacedNote,
};

const EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowState {
    AwaitingSection,
    FlowingBody,
    PlacingFootnotes,
    ClosingPage,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
enum FlowItem {
    /// An element, resuming at line or row `from`.
    Element { id: ElementId, from: usize },
    PageBreak,
    ColumnBreak,
    /// The `index`-th break in the body, starting `section`.
    SectionBreak { index: usize, section: usize },
}

enum Outcome {
    Placed,
    /// Continue with this item in the next region.
    Full(FlowItem),
    /// Continue with this item on a fresh page.
    NewPage(FlowItem),
}

/// A body block on the open page, with what it takes to undo it.
struct PlacedBody {
    block: LayoutBlock,
    id: ElementId,
    from: usize,
    /// Footnotes this block put on the page.
    added_notes: Vec<String>,
    /// The rest of the element sits at the front of the queue.
    split: bool,
}

/// The page being filled.
struct PageCursor {
    number: u32,
    display: String,
    section: usize,
    size: Size,
    margins: Edges,
    content: Rect,
    columns: Vec<(f64, f64)>,
    column: usize,
    column_blocks: usize,
    y: f64,
    body_top: f64,
    body_bottom: f64,
    header: Option<LayoutBlock>,
    footer: Option<LayoutBlock>,
    footnotes: Option<LayoutBlock>,
    body: Vec<PlacedBody>,
    notes: PageNotes,
    /// Height currently held back for footnotes.
    reserve: f64,
}

impl PageCursor {
    /// `(x, width)` of the active column.
    fn region(&self) -> (f64, f64) {
        self.columns
            .get(self.column)
            .copied()
            .unwrap_or((self.content.x, self.content.width))
    }

    fn remaining_height(&self) -> f64 {
        self.body_bottom - self.reserve - self.y
    }

    fn region_is_empty(&self) -> bool {
        self.column_blocks == 0
    }

    fn finalize(self) -> LayoutPage {
        let mut blocks = Vec::with_capacity(self.body.len() + 3);
        blocks.extend(self.header);
        blocks.extend(self.body.into_iter().map(|placed| placed.block));
        blocks.extend(self.footnotes);
        blocks.extend(self.footer);
        LayoutPage {
            number: self.number,
            display_number: self.display,
            section: self.section,
            size: self.size,
            margins: self.margins,
            blocks,
        }
    }
}

pub(crate) struct Paginator<'a> {
    document: &'a Document,
    sections: Vec<Section>,
    measurer: Measurer<'a>,
    options: &'a LayoutOptions,
    diagnostics: Diagnostics,
    errors: Vec<LayoutError>,
    notes: NoteRegistry,
    queue: VecDeque<FlowItem>,
    state: FlowState,
    section: usize,
    /// Pages opened since the active section began.
    section_pages: usize,
    last_display: u32,
    pages: Vec<LayoutPage>,
    page: Option<PageCursor>,
    /// Footnotes that did not fit the previous page's area.
    carried: Vec<String>,
    endnotes_queued: bool,
    reported_sections: HashSet<usize>,
    reported_parts: HashSet<String>,
}

impl<'a> Paginator<'a> {
    pub(crate) fn new(
        document: &'a Document,
        sections: Vec<Section>,
        measurer: Measurer<'a>,
        options: &'a LayoutOptions,
        mut diagnostics: Diagnostics,
    ) -> Self {
        let mut queue = VecDeque::with_capacity(document.body.len());
        for &id in &document.body {
            let Some(element) = document.get(id) else {
                diagnostics.warn(Warning::DanglingElement { element: id });
                continue;
            };
            queue.push_back(match element.kind {
                ElementKind::PageBreak => FlowItem::PageBreak,
                ElementKind::ColumnBreak => FlowItem::ColumnBreak,
                ElementKind::SectionBreak { section } => FlowItem::SectionBreak {
                    index: section,
                    section,
                },
                _ => FlowItem::Element { id, from: 0 },
            });
        }
        let sections = if sections.is_empty() {
            vec![Section::default()]
        } else {
            sections
        };

        Self {
            document,
            sections,
            measurer,
            options,
            diagnostics,
            errors: Vec::new(),
            notes: NoteRegistry::new(),
            queue,
            state: FlowState::AwaitingSection,
            section: 0,
            section_pages: 0,
            last_display: 0,
            pages: Vec::new(),
            page: None,
            carried: Vec::new(),
            endnotes_queued: false,
            reported_sections: HashSet::new(),
            reported_parts: HashSet::new(),
        }
    }

    pub(crate) fn run(mut self) -> (Vec<LayoutPage>, Diagnostics, Vec<LayoutError>) {
        while self.state != FlowState::Done {
            match self.state {
                FlowState::AwaitingSection => self.await_section(),
                FlowState::FlowingBody => self.flow_body(),
                FlowState::PlacingFootnotes => {
                    self.place_footnotes();
                    self.state = FlowState::ClosingPage;
                }
                FlowState::ClosingPage => self.close_page(),
                FlowState::Done => {}
            }
        }

        let total = self.pages.len().to_string();
        for block in self.pages.iter_mut().flat_map(|p| p.blocks.iter_mut()) {
            resolve_fields(block, FieldKind::NumPages, &total);
        }
        (self.pages, self.diagnostics, self.errors)
    }

    // ── Sections ────────────────────────────────────────────────

    fn await_section(&mut self) {
        let section = &self.sections[self.section];
        if section.has_positive_content_box() {
            self.open_page();
            self.state = FlowState::FlowingBody;
            return;
        }

        if self.reported_sections.insert(self.section) {
            let content = section.content_box();
            let error = LayoutError::NonPositiveContentBox {
                section: self.section,
                width: content.width,
                height: content.height,
            };
            log::error!("{error}");
            self.errors.push(error);
        }
        // Nothing in this section has anywhere to go.
        while let Some(item) = self.queue.pop_front() {
            if let FlowItem::SectionBreak { index, section } = item {
                self.enter_section(index, section);
                return;
            }
        }
        self.carried.clear();
        self.state = FlowState::Done;
    }

    /// Make `section` active. False (and a warning) when the document
    /// declares no such section.
    fn enter_section(&mut self, index: usize, section: usize) -> bool {
        if section >= self.sections.len() {
            self.diagnostics.warn(Warning::ExtraSectionBreak {
                index,
                reused: self.section,
            });
            return false;
        }
        log::debug!("section {section} begins");
        self.section = section;
        self.section_pages = 0;
        true
    }

    fn section_break(&mut self, page: &mut PageCursor, index: usize, section: usize) {
        let current = self.section;
        if !self.enter_section(index, section) {
            return;
        }
        let (next, previous) = (&self.sections[section], &self.sections[current]);
        let same_frame =
            next.same_page_geometry(previous) && next.columns.count == previous.columns.count;
        let start = next.start;
        match start {
            SectionStart::Continuous if same_frame => {
                // The current page counts as the section's first.
                self.section_pages = 1;
            }
            SectionStart::NextColumn if same_frame && page.column + 1 < page.columns.len() => {
                self.section_pages = 1;
                self.next_region(page);
            }
            _ => self.state = FlowState::PlacingFootnotes,
        }
    }

    // ── Opening pages ───────────────────────────────────────────

    fn open_page(&mut self) {
        let section = self.sections[self.section].clone();
        let first_of_section = self.section_pages == 0;
        let mut display = match section.numbering.start {
            Some(start) if first_of_section => start,
            _ => self.last_display.saturating_add(1),
        };

        if first_of_section && !self.pages.is_empty() {
            let wrong_parity = match section.start {
                SectionStart::EvenPage => display % 2 == 1,
                SectionStart::OddPage => display % 2 == 0,
                _ => false,
            };
            if wrong_parity {
                let number = self.pages.len() as u32 + 1;
                log::debug!("blank page {number} inserted before section {}", self.section);
                self.pages.push(LayoutPage {
                    number,
                    display_number: section.numbering.format.format(display),
                    section: self.section,
                    size: section.page_size,
                    margins: section.margins,
                    blocks: Vec::new(),
                });
                display = display.saturating_add(1);
            }
        }

        let number = self.pages.len() as u32 + 1;
        let display_text = section.numbering.format.format(display);
        self.section_pages += 1;
        self.last_display = display;

        let variant = if section.title_page && first_of_section {
            HeaderFooterVariant::First
        } else if self.document.settings.even_and_odd_headers && display % 2 == 0 {
            HeaderFooterVariant::Even
        } else {
            HeaderFooterVariant::Default
        };
        let content = section.content_box();

        let mut body_top = content.y;
        let header = self
            .part_block(&section.headers, variant, BlockKind::Header, content, &display_text)
            .map(|mut block| {
                block.translate(0.0, section.header_distance);
                body_top = body_top.max(block.frame.bottom());
                block
            });
        let mut body_bottom = content.bottom();
        let footer = self
            .part_block(&section.footers, variant, BlockKind::Footer, content, &display_text)
            .map(|mut block| {
                let y = section.page_size.height - section.footer_distance - block.frame.height;
                block.translate(0.0, y);
                body_bottom = body_bottom.min(block.frame.y);
                block
            });

        let mut page = PageCursor {
            number,
            display: display_text,
            section: self.section,
            size: section.page_size,
            margins: section.margins,
            content,
            columns: section.column_boxes(),
            column: 0,
            column_blocks: 0,
            y: body_top,
            body_top,
            body_bottom,
            header,
            footer,
            footnotes: None,
            body: Vec::new(),
            notes: PageNotes::default(),
            reserve: 0.0,
        };
        for id in std::mem::take(&mut self.carried) {
            page.notes.register(&id);
        }
        page.reserve = self.footnote_reserve(&page);
        log::debug!(
            "page {number} opened (printed as {}, section {})",
            page.display,
            self.section
        );
        self.page = Some(page);
    }

    /// Measure the header or footer part for `variant`, placed at the
    /// content box's left edge and y = 0. First and even variants fall back
    /// to the default part.
    fn part_block(
        &mut self,
        refs: &HeaderFooterRefs,
        variant: HeaderFooterVariant,
        kind: BlockKind,
        content: Rect,
        display: &str,
    ) -> Option<LayoutBlock> {
        let part = refs
            .get(variant)
            .or_else(|| refs.get(HeaderFooterVariant::Default))?;
        let document = self.document;
        let Some(ids) = document.headers_footers.get(part) else {
            if self.reported_parts.insert(part.to_string()) {
                self.diagnostics.warn(Warning::MissingHeaderFooter {
                    id: part.to_string(),
                });
            }
            return None;
        };

        let region = self
            .measurer
            .region(ids, content.width, None, &mut self.diagnostics);
        let mut block = LayoutBlock {
            frame: Rect {
                x: 0.0,
                y: 0.0,
                width: content.width,
                height: region.height,
            },
            kind,
            element: None,
            continued: false,
            style: ResolvedStyle::default(),
            content: LayoutContent::Region {
                part: part.to_string(),
                blocks: region.blocks,
            },
        };
        block.translate(content.x, 0.0);
        resolve_fields(&mut block, FieldKind::Page, display);
        Some(block)
    }

    // ── Body flow ───────────────────────────────────────────────

    fn flow_body(&mut self) {
        let Some(item) = self.queue.pop_front() else {
            self.state = FlowState::PlacingFootnotes;
            return;
        };
        let Some(mut page) = self.page.take() else {
            self.queue.push_front(item);
            self.state = FlowState::AwaitingSection;
            return;
        };

        match item {
            FlowItem::PageBreak => self.state = FlowState::PlacingFootnotes,
            FlowItem::ColumnBreak => self.next_region(&mut page),
            FlowItem::SectionBreak { index, section } => {
                self.section_break(&mut page, index, section)
            }
            FlowItem::Element { id, from } => match self.place_element(&mut page, id, from) {
                Outcome::Placed => {}
                Outcome::Full(rest) => {
                    self.queue.push_front(rest);
                    self.next_region(&mut page);
                }
                Outcome::NewPage(rest) => {
                    self.queue.push_front(rest);
                    self.state = FlowState::PlacingFootnotes;
                }
            },
        }
        self.page = Some(page);
    }

    /// Move to the next column, or finish the page after the last one.
    fn next_region(&mut self, page: &mut PageCursor) {
        if page.column + 1 < page.columns.len() {
            page.column += 1;
            page.column_blocks = 0;
            page.y = page.body_top;
        } else {
            self.state = FlowState::PlacingFootnotes;
        }
    }

    fn place_element(&mut self, page: &mut PageCursor, id: ElementId, from: usize) -> Outcome {
        let document = self.document;
        let Some(element) = document.get(id) else {
            self.diagnostics.warn(Warning::DanglingElement { element: id });
            return Outcome::Placed;
        };
        match &element.kind {
            ElementKind::Paragraph(_) => self.place_paragraph(page, id, from),
            ElementKind::Table(_) => self.place_table(page, id, from),
            ElementKind::Image(image) => self.place_image(page, id, image),
            ElementKind::PageBreak | ElementKind::ColumnBreak | ElementKind::SectionBreak { .. } => {
                Outcome::Placed
            }
        }
    }

    fn place_paragraph(&mut self, page: &mut PageCursor, id: ElementId, from: usize) -> Outcome {
        let (x, width) = page.region();
        let measured = self
            .measurer
            .paragraph(id, width, Some(&mut self.notes), &mut self.diagnostics);
        let style = &measured.style;
        if from == 0 && style.page_break_before() && !page.body.is_empty() {
            return Outcome::NewPage(FlowItem::Element { id, from });
        }

        let total = measured.lines.len();
        if total == 0 {
            return Outcome::Placed;
        }
        let heights = measured.line_heights(from);
        let remaining = page.remaining_height();
        let breakable = !style.keep_lines();
        let rules = if style.widow_control() {
            BreakRules::new(self.options.orphan_lines, self.options.widow_lines)
        } else {
            BreakRules::NONE
        };

        let end = match decide_break(remaining, &heights, breakable, rules) {
            BreakDecision::Place => total,
            BreakDecision::Split { lines_here } => from + lines_here,
            BreakDecision::MoveToNextPage if !page.region_is_empty() => {
                return Outcome::Full(FlowItem::Element { id, from });
            }
            BreakDecision::MoveToNextPage => {
                // An empty region takes whatever makes progress.
                let end = if breakable {
                    match decide_break(remaining, &heights, true, BreakRules::NONE) {
                        BreakDecision::Split { lines_here } => from + lines_here,
                        _ => from + 1,
                    }
                } else {
                    total
                };
                let height: f64 = heights[..end - from].iter().sum();
                if height > remaining + EPSILON {
                    self.diagnostics.warn(Warning::Overflow {
                        element: id,
                        height,
                        available: remaining.max(0.0),
                    });
                }
                end
            }
        };

        let block = measured.block(from..end, x, page.y);
        let notes = measured.notes(from..end);
        let split = end < total;
        self.push_body(page, block, id, from, &notes, split);
        if split {
            Outcome::Full(FlowItem::Element { id, from: end })
        } else {
            Outcome::Placed
        }
    }

    fn place_table(&mut self, page: &mut PageCursor, id: ElementId, from: usize) -> Outcome {
        let (x, width) = page.region();
        let Some(table) = self
            .measurer
            .table(id, width, Some(&mut self.notes), &mut self.diagnostics)
        else {
            let block = placeholder_block(
                id,
                BlockKind::Table,
                "table has no rows or columns",
                x,
                page.y,
                width,
            );
            self.push_body(page, block, id, from, &[], false);
            return Outcome::Placed;
        };

        let rows = table.row_count();
        let header_rows = table.header_rows;
        let repeat = from > 0 && header_rows > 0 && self.options.repeat_header_rows;
        let repeated_height = if repeat {
            table.rows_height(0..header_rows)
        } else {
            0.0
        };
        let remaining = page.remaining_height();

        let mut used = repeated_height;
        let mut end = from;
        for group in table.groups.iter().filter(|g| g.start >= from) {
            let height = table.rows_height(group.clone());
            if used + height > remaining + EPSILON {
                break;
            }
            used += height;
            end = group.end;
        }
        // Header rows alone are not worth a page.
        if from == 0 && end <= header_rows && end < rows {
            end = from;
        }

        if end == from {
            if !page.region_is_empty() {
                return Outcome::Full(FlowItem::Element { id, from });
            }
            // Force the first group with body rows in it.
            let mut last = from..from;
            for group in table.groups.iter().filter(|g| g.start >= from) {
                last = group.clone();
                if group.end > header_rows || from > 0 {
                    break;
                }
            }
            end = last.end.max(from + 1).min(rows);
            let group_height = table.rows_height(last.clone());
            if group_height > remaining + EPSILON {
                let error = LayoutError::RowExceedsPage {
                    table: id,
                    first_row: last.start,
                    last_row: last.end.saturating_sub(1),
                    height: group_height,
                    available: remaining.max(0.0),
                };
                log::error!("{error}");
                self.errors.push(error);
            } else {
                self.diagnostics.warn(Warning::Overflow {
                    element: id,
                    height: repeated_height + table.rows_height(from..end),
                    available: remaining.max(0.0),
                });
            }
        }

        let mut order: Vec<usize> = if repeat {
            (0..header_rows).collect()
        } else {
            Vec::new()
        };
        order.extend(from..end);
        let block = table.block(&order, x, page.y, from > 0);
        let notes = table.notes(from..end);
        let split = end < rows;
        self.push_body(page, block, id, from, &notes, split);
        if split {
            Outcome::Full(FlowItem::Element { id, from: end })
        } else {
            Outcome::Placed
        }
    }

    fn place_image(&mut self, page: &mut PageCursor, id: ElementId, image: &Image) -> Outcome {
        let (x, width) = page.region();
        let measured = self.measurer.image(id, image, width, &mut self.diagnostics);
        let remaining = page.remaining_height();
        if measured.size.height > remaining + EPSILON {
            if !page.region_is_empty() {
                return Outcome::Full(FlowItem::Element { id, from: 0 });
            }
            self.diagnostics.warn(Warning::Overflow {
                element: id,
                height: measured.size.height,
                available: remaining.max(0.0),
            });
        }
        let block = measured.block(x, page.y, width);
        self.push_body(page, block, id, 0, &[], false);
        Outcome::Placed
    }

    fn push_body(
        &mut self,
        page: &mut PageCursor,
        mut block: LayoutBlock,
        id: ElementId,
        from: usize,
        notes: &[(NoteKind, String)],
        split: bool,
    ) {
        resolve_fields(&mut block, FieldKind::Page, &page.display);
        page.y += block.frame.height;
        page.column_blocks += 1;

        let added_notes: Vec<String> = notes
            .iter()
            .filter(|(kind, _)| *kind == NoteKind::Footnote)
            .filter(|(_, note)| page.notes.register(note))
            .map(|(_, note)| note.clone())
            .collect();
        if !added_notes.is_empty() {
            page.reserve = self.footnote_reserve(page);
        }
        page.body.push(PlacedBody {
            block,
            id,
            from,
            added_notes,
            split,
        });
    }

    // ── Footnotes ───────────────────────────────────────────────

    fn footnote_cap(&self, page: &PageCursor) -> f64 {
        page.size.height * self.options.footnote_fraction()
    }

    /// Separator plus every note body, or zero with no notes.
    fn footnotes_height(&mut self, ids: &[String], width: f64) -> f64 {
        if ids.is_empty() {
            return 0.0;
        }
        let notes: f64 = ids
            .iter()
            .map(|id| {
                self.measurer
                    .note(
                        NoteKind::Footnote,
                        id,
                        width,
                        &mut self.notes,
                        &mut self.diagnostics,
                    )
                    .height
            })
            .sum();
        self.options.footnote_separator_height.max(0.0) + notes
    }

    fn footnote_reserve(&mut self, page: &PageCursor) -> f64 {
        let needed = self.footnotes_height(page.notes.ids(), page.content.width);
        needed.min(self.footnote_cap(page))
    }

    /// Line height of the last body block, for the overflow tolerance.
    fn last_line_height(&self, page: &PageCursor) -> f64 {
        let last_line = page.body.last().and_then(|placed| match &placed.block.content {
            LayoutContent::Paragraph(p) => p.lines.last().map(|line| line.frame.height),
            _ => None,
        });
        last_line.unwrap_or_else(|| {
            self.measurer
                .fonts()
                .line_height(&FontFace::new(DEFAULT_FONT_FAMILY, DEFAULT_FONT_SIZE))
        })
    }

    fn place_footnotes(&mut self) {
        let Some(mut page) = self.page.take() else {
            return;
        };
        let cap = self.footnote_cap(&page);
        let width = page.content.width;

        let mut reflowed = false;
        loop {
            if page.notes.is_empty() || page.body.is_empty() {
                break;
            }
            let area = self.footnotes_height(page.notes.ids(), width).min(cap);
            let limit = page.body_bottom - area;
            let bottom = page
                .body
                .iter()
                .map(|placed| placed.block.frame.bottom())
                .fold(f64::MIN, f64::max);
            let overflow = bottom - limit;
            if overflow <= EPSILON {
                break;
            }
            let tolerance = self
                .options
                .footnote_overflow_tolerance
                .resolve(self.last_line_height(&page));
            if overflow <= tolerance + EPSILON {
                self.diagnostics.info(Warning::FootnoteOverflowAccepted {
                    page: page.number,
                    overflow,
                    tolerance,
                });
                break;
            }
            if !reflowed && page.body.len() > 1 {
                reflowed = true;
                self.reflow_last(&mut page, overflow);
                continue;
            }
            self.diagnostics.warn(Warning::FootnoteOverflow {
                page: page.number,
                overflow,
            });
            break;
        }

        if !page.notes.is_empty() {
            let block = self.footnote_area(&mut page, cap);
            page.margins.bottom = page.margins.bottom.max(page.size.height - block.frame.y);
            page.footnotes = Some(block);
        }
        self.page = Some(page);
    }

    /// Take the last body block off the page and put its element back at
    /// the front of the queue.
    fn reflow_last(&mut self, page: &mut PageCursor, overflow: f64) {
        let Some(last) = page.body.pop() else {
            return;
        };
        for note in &last.added_notes {
            page.notes.remove(note);
        }
        if last.split {
            self.queue.pop_front();
        }
        self.queue.push_front(FlowItem::Element {
            id: last.id,
            from: last.from,
        });
        page.reserve = self.footnote_reserve(page);
        self.diagnostics.warn(Warning::FootnoteReflow {
            page: page.number,
            overflow,
            element: last.id,
        });
    }

    /// Stack note bodies under the separator until the cap. The first note
    /// always goes in; the rest carry over to the next page.
    fn footnote_area(&mut self, page: &mut PageCursor, cap: f64) -> LayoutBlock {
        let width = page.content.width;
        let separator = self.options.footnote_separator_height.max(0.0);
        let ids = page.notes.ids().to_vec();

        let mut used = separator;
        let mut placed = Vec::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            let region = self.measurer.note(
                NoteKind::Footnote,
                id,
                width,
                &mut self.notes,
                &mut self.diagnostics,
            );
            if i > 0 && used + region.height > cap + EPSILON {
                let needed = self.footnotes_height(&ids, width);
                self.carried = page.notes.split_off(i);
                self.diagnostics.warn(Warning::FootnoteAreaTruncated {
                    page: page.number,
                    needed,
                    limit: cap,
                });
                break;
            }
            let mut blocks = region.blocks.clone();
            for block in &mut blocks {
                block.translate(0.0, used);
            }
            used += region.height;
            placed.push(PlacedNote {
                kind: NoteKind::Footnote,
                id: id.clone(),
                ordinal: self.notes.ordinal(NoteKind::Footnote, id),
                blocks,
            });
        }

        let mut block = LayoutBlock {
            frame: Rect {
                x: 0.0,
                y: 0.0,
                width,
                height: used,
            },
            kind: BlockKind::Footnotes,
            element: None,
            continued: false,
            style: ResolvedStyle::default(),
            content: LayoutContent::Footnotes(FootnoteArea {
                separator: Rect {
                    x: 0.0,
                    y: 0.0,
                    width: width / 3.0,
                    height: separator,
                },
                notes: placed,
            }),
        };
        block.translate(page.content.x, page.body_bottom - used);
        resolve_fields(&mut block, FieldKind::Page, &page.display);
        block
    }

    // ── Closing ─────────────────────────────────────────────────

    fn close_page(&mut self) {
        if let Some(page) = self.page.take() {
            log::debug!(
                "page {} closed with {} body block(s)",
                page.number,
                page.body.len()
            );
            self.pages.push(page.finalize());
        }
        if self.queue.is_empty() && !self.endnotes_queued {
            self.endnotes_queued = true;
            self.queue_endnotes();
        }
        self.state = if self.queue.is_empty() && self.carried.is_empty() {
            FlowState::Done
        } else {
            FlowState::AwaitingSection
        };
    }

    /// Endnote bodies follow the body, in reference order.
    fn queue_endnotes(&mut self) {
        let document = self.document;
        let endnotes = self.notes.endnotes().to_vec();
        if endnotes.is_empty() {
            return;
        }
        log::debug!("{} endnote(s) follow the body", endnotes.len());
        for note in &endnotes {
            let Some(ids) = document.note(NoteKind::Endnote, note) else {
                continue;
            };
            for &id in ids {
                if matches!(
                    document.get(id).map(|e| &e.kind),
                    Some(ElementKind::Paragraph(_) | ElementKind::Table(_) | ElementKind::Image(_))
                ) {
                    self.queue.push_back(FlowItem::Element { id, from: 0 });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::diagnostics::Severity;
    use crate::layout::{LayoutEngine, LayoutResult};
    use crate::model::{
        Document, FieldKind, Paragraph, Run, RunContent, SourceBlock, SourceDocument, SourceNote,
        SourcePart,
    };
    use crate::section::{HeaderFooterRefs, RawSection};

    use super::*;

    /// 200 x 144pt page with half-inch margins: a 128 x 72pt content box,
    /// six 11.5pt lines tall.
    fn small_section() -> RawSection {
        RawSection {
            page_width: Some(4000.0.into()),
            page_height: Some(2880.0.into()),
            margin_top: Some(720.0.into()),
            margin_right: Some(720.0.into()),
            margin_bottom: Some(720.0.into()),
            margin_left: Some(720.0.into()),
            ..Default::default()
        }
    }

    fn lay_out(source: SourceDocument) -> LayoutResult {
        LayoutEngine::default().layout(&Document::from_source(source))
    }

    fn lines(n: usize) -> Vec<SourceBlock> {
        (0..n).map(|_| SourceBlock::paragraph("aaaa")).collect()
    }

    fn warnings(result: &LayoutResult) -> Vec<&Warning> {
        result
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .map(|d| &d.warning)
            .collect()
    }

    #[test]
    fn paragraphs_fill_pages_in_order() {
        let result = lay_out(SourceDocument {
            body: lines(10),
            sections: vec![small_section()],
            ..Default::default()
        });
        let pages = &result.layout.pages;
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].body_blocks().count(), 6);
        assert_eq!(pages[1].body_blocks().count(), 4);
        assert_eq!(pages[1].blocks[0].frame.y, 36.0);
        assert_eq!(pages[1].blocks[0].element, Some(ElementId(6)));
        assert!(result.is_clean());
    }

    #[test]
    fn page_break_always_starts_a_page() {
        let result = lay_out(SourceDocument {
            body: vec![
                SourceBlock::paragraph("aaaa"),
                SourceBlock::PageBreak,
                SourceBlock::paragraph("aaaa"),
            ],
            sections: vec![small_section()],
            ..Default::default()
        });
        assert_eq!(result.layout.pages.len(), 2);
    }

    #[test]
    fn columns_fill_left_to_right() {
        let mut section = small_section();
        section.columns = Some(2.0.into());
        section.column_spacing = Some(0.0.into());
        let result = lay_out(SourceDocument {
            body: lines(8),
            sections: vec![section],
            ..Default::default()
        });
        let pages = &result.layout.pages;
        assert_eq!(pages.len(), 1);
        let xs: Vec<f64> = pages[0].body_blocks().map(|b| b.frame.x).collect();
        assert_eq!(xs[0], 36.0);
        assert_eq!(xs[6], 100.0);
        assert_eq!(pages[0].blocks[6].frame.y, 36.0);
    }

    #[test]
    fn widow_control_moves_lines_forward() {
        // Five words per line at this width: the second paragraph has six
        // lines, and only five fit under the first.
        let long = vec!["aaaa"; 30].join(" ");
        let mut body = lines(1);
        body.push(SourceBlock::paragraph(&long));
        let result = lay_out(SourceDocument {
            body,
            sections: vec![small_section()],
            ..Default::default()
        });
        let pages = &result.layout.pages;
        let line_count = |block: &LayoutBlock| match &block.content {
            LayoutContent::Paragraph(p) => p.lines.len(),
            _ => 0,
        };
        assert_eq!(line_count(&pages[0].blocks[1]), 4);
        assert_eq!(line_count(&pages[1].blocks[0]), 2);
        assert!(pages[1].blocks[0].continued);
    }

    #[test]
    fn header_and_footer_frame_the_body() {
        let mut section = small_section();
        section.margin_top = Some(360.0.into());
        section.header_distance = Some(360.0.into());
        section.footer_distance = Some(360.0.into());
        section.headers = HeaderFooterRefs {
            default: Some("h".to_string()),
            ..Default::default()
        };
        section.footers = HeaderFooterRefs {
            default: Some("f".to_string()),
            ..Default::default()
        };
        let footer = Paragraph::text("")
            .with_run(Run::with(RunContent::Field {
                field: FieldKind::Page,
            }))
            .with_run(Run::text("/"))
            .with_run(Run::with(RunContent::Field {
                field: FieldKind::NumPages,
            }));
        let result = lay_out(SourceDocument {
            body: vec![
                SourceBlock::paragraph("aaaa"),
                SourceBlock::PageBreak,
                SourceBlock::paragraph("aaaa"),
            ],
            sections: vec![section],
            headers_footers: vec![
                SourcePart {
                    id: "h".to_string(),
                    blocks: vec![SourceBlock::paragraph("Head")],
                },
                SourcePart {
                    id: "f".to_string(),
                    blocks: vec![SourceBlock::Paragraph(footer)],
                },
            ],
            ..Default::default()
        });
        let page = &result.layout.pages[1];
        assert_eq!(page.blocks[0].kind, BlockKind::Header);
        assert!((page.blocks[0].frame.y - 18.0).abs() < 1e-9);
        // The header bottom (29.5) is below the 18pt top margin.
        assert!((page.blocks[1].frame.y - 29.5).abs() < 1e-6);
        let footer = page.blocks.last().unwrap();
        assert_eq!(footer.kind, BlockKind::Footer);
        assert_eq!(footer.text(), "2/2");
        assert!((footer.frame.bottom() - 126.0).abs() < 1e-6);
    }

    #[test]
    fn missing_header_part_warns_once() {
        let mut section = small_section();
        section.headers = HeaderFooterRefs {
            default: Some("nowhere".to_string()),
            ..Default::default()
        };
        let result = lay_out(SourceDocument {
            body: vec![
                SourceBlock::paragraph("aaaa"),
                SourceBlock::PageBreak,
                SourceBlock::paragraph("aaaa"),
            ],
            sections: vec![section],
            ..Default::default()
        });
        let missing = warnings(&result)
            .into_iter()
            .filter(|w| matches!(w, Warning::MissingHeaderFooter { .. }))
            .count();
        assert_eq!(missing, 1);
    }

    #[test]
    fn odd_page_section_inserts_a_blank_page() {
        let mut second = small_section();
        second.start_type = Some("oddPage".to_string());
        second.page_number_format = Some("lowerRoman".to_string());
        let result = lay_out(SourceDocument {
            body: vec![
                SourceBlock::paragraph("aaaa"),
                SourceBlock::SectionBreak,
                SourceBlock::paragraph("aaaa"),
            ],
            sections: vec![small_section(), second],
            ..Default::default()
        });
        let pages = &result.layout.pages;
        assert_eq!(pages.len(), 3);
        assert!(pages[1].blocks.is_empty());
        assert_eq!(pages[1].display_number, "ii");
        assert_eq!(pages[2].display_number, "iii");
        assert_eq!(pages[2].section, 1);
    }

    #[test]
    fn numbering_restarts_where_a_section_asks() {
        let mut second = small_section();
        second.page_number_start = Some(1.0.into());
        let result = lay_out(SourceDocument {
            body: vec![
                SourceBlock::paragraph("aaaa"),
                SourceBlock::SectionBreak,
                SourceBlock::paragraph("aaaa"),
            ],
            sections: vec![small_section(), second],
            ..Default::default()
        });
        let numbers: Vec<&str> = result
            .layout
            .pages
            .iter()
            .map(|p| p.display_number.as_str())
            .collect();
        assert_eq!(numbers, ["1", "1"]);
    }

    #[test]
    fn oversized_number_start_is_ignored() {
        let mut section = small_section();
        section.page_number_start = Some((u32::MAX as f64).into());
        let result = lay_out(SourceDocument {
            body: vec![
                SourceBlock::paragraph("aaaa"),
                SourceBlock::PageBreak,
                SourceBlock::paragraph("aaaa"),
            ],
            sections: vec![section],
            ..Default::default()
        });
        let numbers: Vec<&str> = result
            .layout
            .pages
            .iter()
            .map(|p| p.display_number.as_str())
            .collect();
        assert_eq!(numbers, ["1", "2"]);
        assert!(warnings(&result).iter().any(|w| matches!(
            w,
            Warning::MalformedSection {
                field: "pageNumberStart",
                ..
            }
        )));
    }

    #[test]
    fn display_numbers_saturate_at_the_top() {
        let document = Document::from_source(SourceDocument {
            body: vec![
                SourceBlock::paragraph("aaaa"),
                SourceBlock::PageBreak,
                SourceBlock::paragraph("aaaa"),
            ],
            sections: vec![small_section()],
            ..Default::default()
        });
        let mut diagnostics = Diagnostics::new();
        let mut sections = crate::section::resolve_sections(&document.sections, &mut diagnostics);
        sections[0].numbering.start = Some(u32::MAX);

        let options = LayoutOptions::default();
        let fonts = crate::font::FontBook::new();
        let styles = crate::style::StyleEngine::new(&document);
        let measurer = Measurer::new(&document, &styles, &fonts, &document.media, &options);
        let (pages, _, errors) =
            Paginator::new(&document, sections, measurer, &options, diagnostics).run();
        assert!(errors.is_empty());
        let numbers: Vec<&str> = pages.iter().map(|p| p.display_number.as_str()).collect();
        assert_eq!(numbers, ["4294967295", "4294967295"]);
    }

    #[test]
    fn continuous_section_shares_the_page() {
        let mut second = small_section();
        second.start_type = Some("continuous".to_string());
        let result = lay_out(SourceDocument {
            body: vec![
                SourceBlock::paragraph("aaaa"),
                SourceBlock::SectionBreak,
                SourceBlock::paragraph("aaaa"),
            ],
            sections: vec![small_section(), second],
            ..Default::default()
        });
        assert_eq!(result.layout.pages.len(), 1);
        assert_eq!(result.layout.pages[0].body_blocks().count(), 2);
    }

    #[test]
    fn extra_section_break_is_ignored_with_a_warning() {
        let result = lay_out(SourceDocument {
            body: vec![
                SourceBlock::paragraph("aaaa"),
                SourceBlock::SectionBreak,
                SourceBlock::paragraph("aaaa"),
            ],
            sections: vec![small_section()],
            ..Default::default()
        });
        assert_eq!(result.layout.pages.len(), 1);
        assert!(warnings(&result)
            .iter()
            .any(|w| matches!(w, Warning::ExtraSectionBreak { reused: 0, .. })));
    }

    #[test]
    fn unusable_section_is_skipped_with_an_error() {
        let mut broken = small_section();
        broken.margin_left = Some(3000.0.into());
        broken.margin_right = Some(3000.0.into());
        let result = lay_out(SourceDocument {
            body: vec![
                SourceBlock::paragraph("aaaa"),
                SourceBlock::SectionBreak,
                SourceBlock::paragraph("aaaa"),
                SourceBlock::SectionBreak,
                SourceBlock::paragraph("aaaa"),
            ],
            sections: vec![small_section(), broken, small_section()],
            ..Default::default()
        });
        assert_eq!(result.layout.pages.len(), 2);
        assert!(matches!(
            result.errors.as_slice(),
            [LayoutError::NonPositiveContentBox { section: 1, .. }]
        ));
        assert_eq!(result.layout.pages[1].section, 2);
    }

    #[test]
    fn footnotes_sit_at_the_bottom_of_their_page() {
        let result = lay_out(SourceDocument {
            body: vec![SourceBlock::Paragraph(
                Paragraph::text("aaaa").with_run(Run::footnote("n1")),
            )],
            sections: vec![small_section()],
            footnotes: vec![SourceNote {
                id: "n1".to_string(),
                blocks: vec![SourceBlock::paragraph("aaaa")],
            }],
            ..Default::default()
        });
        let page = &result.layout.pages[0];
        let area = page
            .blocks
            .iter()
            .find(|b| b.kind == BlockKind::Footnotes)
            .unwrap();
        // Separator 8pt plus one 11.5pt line, ending at the 108pt body bottom.
        assert!((area.frame.y - 88.5).abs() < 1e-6);
        assert!((page.margins.bottom - 55.5).abs() < 1e-6);
        let LayoutContent::Footnotes(footnotes) = &area.content else {
            panic!("footnote area expected");
        };
        assert_eq!(footnotes.notes[0].ordinal, 1);
        assert_eq!(area.text(), "aaaa");
    }

    #[test]
    fn endnotes_follow_the_body() {
        let result = lay_out(SourceDocument {
            body: vec![SourceBlock::Paragraph(
                Paragraph::text("aaaa").with_run(Run::endnote("e1")),
            )],
            sections: vec![small_section()],
            endnotes: vec![SourceNote {
                id: "e1".to_string(),
                blocks: vec![SourceBlock::paragraph("bbbb")],
            }],
            ..Default::default()
        });
        let pages = &result.layout.pages;
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].body_blocks().count(), 1);
        let endnote = pages[1].body_blocks().next().unwrap();
        assert_eq!(endnote.text(), "bbbb");
    }
}
