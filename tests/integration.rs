//! End-to-end tests: documents built through the public constructors (or
//! JSON), laid out with default options and the built-in metrics.
//!
//! Most documents use a 200 x 144pt page with half-inch margins. That
//! leaves a 128 x 72pt content box: six 11.5pt lines of 10pt text, and five
//! four-letter words per line.

use std::sync::Arc;
use std::thread;

use folio::assets::{AssetBarrier, MediaAsset};
use folio::layout::grid::MergeRole;
use folio::layout::{BlockKind, LayoutBlock, LayoutContent, LayoutPage};
use folio::model::{
    Container, Document, ElementId, ElementKind, Image, Paragraph, Run, SourceBlock,
    SourceDocument, SourceNote, Table, TableCell, TableRow, VerticalMerge,
};
use folio::section::RawSection;
use folio::style::{
    cascade, LineSpacing, PropertySet, RunProperties, StyleCatalog, StyleDefinition, StyleEngine,
    StyleFamily, StyleRequest, Theme,
};
use folio::{layout, layout_json, LayoutEngine, LayoutOptions, LayoutResult, Severity, Warning};
use proptest::prelude::*;

// ─── Helpers ────────────────────────────────────────────────────

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

fn small_document(body: Vec<SourceBlock>) -> SourceDocument {
    SourceDocument {
        body,
        sections: vec![small_section()],
        ..Default::default()
    }
}

fn words(n: usize) -> String {
    vec!["aaaa"; n].join(" ")
}

fn lay_out(source: SourceDocument) -> (Document, LayoutResult) {
    let doc = Document::from_source(source);
    let result = layout(&doc);
    (doc, result)
}

fn warnings(result: &LayoutResult) -> Vec<&Warning> {
    result
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Warning)
        .map(|d| &d.warning)
        .collect()
}

fn table_rows(block: &LayoutBlock) -> Vec<usize> {
    match &block.content {
        LayoutContent::Table(t) => t.rows.iter().map(|r| r.index).collect(),
        _ => Vec::new(),
    }
}

fn footnote_ordinals(page: &LayoutPage) -> Vec<(String, u32)> {
    page.blocks
        .iter()
        .filter_map(|b| match &b.content {
            LayoutContent::Footnotes(area) => Some(area),
            _ => None,
        })
        .flat_map(|area| area.notes.iter().map(|n| (n.id.clone(), n.ordinal)))
        .collect()
}

fn size(points: f64) -> PropertySet {
    PropertySet {
        run: RunProperties {
            size: Some(points),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn bold() -> PropertySet {
    PropertySet {
        run: RunProperties {
            bold: Some(true),
            ..Default::default()
        },
        ..Default::default()
    }
}

// ─── Style cascade ──────────────────────────────────────────────

#[test]
fn resolving_twice_is_idempotent() {
    let mut paragraph = Paragraph::text("aaaa").with_style("Body");
    paragraph.properties.run.italic = Some(true);
    let doc = Document::from_source(SourceDocument {
        body: vec![SourceBlock::Paragraph(paragraph)],
        styles: StyleCatalog::new(
            PropertySet::default(),
            vec![StyleDefinition::new("Body", StyleFamily::Paragraph, size(12.0))],
        ),
        ..Default::default()
    });

    let engine = StyleEngine::new(&doc);
    let first = engine.element(ElementId(0));
    let second = engine.element(ElementId(0));
    assert_eq!(*first, *second);
    assert!(Arc::ptr_eq(&first, &second));

    // A fresh pass recomputes and still agrees.
    engine.begin_pass();
    let third = engine.element(ElementId(0));
    assert_eq!(*first, *third);
    assert_eq!(third.font_size(), 12.0);
    assert!(third.italic());
}

#[test]
fn named_style_then_direct_formatting_override_in_order() {
    let theme = Theme::default();
    let mut heading = size(16.0);
    heading.run.bold = Some(true);
    let catalog = StyleCatalog::new(
        PropertySet::default(),
        vec![StyleDefinition::new("Heading", StyleFamily::Paragraph, heading)],
    );
    let empty = PropertySet::default();
    let mut warnings = Vec::new();

    let base = cascade(
        &StyleRequest::new(StyleFamily::Paragraph, None, &empty),
        &theme,
        &catalog,
        &mut warnings,
    );
    let named = cascade(
        &StyleRequest::new(StyleFamily::Paragraph, Some("Heading"), &empty),
        &theme,
        &catalog,
        &mut warnings,
    );
    let direct = size(9.0);
    let overridden = cascade(
        &StyleRequest::new(StyleFamily::Paragraph, Some("Heading"), &direct),
        &theme,
        &catalog,
        &mut warnings,
    );

    assert_eq!(base.font_family(), "Calibri");
    assert_eq!(named.font_family(), "Calibri");
    assert_eq!(named.font_size(), 16.0);
    assert!(named.bold());
    assert!(!base.bold());
    assert_eq!(overridden.font_size(), 9.0);
    assert!(overridden.bold());
    assert!(warnings.is_empty());
}

#[test]
fn cyclic_based_on_chain_resolves_with_a_warning() {
    let doc = Document::from_source(SourceDocument {
        body: vec![SourceBlock::Paragraph(Paragraph::text("aaaa").with_style("A"))],
        styles: StyleCatalog::new(
            PropertySet::default(),
            vec![
                StyleDefinition::new("A", StyleFamily::Paragraph, size(11.0)).based_on("B"),
                StyleDefinition::new("B", StyleFamily::Paragraph, bold()).based_on("A"),
            ],
        ),
        ..Default::default()
    });
    let result = layout(&doc);
    assert_eq!(result.layout.pages.len(), 1);
    let block = &result.layout.pages[0].blocks[0];
    assert_eq!(block.style.font_size(), 11.0);
    assert!(block.style.bold());
    assert!(warnings(&result)
        .iter()
        .any(|w| matches!(w, Warning::CyclicInheritance { .. })));
}

// ─── Tables ─────────────────────────────────────────────────────

fn cell(text: &str) -> TableCell<SourceBlock> {
    TableCell::new(vec![SourceBlock::paragraph(text)])
}

fn table(rows: Vec<TableRow<SourceBlock>>) -> SourceBlock {
    gridded_table(Vec::new(), rows)
}

fn gridded_table(grid: Vec<f64>, rows: Vec<TableRow<SourceBlock>>) -> SourceBlock {
    SourceBlock::Table(Table {
        style_id: None,
        properties: PropertySet::default(),
        grid,
        rows,
    })
}

#[test]
fn every_row_occupies_the_declared_columns() {
    let (_, result) = lay_out(small_document(vec![gridded_table(
        vec![40.0; 3],
        vec![
            TableRow::new(vec![cell("a").spanning(2), cell("b")]),
            TableRow::new(vec![cell("c").merge(VerticalMerge::Restart), cell("d"), cell("e")]),
            TableRow::new(vec![cell("").merge(VerticalMerge::Continue), cell("f")]),
            TableRow::new(vec![cell("g").spanning(5)]),
        ],
    )]));

    let block = &result.layout.pages[0].blocks[0];
    let LayoutContent::Table(grid) = &block.content else {
        panic!("table block expected");
    };
    assert_eq!(grid.columns.len(), 3);
    for row in &grid.rows {
        let occupied: usize = row.cells.iter().map(|c| c.grid_span).sum();
        assert_eq!(occupied, 3, "row {}", row.index);
    }
    assert_eq!(grid.rows[2].cells[0].merge, MergeRole::SpanContinue);
    assert!(grid.rows[2].cells[0].blocks.is_empty());
    assert!(warnings(&result)
        .iter()
        .any(|w| matches!(w, Warning::GridSpanClipped { row: 3, .. })));
}

#[test]
fn vertically_merged_rows_move_to_the_next_page_together() {
    // Four lines of text leave room for rows 1 and 2 but not row 3, which
    // continues row 2's merge.
    let mut body: Vec<SourceBlock> = (0..4).map(|_| SourceBlock::paragraph("aaaa")).collect();
    body.push(table(vec![
        TableRow::new(vec![cell("one"), cell("one")]),
        TableRow::new(vec![cell("two").merge(VerticalMerge::Restart), cell("two")]),
        TableRow::new(vec![cell("").merge(VerticalMerge::Continue), cell("three")]),
    ]));
    let (_, result) = lay_out(small_document(body));

    let pages = &result.layout.pages;
    assert_eq!(pages.len(), 2);
    let first = pages[0].body_blocks().last().unwrap();
    let second = pages[1].body_blocks().next().unwrap();
    assert_eq!(table_rows(first), [0]);
    assert_eq!(table_rows(second), [1, 2]);
    assert!(second.continued);
    assert!(result.errors.is_empty());
}

#[test]
fn header_rows_repeat_on_continuation_pages() {
    let mut rows = vec![TableRow {
        is_header: true,
        ..TableRow::new(vec![cell("Head")])
    }];
    rows.extend((0..9).map(|_| TableRow::new(vec![cell("aaaa")])));
    let (_, result) = lay_out(small_document(vec![table(rows)]));

    let pages = &result.layout.pages;
    assert_eq!(pages.len(), 2);
    assert_eq!(table_rows(&pages[0].blocks[0]), [0, 1, 2, 3, 4, 5]);
    assert_eq!(table_rows(&pages[1].blocks[0]), [0, 6, 7, 8, 9]);
    let LayoutContent::Table(continued) = &pages[1].blocks[0].content else {
        panic!("table block expected");
    };
    assert!(continued.rows[0].header);
}

#[test]
fn row_taller_than_any_page_is_a_structural_error() {
    let tall = TableRow {
        min_height: Some(500.0),
        ..TableRow::new(vec![cell("aaaa")])
    };
    let (_, result) = lay_out(small_document(vec![table(vec![tall])]));
    assert_eq!(result.layout.pages.len(), 1);
    assert!(matches!(
        result.errors.as_slice(),
        [folio::LayoutError::RowExceedsPage { first_row: 0, .. }]
    ));
    assert!(result.clone().into_strict().is_err());
}

// ─── Pagination ─────────────────────────────────────────────────

fn body_order(doc: &Document, pages: &[LayoutPage]) -> Vec<ElementId> {
    pages
        .iter()
        .flat_map(|p| p.body_blocks())
        .filter(|b| !b.continued)
        .filter_map(|b| b.element)
        .filter(|id| doc.get(*id).map(|e| &e.container) == Some(&Container::Body))
        .collect()
}

fn placeable(doc: &Document) -> Vec<ElementId> {
    doc.body
        .iter()
        .copied()
        .filter(|id| {
            matches!(
                doc.get(*id).map(|e| &e.kind),
                Some(ElementKind::Paragraph(_) | ElementKind::Table(_) | ElementKind::Image(_))
            )
        })
        .collect()
}

#[test]
fn every_body_element_is_placed_once_in_order() {
    let (doc, result) = lay_out(small_document(vec![
        SourceBlock::paragraph(&words(3)),
        SourceBlock::paragraph(&words(22)),
        SourceBlock::PageBreak,
        SourceBlock::simple_table(&[&["a", "b"], &["c", "d"], &["e", "f"]]),
        SourceBlock::Image(Image {
            media_id: "missing".to_string(),
            width: Some(50.0),
            height: Some(30.0),
            ..Default::default()
        }),
        SourceBlock::paragraph(&words(40)),
        SourceBlock::ColumnBreak,
        SourceBlock::paragraph("aaaa"),
    ]));
    assert!(result.layout.pages.len() > 2);
    assert_eq!(body_order(&doc, &result.layout.pages), placeable(&doc));
    assert!(warnings(&result)
        .iter()
        .any(|w| matches!(w, Warning::MissingAsset { .. })));
}

#[test]
fn oversized_paragraph_gets_one_page_and_a_warning() {
    let mut keep = Paragraph::text(&words(40));
    keep.properties.paragraph.keep_lines = Some(true);
    let (_, result) = lay_out(small_document(vec![SourceBlock::Paragraph(keep)]));
    assert_eq!(result.layout.pages.len(), 1);
    assert_eq!(result.layout.pages[0].body_blocks().count(), 1);
    assert!(matches!(
        warnings(&result).as_slice(),
        [Warning::Overflow { .. }]
    ));

    let mut exact = Paragraph::text("aaaa");
    exact.properties.paragraph.spacing.line = Some(LineSpacing::Exact(100.0));
    let (_, result) = lay_out(small_document(vec![SourceBlock::Paragraph(exact)]));
    assert_eq!(result.layout.pages.len(), 1);
    let block = &result.layout.pages[0].blocks[0];
    assert_eq!(block.frame.height, 100.0);
    assert!(warnings(&result)
        .iter()
        .any(|w| matches!(w, Warning::Overflow { available, .. } if *available == 72.0)));
}

#[test]
fn page_break_before_starts_a_new_page() {
    let mut heading = Paragraph::text("aaaa");
    heading.properties.paragraph.page_break_before = Some(true);
    let (_, result) = lay_out(small_document(vec![
        SourceBlock::paragraph("aaaa"),
        SourceBlock::Paragraph(heading),
    ]));
    assert_eq!(result.layout.pages.len(), 2);
}

// ─── Footnotes ──────────────────────────────────────────────────

fn note(id: &str, lines: usize) -> SourceNote {
    SourceNote {
        id: id.to_string(),
        blocks: (0..lines).map(|_| SourceBlock::paragraph("aaaa")).collect(),
    }
}

fn with_footnote(id: &str) -> SourceBlock {
    SourceBlock::Paragraph(Paragraph::text("aaaa").with_run(Run::footnote(id)))
}

#[test]
fn footnote_ordinals_follow_first_reference_order() {
    let mut source = small_document(vec![
        with_footnote("first"),
        SourceBlock::PageBreak,
        with_footnote("second"),
    ]);
    // Definitions listed in the opposite order.
    source.footnotes = vec![note("second", 1), note("first", 1)];
    let (_, result) = lay_out(source);

    let pages = &result.layout.pages;
    assert_eq!(pages.len(), 2);
    assert_eq!(footnote_ordinals(&pages[0]), [("first".to_string(), 1)]);
    assert_eq!(footnote_ordinals(&pages[1]), [("second".to_string(), 2)]);
}

#[test]
fn repeated_reference_keeps_its_first_ordinal() {
    let mut source = small_document(vec![
        with_footnote("a"),
        with_footnote("b"),
        with_footnote("a"),
    ]);
    source.footnotes = vec![note("a", 1), note("b", 1)];
    let (_, result) = lay_out(source);
    assert_eq!(
        footnote_ordinals(&result.layout.pages[0]),
        [("a".to_string(), 1), ("b".to_string(), 2)]
    );
    let third = result.layout.pages[0].blocks[2].text();
    assert_eq!(third, "aaaa1");
}

#[test]
fn small_footnote_overflow_is_accepted() {
    // Body ends at 93.5; a one-line note pulls the limit up to 88.5.
    let mut body: Vec<SourceBlock> = (0..4).map(|_| SourceBlock::paragraph("aaaa")).collect();
    body.push(with_footnote("n"));
    let mut source = small_document(body);
    source.footnotes = vec![note("n", 1)];
    let (_, result) = lay_out(source);

    assert_eq!(result.layout.pages.len(), 1);
    assert_eq!(result.layout.pages[0].body_blocks().count(), 5);
    assert!(result.diagnostics.iter().any(|d| d.severity == Severity::Info
        && matches!(d.warning, Warning::FootnoteOverflowAccepted { page: 1, .. })));
}

#[test]
fn large_footnote_overflow_reflows_the_last_block() {
    let mut body: Vec<SourceBlock> = (0..5).map(|_| SourceBlock::paragraph("aaaa")).collect();
    body.push(with_footnote("n"));
    let mut source = small_document(body);
    source.footnotes = vec![note("n", 3)];
    let (_, result) = lay_out(source);

    let pages = &result.layout.pages;
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].body_blocks().count(), 5);
    assert!(footnote_ordinals(&pages[0]).is_empty());
    assert_eq!(footnote_ordinals(&pages[1]), [("n".to_string(), 1)]);
    assert!(warnings(&result)
        .iter()
        .any(|w| matches!(w, Warning::FootnoteReflow { page: 1, .. })));
}

// ─── Assets ─────────────────────────────────────────────────────

#[test]
fn late_media_becomes_a_placeholder() {
    let doc = Document::from_source(small_document(vec![
        SourceBlock::Image(Image {
            media_id: "fast".to_string(),
            ..Default::default()
        }),
        SourceBlock::Image(Image {
            media_id: "slow".to_string(),
            width: Some(40.0),
            height: Some(20.0),
            ..Default::default()
        }),
    ]));
    let barrier = AssetBarrier::new(["fast", "slow"]);
    let sender = barrier.sender();
    thread::spawn(move || sender.deliver(MediaAsset::new("fast", 48, 24)))
        .join()
        .unwrap();

    let engine = LayoutEngine::new(LayoutOptions {
        asset_timeout_ms: 20,
        ..Default::default()
    });
    let result = engine.layout_with_barrier(&doc, barrier);
    let images: Vec<&LayoutBlock> = result.layout.pages[0].body_blocks().collect();
    let placeholder = |b: &LayoutBlock| match &b.content {
        LayoutContent::Image(image) => image.placeholder,
        _ => false,
    };
    assert!(!placeholder(images[0]));
    assert_eq!(images[0].frame.width, 36.0);
    assert!(placeholder(images[1]));
    assert_eq!(images[1].frame.height, 20.0);
    assert!(warnings(&result)
        .iter()
        .any(|w| matches!(w, Warning::AssetTimeout { media_id } if media_id == "slow")));
}

// ─── JSON in, JSON out ──────────────────────────────────────────

#[test]
fn json_document_lays_out_and_serializes() {
    let result = layout_json(
        r#"{
            "body": [
                {"type": "paragraph", "styleId": "Title", "runs": [
                    {"content": [{"type": "text", "text": "Page "}, {"type": "field", "field": "PAGE"},
                                 {"type": "text", "text": " of "}, {"type": "field", "field": "NUMPAGES"}]}
                ]},
                {"type": "pageBreak"},
                {"type": "paragraph", "runs": [{"content": [{"type": "text", "text": "aaaa"}]}]}
            ],
            "styles": {
                "styles": [{"id": "Title", "family": "paragraph", "properties": {"run": {"bold": true}}}]
            },
            "metadata": {"title": "Sample"}
        }"#,
    )
    .unwrap();

    let pages = &result.layout.pages;
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].blocks[0].text(), "Page 1 of 2");
    assert!(pages[0].blocks[0].style.bold());

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["layout"]["metadata"]["title"], "Sample");
    assert_eq!(json["layout"]["pages"][1]["displayNumber"], "2");
    assert_eq!(json["layout"]["pages"][0]["blocks"][0]["blockType"], "paragraph");
    assert_eq!(
        json["layout"]["pages"][0]["blocks"][0]["style"]["run"]["bold"],
        true
    );
}

#[test]
fn malformed_json_is_a_parse_error() {
    let err = layout_json(r#"{"body": 7}"#).unwrap_err();
    assert!(matches!(err, folio::FolioError::ParseError { .. }));
}

#[test]
fn unreadable_colors_resolve_to_none() {
    let result = layout_json(
        r##"{
            "body": [
                {"type": "paragraph", "styleId": "Odd", "runs": [{"content": [{"type": "text", "text": "aaaa"}]}]},
                {"type": "paragraph", "styleId": "Short", "runs": [{"content": [{"type": "text", "text": "aaaa"}]}]}
            ],
            "styles": {
                "styles": [
                    {"id": "Odd", "family": "paragraph", "properties": {"run": {"color": "#éa"}}},
                    {"id": "Short", "family": "paragraph", "properties": {"run": {"color": "#ab"}}}
                ]
            }
        }"##,
    )
    .unwrap();
    let blocks = &result.layout.pages[0].blocks;
    assert_eq!(blocks.len(), 2);
    assert!(blocks.iter().all(|b| b.style.color().is_none()));
}

#[test]
fn first_page_header_variant() {
    let mut section = small_section();
    section.title_page = Some(true);
    section.headers.default = Some("plain".to_string());
    section.headers.first = Some("cover".to_string());
    let mut source = small_document(vec![
        SourceBlock::paragraph("aaaa"),
        SourceBlock::PageBreak,
        SourceBlock::paragraph("aaaa"),
    ]);
    source.sections = vec![section];
    source.headers_footers = vec![
        folio::model::SourcePart {
            id: "plain".to_string(),
            blocks: vec![SourceBlock::paragraph("Plain")],
        },
        folio::model::SourcePart {
            id: "cover".to_string(),
            blocks: vec![SourceBlock::paragraph("Cover")],
        },
    ];
    let (_, result) = lay_out(source);
    let header_text = |page: &LayoutPage| {
        page.blocks
            .iter()
            .find(|b| b.kind == BlockKind::Header)
            .map(LayoutBlock::text)
    };
    assert_eq!(header_text(&result.layout.pages[0]).as_deref(), Some("Cover"));
    assert_eq!(header_text(&result.layout.pages[1]).as_deref(), Some("Plain"));
}

// ─── Properties ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Piece {
    Words(usize),
    Break,
    Grid(usize),
}

fn piece() -> impl Strategy<Value = Piece> {
    prop_oneof![
        4 => (1usize..40).prop_map(Piece::Words),
        1 => Just(Piece::Break),
        1 => (1usize..8).prop_map(Piece::Grid),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn pagination_conserves_body_order(pieces in prop::collection::vec(piece(), 1..14)) {
        let body = pieces
            .iter()
            .map(|p| match p {
                Piece::Words(n) => SourceBlock::paragraph(&words(*n)),
                Piece::Break => SourceBlock::PageBreak,
                Piece::Grid(rows) => {
                    let row: &[&str] = &["aaaa", "aaaa"];
                    let rows = vec![row; *rows];
                    SourceBlock::simple_table(&rows)
                }
            })
            .collect();
        let (doc, result) = lay_out(small_document(body));
        prop_assert_eq!(body_order(&doc, &result.layout.pages), placeable(&doc));
        prop_assert!(result.errors.is_empty());
        for page in &result.layout.pages {
            for block in page.body_blocks() {
                // Only a block forced into an empty region may overflow.
                prop_assert!(block.frame.bottom() <= 108.0 + 1e-6 || block.frame.y == 36.0);
            }
        }
    }
}
