//! The nested input tree and its flattening into the arena.

use serde::{Deserialize, Serialize};

use super::{
    Container, Document, DocumentSettings, Element, ElementId, ElementKind, Image, Metadata,
    NoteKind, Paragraph, Table, TableCell, TableRow,
};
use crate::assets::{MediaAsset, MediaStore};
use crate::section::RawSection;
use crate::style::{StyleCatalog, Theme};

/// A document as produced by the parsing collaborators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SourceDocument {
    pub body: Vec<SourceBlock>,
    #[serde(skip_serializing)]
    pub theme: Theme,
    #[serde(skip_serializing)]
    pub styles: StyleCatalog,
    /// Section properties in document order; the last one governs the
    /// content after the final section break.
    pub sections: Vec<RawSection>,
    pub footnotes: Vec<SourceNote>,
    pub endnotes: Vec<SourceNote>,
    pub headers_footers: Vec<SourcePart>,
    pub settings: DocumentSettings,
    pub metadata: Metadata,
    /// Media already resolved by the caller. Media delivered later goes
    /// through [`crate::assets::AssetBarrier`].
    pub media: Vec<MediaAsset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SourceBlock {
    Paragraph(Paragraph),
    Table(Table<SourceBlock>),
    Image(Image),
    PageBreak,
    ColumnBreak,
    SectionBreak,
}

impl SourceBlock {
    pub fn paragraph(text: &str) -> Self {
        SourceBlock::Paragraph(Paragraph::text(text))
    }

    /// A table whose rows are lists of cells with one paragraph each.
    pub fn simple_table(rows: &[&[&str]]) -> Self {
        SourceBlock::Table(Table {
            style_id: None,
            properties: Default::default(),
            grid: Vec::new(),
            rows: rows
                .iter()
                .map(|cells| {
                    TableRow::new(
                        cells
                            .iter()
                            .map(|text| TableCell::new(vec![SourceBlock::paragraph(text)]))
                            .collect(),
                    )
                })
                .collect(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceNote {
    pub id: String,
    pub blocks: Vec<SourceBlock>,
}

/// A header or footer part, referenced from sections by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcePart {
    pub id: String,
    pub blocks: Vec<SourceBlock>,
}

#[derive(Default)]
struct Arena {
    elements: Vec<Element>,
    section_breaks: usize,
}

impl Arena {
    fn push(&mut self, block: SourceBlock, container: Container) -> ElementId {
        let id = ElementId(self.elements.len() as u32);
        let in_body = container == Container::Body;
        // Reserve the slot first so nested cells can name their table.
        self.elements.push(Element {
            id,
            container,
            kind: ElementKind::PageBreak,
        });
        let kind = match block {
            SourceBlock::Paragraph(p) => ElementKind::Paragraph(p),
            SourceBlock::Image(image) => ElementKind::Image(image),
            SourceBlock::PageBreak => ElementKind::PageBreak,
            SourceBlock::ColumnBreak => ElementKind::ColumnBreak,
            SourceBlock::SectionBreak if in_body => {
                self.section_breaks += 1;
                ElementKind::SectionBreak {
                    section: self.section_breaks,
                }
            }
            SourceBlock::SectionBreak => ElementKind::PageBreak,
            SourceBlock::Table(table) => ElementKind::Table(self.flatten_table(id, table)),
        };
        self.elements[id.index()].kind = kind;
        id
    }

    fn push_all(&mut self, blocks: Vec<SourceBlock>, container: &Container) -> Vec<ElementId> {
        blocks
            .into_iter()
            .map(|block| self.push(block, container.clone()))
            .collect()
    }

    fn flatten_table(&mut self, table: ElementId, source: Table<SourceBlock>) -> Table<ElementId> {
        let mut rows = Vec::with_capacity(source.rows.len());
        for (r, row) in source.rows.into_iter().enumerate() {
            let mut cells = Vec::with_capacity(row.cells.len());
            for (c, cell) in row.cells.into_iter().enumerate() {
                let container = Container::Cell {
                    table,
                    row: r,
                    cell: c,
                };
                cells.push(TableCell {
                    properties: cell.properties,
                    grid_span: cell.grid_span,
                    row_span: cell.row_span,
                    vertical_merge: cell.vertical_merge,
                    blocks: self.push_all(cell.blocks, &container),
                });
            }
            rows.push(TableRow {
                is_header: row.is_header,
                min_height: row.min_height,
                cells,
            });
        }
        Table {
            style_id: source.style_id,
            properties: source.properties,
            grid: source.grid,
            rows,
        }
    }
}

impl Document {
    /// Flatten a source tree into an arena, assigning every element its id.
    pub fn from_source(source: SourceDocument) -> Self {
        let mut arena = Arena::default();
        let body = arena.push_all(source.body, &Container::Body);

        let mut footnotes = std::collections::HashMap::new();
        for note in source.footnotes {
            let container = Container::Note {
                kind: NoteKind::Footnote,
                id: note.id.clone(),
            };
            footnotes.insert(note.id, arena.push_all(note.blocks, &container));
        }
        let mut endnotes = std::collections::HashMap::new();
        for note in source.endnotes {
            let container = Container::Note {
                kind: NoteKind::Endnote,
                id: note.id.clone(),
            };
            endnotes.insert(note.id, arena.push_all(note.blocks, &container));
        }
        let mut headers_footers = std::collections::HashMap::new();
        for part in source.headers_footers {
            let container = Container::HeaderFooter {
                id: part.id.clone(),
            };
            headers_footers.insert(part.id, arena.push_all(part.blocks, &container));
        }

        Document {
            elements: arena.elements,
            body,
            theme: source.theme,
            styles: source.styles,
            sections: source.sections,
            footnotes,
            endnotes,
            headers_footers,
            settings: source.settings,
            metadata: source.metadata,
            media: MediaStore::from_iter(source.media),
        }
    }
}
