//! The cascade: theme defaults, then document defaults, then the named-style
//! chain (root first), then direct formatting.
//!
//! [`cascade`] is the pure function. [`StyleEngine`] wraps it with the
//! per-element cache and knows how elements inherit from their containers
//! (run → paragraph, paragraph → cell → table).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;

use super::{Merge, PropertySet, ResolvedStyle, StyleCatalog, StyleDefinition, StyleFamily, Theme};
use crate::diagnostics::Warning;
use crate::model::{Container, Document, ElementId, ElementKind};

/// What to resolve: a family, an optional named style and direct formatting.
///
/// A request without a family skips the named-style layer entirely; table
/// cells use that, since they have no style of their own.
#[derive(Debug, Clone, Copy)]
pub struct StyleRequest<'a> {
    pub family: Option<StyleFamily>,
    pub style_id: Option<&'a str>,
    pub direct: &'a PropertySet,
}

impl<'a> StyleRequest<'a> {
    pub fn new(family: StyleFamily, style_id: Option<&'a str>, direct: &'a PropertySet) -> Self {
        Self {
            family: Some(family),
            style_id,
            direct,
        }
    }

    pub fn direct_only(direct: &'a PropertySet) -> Self {
        Self {
            family: None,
            style_id: None,
            direct,
        }
    }
}

/// Resolve one request against the theme and catalog.
pub fn cascade(
    request: &StyleRequest<'_>,
    theme: &Theme,
    catalog: &StyleCatalog,
    warnings: &mut Vec<Warning>,
) -> ResolvedStyle {
    let properties = cascade_onto(None, request, theme, catalog, warnings);
    ResolvedStyle::from_properties(properties, theme)
}

/// The cascade over an optional inherited base. With a base the theme and
/// document defaults are skipped: the base already carries them.
pub(crate) fn cascade_onto(
    base: Option<&PropertySet>,
    request: &StyleRequest<'_>,
    theme: &Theme,
    catalog: &StyleCatalog,
    warnings: &mut Vec<Warning>,
) -> PropertySet {
    let mut properties = match base {
        Some(base) => base.clone(),
        None => theme
            .defaults_for(request.family.unwrap_or(StyleFamily::Paragraph))
            .merged(catalog.doc_defaults()),
    };
    if let Some(family) = request.family {
        for style in style_chain(request.style_id, family, catalog, warnings) {
            properties.merge_from(&style.properties);
        }
    }
    properties.merge_from(request.direct);
    properties
}

/// The named-style chain for `style_id`, ordered root first.
///
/// A missing id (or a missing `based_on` target) falls back to the family's
/// default style, as does an id naming a style of another family. A repeated
/// id truncates the chain at the repetition.
pub fn style_chain<'c>(
    style_id: Option<&str>,
    family: StyleFamily,
    catalog: &'c StyleCatalog,
    warnings: &mut Vec<Warning>,
) -> Vec<&'c StyleDefinition> {
    let mut chain = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();

    let lookup = |id: &str, warnings: &mut Vec<Warning>| match catalog.get(id) {
        Some(style) if style.family == family => Some(style),
        Some(style) => {
            warnings.push(Warning::StyleFamilyMismatch {
                style_id: id.to_string(),
                expected: family,
                found: style.family,
            });
            catalog.default_for(family)
        }
        None => {
            warnings.push(Warning::UnresolvedStyle {
                style_id: id.to_string(),
                family,
            });
            catalog.default_for(family)
        }
    };

    let mut next = match style_id {
        Some(id) => lookup(id, warnings),
        None => catalog.default_for(family),
    };
    while let Some(style) = next {
        if !visited.insert(style.id.as_str()) {
            warnings.push(Warning::CyclicInheritance {
                style_id: style_id.unwrap_or(style.id.as_str()).to_string(),
                repeated: style.id.clone(),
            });
            break;
        }
        chain.push(style);
        next = match style.based_on.as_deref() {
            Some(parent) if catalog.get(parent).is_some_and(|p| p.family == family) => {
                catalog.get(parent)
            }
            Some(parent) => {
                // The family default may already be in the chain; falling
                // back to it again would read as a cycle.
                let fallback = lookup(parent, warnings);
                fallback.filter(|d| !visited.contains(d.id.as_str()))
            }
            None => None,
        };
    }
    chain.reverse();
    chain
}

/// Cache key: element identity, never structural equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleTarget {
    Element(ElementId),
    Run {
        paragraph: ElementId,
        run: usize,
    },
    Cell {
        table: ElementId,
        row: usize,
        cell: usize,
    },
}

/// Per-document resolver with a write-once cache.
pub struct StyleEngine<'d> {
    document: &'d Document,
    cache: RwLock<HashMap<StyleTarget, Arc<ResolvedStyle>>>,
    warnings: Mutex<Vec<Warning>>,
}

impl<'d> StyleEngine<'d> {
    pub fn new(document: &'d Document) -> Self {
        Self {
            document,
            cache: RwLock::new(HashMap::new()),
            warnings: Mutex::new(Vec::new()),
        }
    }

    /// Start a new pass: forget every cached style and warning.
    pub fn begin_pass(&self) {
        self.cache.write().clear();
        self.warnings.lock().clear();
    }

    pub fn resolve(&self, target: StyleTarget) -> Arc<ResolvedStyle> {
        let cached = self.cache.read().get(&target).cloned();
        if let Some(hit) = cached {
            log::trace!("style cache hit: {target:?}");
            return hit;
        }
        let computed = Arc::new(self.compute(target));
        log::trace!("style cache fill: {target:?}");
        // Two threads may compute the same target; the first write wins.
        self.cache
            .write()
            .entry(target)
            .or_insert(computed)
            .clone()
    }

    pub fn element(&self, id: ElementId) -> Arc<ResolvedStyle> {
        self.resolve(StyleTarget::Element(id))
    }

    pub fn run(&self, paragraph: ElementId, run: usize) -> Arc<ResolvedStyle> {
        self.resolve(StyleTarget::Run { paragraph, run })
    }

    pub fn cell(&self, table: ElementId, row: usize, cell: usize) -> Arc<ResolvedStyle> {
        self.resolve(StyleTarget::Cell { table, row, cell })
    }

    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }

    /// Resolve every element, run and cell on the rayon pool.
    pub fn prefetch(&self) {
        let elements = &self.document.elements;
        elements.par_iter().for_each(|element| {
            self.element(element.id);
            match &element.kind {
                ElementKind::Paragraph(p) => {
                    for run in 0..p.runs.len() {
                        self.run(element.id, run);
                    }
                }
                ElementKind::Table(t) => {
                    for (r, row) in t.rows.iter().enumerate() {
                        for c in 0..row.cells.len() {
                            self.cell(element.id, r, c);
                        }
                    }
                }
                _ => {}
            }
        });
        log::debug!("prefetched {} styles", self.cached());
    }

    /// Warnings raised so far in this pass, each reported once.
    pub fn take_warnings(&self) -> Vec<Warning> {
        std::mem::take(&mut *self.warnings.lock())
    }

    fn record(&self, found: Vec<Warning>) {
        if found.is_empty() {
            return;
        }
        let mut warnings = self.warnings.lock();
        for warning in found {
            if !warnings.contains(&warning) {
                warnings.push(warning);
            }
        }
    }

    fn compute(&self, target: StyleTarget) -> ResolvedStyle {
        let doc = self.document;
        let mut warnings = Vec::new();
        let empty = PropertySet::default();

        let (request, parent) = match target {
            StyleTarget::Element(id) => match doc.get(id) {
                Some(element) => {
                    let parent = match &element.container {
                        Container::Cell { table, row, cell } => Some(StyleTarget::Cell {
                            table: *table,
                            row: *row,
                            cell: *cell,
                        }),
                        _ => None,
                    };
                    let request = match &element.kind {
                        ElementKind::Paragraph(p) => StyleRequest::new(
                            StyleFamily::Paragraph,
                            p.style_id.as_deref(),
                            &p.properties,
                        ),
                        ElementKind::Table(t) => StyleRequest::new(
                            StyleFamily::Table,
                            t.style_id.as_deref(),
                            &t.properties,
                        ),
                        ElementKind::Image(image) => StyleRequest::new(
                            StyleFamily::Paragraph,
                            None,
                            &image.properties,
                        ),
                        _ => StyleRequest::direct_only(&empty),
                    };
                    (request, parent)
                }
                None => return ResolvedStyle::default(),
            },
            StyleTarget::Run { paragraph, run } => {
                match doc.paragraph(paragraph).and_then(|p| p.runs.get(run)) {
                    Some(r) => (
                        StyleRequest::new(
                            StyleFamily::Character,
                            r.style_id.as_deref(),
                            &r.properties,
                        ),
                        Some(StyleTarget::Element(paragraph)),
                    ),
                    None => return ResolvedStyle::default(),
                }
            }
            StyleTarget::Cell { table, row, cell } => {
                match doc
                    .table(table)
                    .and_then(|t| t.rows.get(row))
                    .and_then(|r| r.cells.get(cell))
                {
                    Some(c) => (
                        StyleRequest::direct_only(&c.properties),
                        Some(StyleTarget::Element(table)),
                    ),
                    None => return ResolvedStyle::default(),
                }
            }
        };

        let base = parent.map(|p| self.resolve(p));
        let properties = cascade_onto(
            base.as_deref().map(ResolvedStyle::properties),
            &request,
            &doc.theme,
            &doc.styles,
            &mut warnings,
        );
        self.record(warnings);
        ResolvedStyle::from_properties(properties, &doc.theme)
    }
}
