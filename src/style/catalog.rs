//! The document-scoped style catalog. Immutable after load.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::PropertySet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleFamily {
    Paragraph,
    Character,
    Table,
    Numbering,
}

impl fmt::Display for StyleFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StyleFamily::Paragraph => "paragraph",
            StyleFamily::Character => "character",
            StyleFamily::Table => "table",
            StyleFamily::Numbering => "numbering",
        })
    }
}

/// A named style as declared in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleDefinition {
    pub id: String,
    pub family: StyleFamily,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub based_on: Option<String>,
    /// Marks the family's default style (e.g. `Normal` for paragraphs).
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub properties: PropertySet,
}

impl StyleDefinition {
    pub fn new(id: &str, family: StyleFamily, properties: PropertySet) -> Self {
        Self {
            id: id.to_string(),
            family,
            name: None,
            based_on: None,
            default: false,
            properties,
        }
    }

    pub fn based_on(mut self, parent: &str) -> Self {
        self.based_on = Some(parent.to_string());
        self
    }

    pub fn as_default(mut self) -> Self {
        self.default = true;
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CatalogSource {
    doc_defaults: PropertySet,
    styles: Vec<StyleDefinition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "CatalogSource")]
pub struct StyleCatalog {
    doc_defaults: PropertySet,
    styles: HashMap<String, StyleDefinition>,
    defaults: HashMap<StyleFamily, String>,
}

impl From<CatalogSource> for StyleCatalog {
    fn from(source: CatalogSource) -> Self {
        StyleCatalog::new(source.doc_defaults, source.styles)
    }
}

impl StyleCatalog {
    /// Build a catalog. A later definition with the same id replaces an
    /// earlier one; the first definition flagged `default` wins per family.
    pub fn new(doc_defaults: PropertySet, styles: Vec<StyleDefinition>) -> Self {
        let mut catalog = StyleCatalog {
            doc_defaults,
            ..Default::default()
        };
        for style in styles {
            if style.default {
                catalog
                    .defaults
                    .entry(style.family)
                    .or_insert_with(|| style.id.clone());
            }
            catalog.styles.insert(style.id.clone(), style);
        }
        catalog
    }

    pub fn get(&self, id: &str) -> Option<&StyleDefinition> {
        self.styles.get(id)
    }

    /// The family's default style, if the document declares one.
    pub fn default_for(&self, family: StyleFamily) -> Option<&StyleDefinition> {
        self.defaults.get(&family).and_then(|id| self.styles.get(id))
    }

    /// Document-wide defaults, applied just above the theme layer.
    pub fn doc_defaults(&self) -> &PropertySet {
        &self.doc_defaults
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}
