//! Footnote and endnote bookkeeping.
//!
//! Ordinals are document-wide and handed out on first reference, one counter
//! per note kind. Per-page registration is idempotent: a footnote referenced
//! three times on one page occupies the footnote area once.

use std::collections::HashMap;

use crate::model::NoteKind;

#[derive(Debug, Default)]
pub struct NoteRegistry {
    ordinals: HashMap<(NoteKind, String), u32>,
    footnotes: u32,
    endnotes: Vec<String>,
}

impl NoteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The note's ordinal, assigned now if this is its first reference.
    pub fn ordinal(&mut self, kind: NoteKind, id: &str) -> u32 {
        if let Some(n) = self.ordinals.get(&(kind, id.to_string())) {
            return *n;
        }
        let n = match kind {
            NoteKind::Footnote => {
                self.footnotes += 1;
                self.footnotes
            }
            NoteKind::Endnote => {
                self.endnotes.push(id.to_string());
                self.endnotes.len() as u32
            }
        };
        self.ordinals.insert((kind, id.to_string()), n);
        n
    }

    pub fn get(&self, kind: NoteKind, id: &str) -> Option<u32> {
        self.ordinals.get(&(kind, id.to_string())).copied()
    }

    /// Endnote ids in ordinal order.
    pub fn endnotes(&self) -> &[String] {
        &self.endnotes
    }
}

/// Footnotes registered on one page, in registration order.
#[derive(Debug, Default, Clone)]
pub struct PageNotes {
    ids: Vec<String>,
}

impl PageNotes {
    /// Returns `true` when `id` was not yet on this page.
    pub fn register(&mut self, id: &str) -> bool {
        if self.ids.iter().any(|known| known == id) {
            return false;
        }
        self.ids.push(id.to_string());
        true
    }

    pub fn remove(&mut self, id: &str) {
        self.ids.retain(|known| known != id);
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Drop every note from `index` on, returning them in order.
    pub fn split_off(&mut self, index: usize) -> Vec<String> {
        self.ids.split_off(index.min(self.ids.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_follow_first_reference() {
        let mut notes = NoteRegistry::new();
        assert_eq!(notes.ordinal(NoteKind::Footnote, "b"), 1);
        assert_eq!(notes.ordinal(NoteKind::Footnote, "a"), 2);
        assert_eq!(notes.ordinal(NoteKind::Footnote, "b"), 1);
        assert_eq!(notes.get(NoteKind::Footnote, "a"), Some(2));
    }

    #[test]
    fn kinds_count_separately() {
        let mut notes = NoteRegistry::new();
        notes.ordinal(NoteKind::Footnote, "x");
        assert_eq!(notes.ordinal(NoteKind::Endnote, "x"), 1);
        assert_eq!(notes.ordinal(NoteKind::Endnote, "y"), 2);
        assert_eq!(notes.endnotes(), ["x", "y"]);
    }

    #[test]
    fn page_registration_is_idempotent() {
        let mut page = PageNotes::default();
        assert!(page.register("1"));
        assert!(!page.register("1"));
        assert!(page.register("2"));
        assert_eq!(page.ids(), ["1", "2"]);
        page.remove("1");
        assert_eq!(page.ids(), ["2"]);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn ordinals_increase_in_first_reference_order(
                refs in proptest::collection::vec(0u8..12, 1..60),
            ) {
                let mut notes = NoteRegistry::new();
                let mut highest = 0;
                for r in refs {
                    let id = r.to_string();
                    let known = notes.get(NoteKind::Footnote, &id);
                    let n = notes.ordinal(NoteKind::Footnote, &id);
                    match known {
                        Some(k) => prop_assert_eq!(k, n),
                        None => {
                            prop_assert_eq!(n, highest + 1);
                            highest = n;
                        }
                    }
                }
            }
        }
    }
}
