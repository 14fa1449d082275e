//! Note document.
//!
//! A note is a [`UniqueDocument`] with an ordered list of categories. The
//! categories are embedded by value and matched by logical key, never by
//! store Id.
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::{Category, DocumentCore, DocumentKind, UniqueDocument};

/// Display name given to freshly created notes.
pub const DEFAULT_NOTE_NAME: &str = "New Note";

/// Represents a single note in the notebook
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Note {
    #[serde(flatten)]
    pub core: DocumentCore,
    /// Categories attached to this note, in user order
    #[serde(default)]
    pub categories: Vec<Category>,
    /// Opaque owner/context tag, not interpreted here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub associated_character: Option<String>,
}

impl Note {
    /// Creates a new, unsaved note with an empty body
    pub fn new(display_name: &str) -> Self {
        Note {
            core: DocumentCore::new(display_name, String::new()),
            categories: Vec::new(),
            associated_character: None,
        }
    }

    pub fn has_category(&self, category: &Category) -> bool {
        self.categories.iter().any(|c| c == category)
    }

    /// Attaches `category` unless an equal one is already attached.
    pub fn add_category(&mut self, category: &Category) -> bool {
        if self.has_category(category) {
            return false;
        }
        self.categories.push(category.clone());
        true
    }

    /// Detaches every reference equal to `category`.
    pub fn remove_category(&mut self, category: &Category) -> bool {
        let before = self.categories.len();
        self.categories.retain(|c| c != category);
        self.categories.len() != before
    }

    pub fn category_names(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.name()).collect()
    }
}

impl UniqueDocument for Note {
    const KIND: DocumentKind = DocumentKind::Note;

    fn core(&self) -> &DocumentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DocumentCore {
        &mut self.core
    }
}

impl PartialEq for Note {
    fn eq(&self, other: &Self) -> bool {
        self.core.internal_name == other.core.internal_name
    }
}

impl Eq for Note {}

impl Hash for Note {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.logical_key().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_id_and_body() {
        let mut a = Note::new("Todo");
        let mut b = a.clone();
        a.set_id(1);
        b.set_id(99);
        b.set_body("changed");
        assert_eq!(a, b);

        let c = Note::new("Todo");
        assert_ne!(a, c, "distinct suffixes make distinct notes");
    }

    #[test]
    fn categories_are_not_duplicated() {
        let work = Category::new("Work");
        let mut note = Note::new("Todo");
        assert!(note.add_category(&work));
        assert!(!note.add_category(&work.clone()));
        assert_eq!(note.category_names(), vec!["Work"]);
        assert!(note.remove_category(&work));
        assert!(note.categories.is_empty());
    }

    #[test]
    fn serialized_form_omits_plaintext_body() {
        let mut note = Note::new("Secret");
        note.set_body("plaintext");
        note.compress_body().unwrap();

        let json = serde_json::to_value(&note).unwrap();
        assert!(json.get("Body").is_none());
        assert!(json.get("IsVisible").is_none());
        assert!(json.get("InternalBody").is_some());
        assert!(json.get("InternalName").is_some());

        let mut restored: Note = serde_json::from_value(json).unwrap();
        assert!(restored.is_visible());
        restored.decompress_body().unwrap();
        assert_eq!(restored.body(), "plaintext");
    }
}
