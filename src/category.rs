//! Category document.
use std::hash::{Hash, Hasher};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{DocumentCore, DocumentKind, UniqueDocument};

/// Display name given to freshly created categories.
pub const DEFAULT_CATEGORY_NAME: &str = "New Category";

/// Description given to freshly created categories.
pub const DEFAULT_CATEGORY_BODY: &str = "Category description";

/// RGB color with components in `[0, 1]`, used only for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Color {
    #[serde(rename = "X")]
    pub r: f32,
    #[serde(rename = "Y")]
    pub g: f32,
    #[serde(rename = "Z")]
    pub b: f32,
}

impl Color {
    /// Uniformly random color. No attempt is made to avoid reuse.
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        Color {
            r: rng.gen_range(0.0..=1.0),
            g: rng.gen_range(0.0..=1.0),
            b: rng.gen_range(0.0..=1.0),
        }
    }
}

/// A user-defined tag that notes can be filed under.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Category {
    #[serde(flatten)]
    pub core: DocumentCore,
    #[serde(default)]
    pub color: Color,
    /// Whether the category is part of the active note filter
    #[serde(default = "selected_by_default")]
    pub is_selected: bool,
}

fn selected_by_default() -> bool {
    true
}

impl Category {
    /// Creates a new, unsaved, selected category with a random color.
    pub fn new(display_name: &str) -> Self {
        Category {
            core: DocumentCore::new(display_name, DEFAULT_CATEGORY_BODY),
            color: Color::random(),
            is_selected: true,
        }
    }
}

impl UniqueDocument for Category {
    const KIND: DocumentKind = DocumentKind::Category;

    fn core(&self) -> &DocumentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DocumentCore {
        &mut self.core
    }
}

impl PartialEq for Category {
    fn eq(&self, other: &Self) -> bool {
        self.core.internal_name == other.core.internal_name
    }
}

impl Eq for Category {}

impl Hash for Category {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.logical_key().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_colors_stay_in_unit_cube() {
        for _ in 0..100 {
            let color = Color::random();
            for component in [color.r, color.g, color.b] {
                assert!((0.0..=1.0).contains(&component));
            }
        }
    }

    #[test]
    fn color_uses_vector_field_names() {
        let json = serde_json::to_value(Color { r: 0.5, g: 0.25, b: 1.0 }).unwrap();
        assert_eq!(json["X"], 0.5);
        assert_eq!(json["Y"], 0.25);
        assert_eq!(json["Z"], 1.0);
    }

    #[test]
    fn legacy_category_without_selection_flag_is_selected() {
        let category: Category =
            serde_json::from_str(r#"{"InternalName":"Work##1","InternalBody":""}"#).unwrap();
        assert!(category.is_selected);
        assert!(category.is_visible());
        assert_eq!(category.name(), "Work");
    }
}
