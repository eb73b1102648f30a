//! Category to color policy.
//!
//! One [`ColorScheme`] is built per run from the display flags and stays
//! immutable afterwards. The scheme owns the two global overrides: casting
//! UNKN to the good color and the green/non-green row filters.

use colored::Color;

use crate::record::Category;

/// Process-wide mapping from [`Category`] to a display color.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColorScheme {
    /// Remap UNKN to the color of GOOD.
    pub cast_unkn_as_good: bool,
    /// Hide rows in which every cell maps to the good color.
    pub show_only_non_good: bool,
    /// Hide rows in which any cell maps to a non-good color.
    pub show_only_good: bool,
}

impl ColorScheme {
    #[must_use]
    pub fn new(cast_unkn_as_good: bool, show_only_non_good: bool, show_only_good: bool) -> Self {
        Self {
            cast_unkn_as_good,
            show_only_non_good,
            show_only_good,
        }
    }

    /// Display color for a category under the active overrides.
    #[must_use]
    pub fn color(&self, category: Category) -> Color {
        match category {
            Category::Good => Color::Green,
            Category::Warn | Category::Busy => Color::Yellow,
            Category::Error | Category::Bad | Category::Down => Color::Red,
            Category::Passive => Color::White,
            Category::Unkn => {
                if self.cast_unkn_as_good {
                    Color::Green
                } else {
                    Color::Cyan
                }
            }
        }
    }

    /// Whether a cell of this category counts as "good" for row filtering.
    #[must_use]
    pub fn is_good(&self, category: Category) -> bool {
        self.color(category) == Color::Green
    }

    /// Row suppression rule.
    ///
    /// With `show_only_non_good`, a row is hidden only when **every** cell is
    /// good; one bad cell defeats suppression and the row prints in full.
    /// With `show_only_good`, the mirror rule applies. Cells are never hidden
    /// individually.
    #[must_use]
    pub fn row_hidden(&self, categories: &[Category]) -> bool {
        if categories.is_empty() {
            return false;
        }
        if self.show_only_non_good && categories.iter().all(|c| self.is_good(*c)) {
            return true;
        }
        if self.show_only_good && categories.iter().any(|c| !self.is_good(*c)) {
            return true;
        }
        false
    }
}
