use serde::{Deserialize, Serialize};

/// 1-based page arithmetic for the gallery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: usize,
    pub per_page: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

impl Pagination {
    /// Clamps `requested` into `1..=total_pages`. An empty table still has
    /// one (empty) page.
    pub fn new(requested: usize, per_page: usize, total_items: usize) -> Self {
        let per_page = per_page.max(1);
        let total_pages = total_items.div_ceil(per_page).max(1);
        Self {
            page: requested.clamp(1, total_pages),
            per_page,
            total_items,
            total_pages,
        }
    }

    pub fn offset(&self) -> usize {
        (self.page - 1) * self.per_page
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}
