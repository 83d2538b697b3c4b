//! Page slicing for listings (threads in a category, posts in a thread, pms).
//!
//! Requests name a 1-based page. Anything unusable falls back to the first page
//! and anything past the end clamps to the last page, so a stale link never
//! produces an error.

use serde::{Deserialize, Serialize};

/// Query string for paginated listings: `?page=N`.
///
/// Kept as a string so `?page=abc` degrades to page 1 instead of a 400.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<String>,
}

impl PageQuery {
    pub fn requested(&self) -> usize {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse::<usize>().ok())
            .unwrap_or(1)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: usize,
    pub per_page: usize,
    pub total_items: usize,
    pub total_pages: usize,
    pub has_previous: bool,
    pub has_next: bool,
}

impl<T> Page<T> {
    /// Slice `all` (already in display order) down to the requested page.
    pub fn paginate(all: Vec<T>, requested: usize, per_page: usize) -> Page<T> {
        let per_page = per_page.max(1);
        let total_items = all.len();
        let total_pages = total_items.div_ceil(per_page).max(1);
        let number = requested.clamp(1, total_pages);
        let start = (number - 1) * per_page;
        let items: Vec<T> = all.into_iter().skip(start).take(per_page).collect();
        Page {
            items,
            number,
            per_page,
            total_items,
            total_pages,
            has_previous: number > 1,
            has_next: number < total_pages,
        }
    }

    /// Convert the items while keeping the page metadata.
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            number: self.number,
            per_page: self.per_page,
            total_items: self.total_items,
            total_pages: self.total_pages,
            has_previous: self.has_previous,
            has_next: self.has_next,
        }
    }
}
