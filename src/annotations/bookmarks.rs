use serde::{Deserialize, Serialize};

/// Outcome of toggling a page
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BookmarkChange {
    Added(usize),
    Removed(usize),
}

impl BookmarkChange {
    pub fn page(&self) -> usize {
        match self {
            Self::Added(page) | Self::Removed(page) => *page,
        }
    }

    /// The change that undoes this one
    pub fn inverse(&self) -> Self {
        match *self {
            Self::Added(page) => Self::Removed(page),
            Self::Removed(page) => Self::Added(page),
        }
    }
}

/// Minimal insert/delete sets between two bookmark sequences
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BookmarkDiff {
    pub added: Vec<usize>,
    pub removed: Vec<usize>,
}

impl BookmarkDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Bookmarked pages of one book, kept sorted ascending without duplicates
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookmarkSet {
    pages: Vec<usize>,
}

impl BookmarkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from any sequence, deduplicating and sorting
    pub fn from_pages(pages: impl IntoIterator<Item = usize>) -> Self {
        let mut set = Self::new();
        set.replace(pages);
        set
    }

    pub fn replace(&mut self, pages: impl IntoIterator<Item = usize>) {
        self.pages = pages.into_iter().collect();
        self.pages.sort_unstable();
        self.pages.dedup();
    }

    pub fn pages(&self) -> &[usize] {
        &self.pages
    }

    pub fn contains(&self, page: usize) -> bool {
        self.pages.binary_search(&page).is_ok()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Add the page if absent, remove it if present
    pub fn toggle(&mut self, page: usize) -> BookmarkChange {
        match self.pages.binary_search(&page) {
            Ok(idx) => {
                self.pages.remove(idx);
                BookmarkChange::Removed(page)
            }
            Err(idx) => {
                self.pages.insert(idx, page);
                BookmarkChange::Added(page)
            }
        }
    }

    /// Apply a change directly (used to revert a failed save)
    pub fn apply(&mut self, change: BookmarkChange) {
        match change {
            BookmarkChange::Added(page) => {
                if let Err(idx) = self.pages.binary_search(&page) {
                    self.pages.insert(idx, page);
                }
            }
            BookmarkChange::Removed(page) => {
                if let Ok(idx) = self.pages.binary_search(&page) {
                    self.pages.remove(idx);
                }
            }
        }
    }

    /// Next bookmark strictly after `page`
    pub fn next_after(&self, page: usize) -> Option<usize> {
        self.pages.iter().copied().find(|&p| p > page)
    }

    /// Previous bookmark strictly before `page`
    pub fn prev_before(&self, page: usize) -> Option<usize> {
        self.pages.iter().rev().copied().find(|&p| p < page)
    }

    /// Pages to insert and delete to turn `old` into `new`
    #[must_use]
    pub fn diff(old: &Self, new: &Self) -> BookmarkDiff {
        BookmarkDiff {
            added: new
                .pages
                .iter()
                .copied()
                .filter(|p| !old.contains(*p))
                .collect(),
            removed: old
                .pages
                .iter()
                .copied()
                .filter(|p| !new.contains(*p))
                .collect(),
        }
    }
}
