//! Render window calculation and page slot layout
//!
//! Only pages inside the window around the current page get real renders;
//! every other page is a placeholder with the same footprint so the total
//! scroll extent stays exact.

use std::ops::RangeInclusive;

use crate::document::{Document, PageSize};

/// Default number of pages rendered on each side of the current page
pub const DEFAULT_BUFFER_RADIUS: usize = 2;

/// Contiguous, inclusive range of pages that should be fully rendered.
///
/// An empty window (`first > last`) is used for documents without pages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderWindow {
    first: usize,
    last: usize,
}

impl RenderWindow {
    /// The empty window
    pub const EMPTY: Self = Self { first: 1, last: 0 };

    /// Window of `buffer_radius` pages either side of `current_page`, clamped to the document.
    #[must_use]
    pub fn compute(current_page: usize, page_count: usize, buffer_radius: usize) -> Self {
        if page_count == 0 {
            return Self::EMPTY;
        }
        let current = current_page.clamp(1, page_count);
        Self {
            first: current.saturating_sub(buffer_radius).max(1),
            last: current.saturating_add(buffer_radius).min(page_count),
        }
    }

    pub fn first(&self) -> usize {
        self.first
    }

    pub fn last(&self) -> usize {
        self.last
    }

    pub fn is_empty(&self) -> bool {
        self.first > self.last
    }

    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.last - self.first + 1
        }
    }

    pub fn contains(&self, page: usize) -> bool {
        page >= self.first && page <= self.last
    }

    pub fn pages(&self) -> RangeInclusive<usize> {
        self.first..=self.last
    }

    /// Pages entering and leaving when moving from `old` to `new`
    #[must_use]
    pub fn diff(old: &Self, new: &Self) -> WindowDiff {
        WindowDiff {
            mounted: new.pages().filter(|p| !old.contains(*p)).collect(),
            unmounted: old.pages().filter(|p| !new.contains(*p)).collect(),
        }
    }
}

/// Change between two render windows
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WindowDiff {
    pub mounted: Vec<usize>,
    pub unmounted: Vec<usize>,
}

impl WindowDiff {
    pub fn is_empty(&self) -> bool {
        self.mounted.is_empty() && self.unmounted.is_empty()
    }
}

/// Layout space reserved for a page outside the render window
#[must_use]
pub fn placeholder_size(reference: PageSize, zoom_scale: f32) -> PageSize {
    reference.scaled(zoom_scale)
}

/// One page position in the scrollable column
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PageSlot {
    Rendered { page: usize, size: PageSize },
    Placeholder { page: usize, size: PageSize },
}

impl PageSlot {
    pub fn page(&self) -> usize {
        match self {
            Self::Rendered { page, .. } | Self::Placeholder { page, .. } => *page,
        }
    }

    pub fn size(&self) -> PageSize {
        match self {
            Self::Rendered { size, .. } | Self::Placeholder { size, .. } => *size,
        }
    }

    pub fn is_rendered(&self) -> bool {
        matches!(self, Self::Rendered { .. })
    }
}

/// Vertical layout of every page slot at a given zoom
#[derive(Clone, Debug)]
pub struct SlotLayout {
    slots: Vec<PageSlot>,
    page_gap: f32,
}

impl SlotLayout {
    #[must_use]
    pub fn build(document: &Document, window: &RenderWindow, zoom_scale: f32, page_gap: f32) -> Self {
        let size = placeholder_size(document.reference_page_size, zoom_scale);
        let slots = (1..=document.page_count)
            .map(|page| {
                if window.contains(page) {
                    PageSlot::Rendered { page, size }
                } else {
                    PageSlot::Placeholder { page, size }
                }
            })
            .collect();
        Self { slots, page_gap }
    }

    pub fn slots(&self) -> &[PageSlot] {
        &self.slots
    }

    pub fn slot(&self, page: usize) -> Option<&PageSlot> {
        page.checked_sub(1).and_then(|i| self.slots.get(i))
    }

    /// Distance from the top of the column to the top of `page`
    pub fn page_offset(&self, page: usize) -> f32 {
        self.slots
            .iter()
            .take(page.saturating_sub(1))
            .map(|s| s.size().height + self.page_gap)
            .sum()
    }

    /// Total scrollable height of the column
    pub fn total_extent(&self) -> f32 {
        let heights: f32 = self.slots.iter().map(|s| s.size().height).sum();
        let gaps = self.slots.len().saturating_sub(1) as f32 * self.page_gap;
        heights + gaps
    }

    pub fn rendered_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_rendered()).count()
    }
}
