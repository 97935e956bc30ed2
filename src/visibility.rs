//! Current-page resolution from noisy visibility signals
//!
//! The viewport reports visibility ratios for mounted pages many times per
//! second. Reacting to each report makes the page number flicker while the
//! viewport straddles two pages, so the resolver:
//!
//! 1. merges every report into a persistent page → ratio map,
//! 2. schedules at most one commit per `commit_interval`,
//! 3. on commit, scans the whole map for the highest ratio,
//! 4. switches the current page only if that ratio exceeds `threshold`.
//!
//! Time is passed in explicitly, so the owner decides how the commit timer is
//! driven (event loop tick, test clock).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::window::RenderWindow;

/// Share of the viewport a page must cover to become current
pub const DEFAULT_VISIBILITY_THRESHOLD: f32 = 0.6;

/// Delay between the first unhandled report and the commit decision
pub const DEFAULT_COMMIT_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolverConfig {
    /// A page becomes current only when its ratio is strictly above this
    pub threshold: f32,
    pub commit_interval: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_VISIBILITY_THRESHOLD,
            commit_interval: DEFAULT_COMMIT_INTERVAL,
        }
    }
}

/// Identifies one scheduled commit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommitId(u64);

/// A commit waiting for its timer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingCommit {
    pub id: CommitId,
    pub due: Instant,
}

/// Result of firing a commit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The current page switched
    Changed { from: usize, to: usize },
    /// No page dominated the viewport, or the winner was already current
    Unchanged(usize),
    /// The commit was canceled, superseded, or the resolver is disposed
    Stale,
}

impl CommitOutcome {
    pub fn changed_to(&self) -> Option<usize> {
        match self {
            Self::Changed { to, .. } => Some(*to),
            _ => None,
        }
    }
}

/// Throttled majority-wins tracker of the current page
#[derive(Debug)]
pub struct VisibilityResolver {
    config: ResolverConfig,
    /// Keys are exactly the mounted pages
    ratios: HashMap<usize, f32>,
    pending: Option<PendingCommit>,
    current_page: usize,
    next_commit: u64,
    disposed: bool,
}

impl VisibilityResolver {
    #[must_use]
    pub fn new(config: ResolverConfig, current_page: usize) -> Self {
        Self {
            config,
            ratios: HashMap::new(),
            pending: None,
            current_page,
            next_commit: 0,
            disposed: false,
        }
    }

    pub fn config(&self) -> ResolverConfig {
        self.config
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn pending(&self) -> Option<PendingCommit> {
        self.pending
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Last known ratio of a mounted page
    pub fn ratio(&self, page: usize) -> Option<f32> {
        self.ratios.get(&page).copied()
    }

    /// Mounted pages, ascending
    pub fn observed_pages(&self) -> Vec<usize> {
        let mut pages: Vec<usize> = self.ratios.keys().copied().collect();
        pages.sort_unstable();
        pages
    }

    /// Start observing a page; it enters the map with ratio 0
    pub fn mount(&mut self, page: usize) {
        if self.disposed {
            return;
        }
        self.ratios.entry(page).or_insert(0.0);
    }

    /// Stop observing a page and purge its last ratio
    pub fn unmount(&mut self, page: usize) {
        self.ratios.remove(&page);
    }

    /// Make the observed set equal to `window`
    pub fn retain_window(&mut self, window: &RenderWindow) {
        if self.disposed {
            return;
        }
        self.ratios.retain(|page, _| window.contains(*page));
        for page in window.pages() {
            self.ratios.entry(page).or_insert(0.0);
        }
    }

    /// Navigation set the page directly (jump, next/prev button)
    pub fn set_current_page(&mut self, page: usize) {
        self.current_page = page;
    }

    /// Merge a batch of `(page, ratio)` reports.
    ///
    /// Returns the newly scheduled commit, or `None` if one was already
    /// pending or nothing in the batch was accepted.
    pub fn observe(&mut self, batch: &[(usize, f32)], now: Instant) -> Option<PendingCommit> {
        if self.disposed {
            log::trace!("Ignoring visibility batch after dispose");
            return None;
        }

        let mut accepted = 0usize;
        for &(page, ratio) in batch {
            match self.ratios.get_mut(&page) {
                Some(slot) => {
                    *slot = sanitize_ratio(ratio);
                    accepted += 1;
                }
                None => log::trace!("Ignoring ratio for unmounted page {page}"),
            }
        }

        if accepted == 0 || self.pending.is_some() {
            return None;
        }

        let pending = PendingCommit {
            id: CommitId(self.next_commit),
            due: now + self.config.commit_interval,
        };
        self.next_commit += 1;
        self.pending = Some(pending);
        Some(pending)
    }

    /// Fire the pending commit if its timer has elapsed
    pub fn poll(&mut self, now: Instant) -> Option<CommitOutcome> {
        let pending = self.pending?;
        if now < pending.due {
            return None;
        }
        Some(self.fire(pending.id))
    }

    /// Fire a scheduled commit.
    ///
    /// Ids that are not the currently pending commit are stale and do nothing.
    pub fn fire(&mut self, id: CommitId) -> CommitOutcome {
        if self.disposed || self.pending.map(|p| p.id) != Some(id) {
            log::trace!("Stale visibility commit {id:?} ignored");
            return CommitOutcome::Stale;
        }
        self.pending = None;

        let Some((page, ratio)) = self.dominant_page() else {
            return CommitOutcome::Unchanged(self.current_page);
        };

        if ratio > self.config.threshold && page != self.current_page {
            let from = self.current_page;
            self.current_page = page;
            log::debug!("Current page {from} -> {page} (ratio {ratio:.2})");
            CommitOutcome::Changed { from, to: page }
        } else {
            CommitOutcome::Unchanged(self.current_page)
        }
    }

    /// Drop the pending commit without deciding
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            log::trace!("Canceled visibility commit {:?}", pending.id);
        }
    }

    /// Tear down: cancel the timer and forget every observation
    pub fn dispose(&mut self) {
        self.cancel();
        self.ratios.clear();
        self.disposed = true;
    }

    /// Highest ratio over the whole map; ties go to the lower page number
    fn dominant_page(&self) -> Option<(usize, f32)> {
        self.ratios
            .iter()
            .map(|(&page, &ratio)| (page, ratio))
            .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
    }
}

fn sanitize_ratio(ratio: f32) -> f32 {
    if ratio.is_nan() {
        0.0
    } else {
        ratio.clamp(0.0, 1.0)
    }
}
