//! Page viewport controller
//!
//! Owns the loaded [`Document`], the [`ViewportState`], the visibility
//! resolver and the active render window. Every user or viewport signal is a
//! [`Command`]; applying it mutates state and returns the [`Effect`]s the host
//! must carry out (scroll, mount/unmount page renders, rerender, relayout).

use std::time::Instant;

use crate::document::{Document, DocumentSource, PageSize, PageSurface};
use crate::error::RenderError;
use crate::visibility::{CommitOutcome, PendingCommit, ResolverConfig, VisibilityResolver};
use crate::window::{DEFAULT_BUFFER_RADIUS, RenderWindow, SlotLayout, placeholder_size};

/// Smallest allowed zoom scale
pub const MIN_ZOOM: f32 = 0.5;
/// Largest allowed zoom scale
pub const MAX_ZOOM: f32 = 3.0;
/// Zoom change per zoom-in / zoom-out step
pub const ZOOM_STEP: f32 = 0.2;

/// Clamp a zoom scale to the supported range, handling NaN/Inf
#[must_use]
pub fn clamp_zoom(scale: f32) -> f32 {
    if !scale.is_finite() {
        1.0
    } else {
        // Keep steps on a 0.01 grid so repeated +-0.2 does not drift
        ((scale * 100.0).round() / 100.0).clamp(MIN_ZOOM, MAX_ZOOM)
    }
}

/// One-time choice of the opening zoom from the available width
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomPolicy {
    pub default_zoom: f32,
    pub narrow_zoom: f32,
    /// Viewports narrower than this open at `narrow_zoom`
    pub narrow_viewport_width: f32,
}

impl Default for ZoomPolicy {
    fn default() -> Self {
        Self {
            default_zoom: 1.0,
            narrow_zoom: 0.6,
            narrow_viewport_width: 768.0,
        }
    }
}

impl ZoomPolicy {
    #[must_use]
    pub fn initial_zoom(&self, viewport_width: f32) -> f32 {
        if viewport_width < self.narrow_viewport_width {
            clamp_zoom(self.narrow_zoom)
        } else {
            clamp_zoom(self.default_zoom)
        }
    }
}

/// Tunables of the viewport controller
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportConfig {
    pub buffer_radius: usize,
    /// Vertical space between page slots
    pub page_gap: f32,
    pub resolver: ResolverConfig,
    pub zoom: ZoomPolicy,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            buffer_radius: DEFAULT_BUFFER_RADIUS,
            page_gap: 16.0,
            resolver: ResolverConfig::default(),
            zoom: ZoomPolicy::default(),
        }
    }
}

/// User-facing viewport state; not persisted
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct ViewportState {
    /// 1-indexed; 0 only for an empty document
    pub current_page: usize,
    pub zoom_scale: f32,
    pub dark_mode: bool,
}

/// Commands that modify the viewport
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Navigate to a page (bookmark jump, page input)
    ScrollToPage(usize),
    NextPage,
    PrevPage,
    SetZoom(f32),
    ZoomIn,
    ZoomOut,
    ToggleDarkMode,
    /// Raw visibility ratios reported by the viewport
    Visibility { ratios: Vec<(usize, f32)>, now: Instant },
    /// Clock advanced; fires a due commit
    Tick(Instant),
    /// Reader is being torn down
    Close,
}

/// Effects produced by viewport changes
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Smooth-scroll the slot of `page` into view
    ScrollIntoView { page: usize, offset: f32 },
    /// Start a real render for a page entering the window
    Mount(usize),
    /// Replace a page leaving the window with its placeholder
    Unmount(usize),
    CurrentPageChanged(usize),
    /// Placeholder footprint changed
    ResizePlaceholders(PageSize),
    /// Annotation pixel positions must be recomputed from their anchors
    RelayoutAnnotations,
    /// Rerender a mounted page (zoom or dark mode changed)
    RenderPage(usize),
    /// Arm the commit timer
    ScheduleCommit(PendingCommit),
    /// Drop every page render
    UnmountAll,
}

/// Viewport controller for one open document
#[derive(Debug)]
pub struct Viewport {
    document: Document,
    state: ViewportState,
    resolver: VisibilityResolver,
    window: RenderWindow,
    config: ViewportConfig,
}

impl Viewport {
    /// Open on page 1 at the zoom chosen for `viewport_width`
    #[must_use]
    pub fn new(document: Document, config: ViewportConfig, viewport_width: f32) -> Self {
        let current_page = document.clamp_page(1);
        let state = ViewportState {
            current_page,
            zoom_scale: config.zoom.initial_zoom(viewport_width),
            dark_mode: false,
        };
        let window = RenderWindow::compute(current_page, document.page_count, config.buffer_radius);
        let mut resolver = VisibilityResolver::new(config.resolver, current_page);
        resolver.retain_window(&window);

        log::debug!(
            "Viewport opened: {} pages, zoom {:.2}, window {}..={}",
            document.page_count,
            state.zoom_scale,
            window.first(),
            window.last()
        );

        Self {
            document,
            state,
            resolver,
            window,
            config,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn state(&self) -> ViewportState {
        self.state
    }

    pub fn window(&self) -> RenderWindow {
        self.window
    }

    pub fn resolver(&self) -> &VisibilityResolver {
        &self.resolver
    }

    pub fn config(&self) -> &ViewportConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.resolver.is_disposed()
    }

    /// Slot layout at the current zoom
    pub fn layout(&self) -> SlotLayout {
        SlotLayout::build(
            &self.document,
            &self.window,
            self.state.zoom_scale,
            self.config.page_gap,
        )
    }

    /// Rendered (or placeholder) size of any page at the current zoom
    pub fn page_rendered_size(&self) -> PageSize {
        placeholder_size(self.document.reference_page_size, self.state.zoom_scale)
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        if self.is_closed() {
            log::trace!("Viewport closed, ignoring {cmd:?}");
            return vec![];
        }

        match cmd {
            Command::ScrollToPage(page) => self.navigate_to(page),

            Command::NextPage => {
                if self.state.current_page < self.document.page_count {
                    self.navigate_to(self.state.current_page + 1)
                } else {
                    vec![]
                }
            }

            Command::PrevPage => {
                if self.state.current_page > 1 {
                    self.navigate_to(self.state.current_page - 1)
                } else {
                    vec![]
                }
            }

            Command::SetZoom(scale) => self.set_zoom(scale),

            Command::ZoomIn => self.set_zoom(self.state.zoom_scale + ZOOM_STEP),

            Command::ZoomOut => self.set_zoom(self.state.zoom_scale - ZOOM_STEP),

            Command::ToggleDarkMode => {
                self.state.dark_mode = !self.state.dark_mode;
                self.window.pages().map(Effect::RenderPage).collect()
            }

            Command::Visibility { ratios, now } => self
                .resolver
                .observe(&ratios, now)
                .map(Effect::ScheduleCommit)
                .into_iter()
                .collect(),

            Command::Tick(now) => match self.resolver.poll(now) {
                Some(CommitOutcome::Changed { to, .. }) => {
                    self.state.current_page = to;
                    let mut effects = vec![Effect::CurrentPageChanged(to)];
                    effects.extend(self.refresh_window());
                    effects
                }
                _ => vec![],
            },

            Command::Close => {
                self.resolver.dispose();
                self.window = RenderWindow::EMPTY;
                log::debug!("Viewport closed");
                vec![Effect::UnmountAll]
            }
        }
    }

    /// Rasterize a mounted page into `target`, inverting it in dark mode.
    ///
    /// Placeholders never receive pixels.
    pub fn render_into<S: DocumentSource + ?Sized>(
        &self,
        source: &S,
        page: usize,
        target: &mut PageSurface,
    ) -> Result<(), RenderError> {
        if !self.window.contains(page) {
            return Err(RenderError::new(page, "page is outside the render window"));
        }
        source
            .render_page(page, self.state.zoom_scale, target)
            .inspect_err(|e| log::warn!("{e}; keeping placeholder"))?;
        if self.state.dark_mode {
            invert_rgb(&mut target.pixels);
        }
        Ok(())
    }

    fn navigate_to(&mut self, page: usize) -> Vec<Effect> {
        if self.document.is_empty() {
            return vec![];
        }
        let page = self.document.clamp_page(page);
        let mut effects = vec![];

        if page != self.state.current_page {
            self.state.current_page = page;
            self.resolver.set_current_page(page);
            effects.push(Effect::CurrentPageChanged(page));
        }

        let window_effects = self.refresh_window();
        let offset = self.layout().page_offset(page);
        effects.insert(0, Effect::ScrollIntoView { page, offset });
        effects.extend(window_effects);
        effects
    }

    fn set_zoom(&mut self, scale: f32) -> Vec<Effect> {
        let clamped = clamp_zoom(scale);
        if (self.state.zoom_scale - clamped).abs() <= f32::EPSILON {
            return vec![];
        }
        self.state.zoom_scale = clamped;
        log::debug!("Zoom set to {clamped:.2}");

        let mut effects = vec![
            Effect::ResizePlaceholders(self.page_rendered_size()),
            Effect::RelayoutAnnotations,
        ];
        effects.extend(self.window.pages().map(Effect::RenderPage));
        effects
    }

    /// Recompute the window around the current page and sync the resolver
    fn refresh_window(&mut self) -> Vec<Effect> {
        let new_window = RenderWindow::compute(
            self.state.current_page,
            self.document.page_count,
            self.config.buffer_radius,
        );
        let diff = RenderWindow::diff(&self.window, &new_window);
        self.window = new_window;
        self.resolver.retain_window(&new_window);

        if !diff.is_empty() {
            log::debug!(
                "Render window now {}..={} (+{:?} -{:?})",
                new_window.first(),
                new_window.last(),
                diff.mounted,
                diff.unmounted
            );
        }

        diff.unmounted
            .into_iter()
            .map(Effect::Unmount)
            .chain(diff.mounted.into_iter().map(Effect::Mount))
            .collect()
    }
}

/// Invert every channel of packed RGB pixels in place
pub fn invert_rgb(pixels: &mut [u8]) {
    for byte in pixels {
        *byte = 255 - *byte;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::document::{FixedGeometrySource, load_document};

    fn viewport(pages: usize) -> Viewport {
        let doc = load_document(&FixedGeometrySource::new(pages, PageSize::new(612.0, 792.0)));
        Viewport::new(doc, ViewportConfig::default(), 1280.0)
    }

    #[test]
    fn opens_on_first_page_with_window() {
        let vp = viewport(10);
        assert_eq!(vp.state().current_page, 1);
        assert_eq!(vp.window().pages().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(vp.resolver().observed_pages(), vec![1, 2, 3]);
    }

    #[test]
    fn jump_to_page_seven_mounts_five_through_nine() {
        let mut vp = viewport(10);
        let effects = vp.apply(Command::ScrollToPage(7));

        assert_eq!(vp.state().current_page, 7);
        assert_eq!(vp.window().pages().collect::<Vec<_>>(), vec![5, 6, 7, 8, 9]);
        assert_eq!(
            effects,
            vec![
                Effect::ScrollIntoView {
                    page: 7,
                    offset: 6.0 * (792.0 + 16.0)
                },
                Effect::CurrentPageChanged(7),
                Effect::Unmount(1),
                Effect::Unmount(2),
                Effect::Unmount(3),
                Effect::Mount(5),
                Effect::Mount(6),
                Effect::Mount(7),
                Effect::Mount(8),
                Effect::Mount(9),
            ]
        );

        let layout = vp.layout();
        for page in [1, 2, 3, 4, 10] {
            let slot = layout.slot(page).unwrap();
            assert!(!slot.is_rendered());
            assert_eq!(slot.size(), PageSize::new(612.0, 792.0));
        }
        assert_eq!(vp.resolver().observed_pages(), vec![5, 6, 7, 8, 9]);
    }

    #[test]
    fn next_and_prev_stop_at_edges() {
        let mut vp = viewport(3);
        assert!(vp.apply(Command::PrevPage).is_empty());
        let _ = vp.apply(Command::NextPage);
        let _ = vp.apply(Command::NextPage);
        assert_eq!(vp.state().current_page, 3);
        assert!(vp.apply(Command::NextPage).is_empty());
    }

    #[test]
    fn scroll_to_out_of_range_page_clamps() {
        let mut vp = viewport(5);
        let _ = vp.apply(Command::ScrollToPage(99));
        assert_eq!(vp.state().current_page, 5);
        let _ = vp.apply(Command::ScrollToPage(0));
        assert_eq!(vp.state().current_page, 1);
    }

    #[test]
    fn zoom_clamps_and_steps() {
        let mut vp = viewport(4);
        let effects = vp.apply(Command::SetZoom(10.0));
        assert_eq!(vp.state().zoom_scale, MAX_ZOOM);
        assert_eq!(
            effects[..2],
            [
                Effect::ResizePlaceholders(PageSize::new(1836.0, 2376.0)),
                Effect::RelayoutAnnotations
            ]
        );
        assert!(vp.apply(Command::ZoomIn).is_empty());

        let _ = vp.apply(Command::SetZoom(0.6));
        let _ = vp.apply(Command::ZoomOut);
        assert_eq!(vp.state().zoom_scale, MIN_ZOOM);

        let _ = vp.apply(Command::SetZoom(1.0));
        for _ in 0..5 {
            let _ = vp.apply(Command::ZoomIn);
        }
        assert_eq!(vp.state().zoom_scale, 2.0);
    }

    #[test]
    fn zoom_rerenders_mounted_pages_only() {
        let mut vp = viewport(10);
        let effects = vp.apply(Command::ZoomIn);
        let rerendered: Vec<usize> = effects
            .iter()
            .filter_map(|e| match e {
                Effect::RenderPage(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(rerendered, vec![1, 2, 3]);
    }

    #[test]
    fn narrow_viewport_opens_smaller() {
        let doc = load_document(&FixedGeometrySource::new(2, PageSize::new(100.0, 100.0)));
        let vp = Viewport::new(doc, ViewportConfig::default(), 400.0);
        assert_eq!(vp.state().zoom_scale, 0.6);
    }

    #[test]
    fn scrolling_commit_moves_window() {
        let t0 = Instant::now();
        let mut vp = viewport(10);

        let effects = vp.apply(Command::Visibility {
            ratios: vec![(2, 0.3), (3, 0.8)],
            now: t0,
        });
        assert!(matches!(effects[..], [Effect::ScheduleCommit(_)]));

        assert!(vp.apply(Command::Tick(t0 + Duration::from_millis(40))).is_empty());
        let effects = vp.apply(Command::Tick(t0 + Duration::from_millis(100)));
        assert_eq!(
            effects,
            vec![
                Effect::CurrentPageChanged(3),
                Effect::Mount(4),
                Effect::Mount(5)
            ]
        );
        assert_eq!(vp.state().current_page, 3);
    }

    #[test]
    fn dark_mode_inverts_rendered_pixels() {
        let source = FixedGeometrySource::new(3, PageSize::new(4.0, 4.0));
        let mut vp = Viewport::new(load_document(&source), ViewportConfig::default(), 1280.0);

        let effects = vp.apply(Command::ToggleDarkMode);
        assert_eq!(
            effects,
            vec![
                Effect::RenderPage(1),
                Effect::RenderPage(2),
                Effect::RenderPage(3)
            ]
        );

        let mut surface = PageSurface::default();
        vp.render_into(&source, 2, &mut surface).unwrap();
        let expected = 255 - FixedGeometrySource::shade_for(2);
        assert!(surface.pixels.iter().all(|&b| b == expected));
    }

    #[test]
    fn placeholders_are_never_rendered() {
        let source = FixedGeometrySource::new(10, PageSize::new(4.0, 4.0));
        let vp = Viewport::new(load_document(&source), ViewportConfig::default(), 1280.0);
        let mut surface = PageSurface::default();
        assert!(vp.render_into(&source, 9, &mut surface).is_err());
        assert!(surface.is_empty());
    }

    #[test]
    fn render_failure_is_reported() {
        let source = FixedGeometrySource::new(3, PageSize::new(4.0, 4.0)).with_failing_render(2);
        let vp = Viewport::new(load_document(&source), ViewportConfig::default(), 1280.0);
        let mut surface = PageSurface::default();
        let err = vp.render_into(&source, 2, &mut surface).unwrap_err();
        assert_eq!(err.page, 2);
    }

    #[test]
    fn close_disposes_and_ignores_late_ticks() {
        let t0 = Instant::now();
        let mut vp = viewport(10);
        let _ = vp.apply(Command::Visibility {
            ratios: vec![(3, 0.9)],
            now: t0,
        });

        assert_eq!(vp.apply(Command::Close), vec![Effect::UnmountAll]);
        assert!(vp.is_closed());
        assert!(vp.apply(Command::Tick(t0 + Duration::from_secs(1))).is_empty());
        assert!(vp.apply(Command::NextPage).is_empty());
        assert_eq!(vp.state().current_page, 1);
    }

    #[test]
    fn empty_document_ignores_navigation() {
        let mut vp = viewport(0);
        assert_eq!(vp.state().current_page, 0);
        assert!(vp.window().is_empty());
        assert!(vp.apply(Command::ScrollToPage(3)).is_empty());
        assert!(vp.apply(Command::NextPage).is_empty());
    }
}
