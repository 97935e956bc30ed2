//! Document geometry provider
//!
//! Wraps a decoding capability behind [`DocumentSource`] and derives the
//! immutable [`Document`] description the rest of the engine works from:
//! page count plus the natural size of a reference page.

use crate::error::{GeometryError, RenderError};

/// Page size used when the reference geometry cannot be obtained (US Letter, points).
pub const FALLBACK_PAGE_SIZE: PageSize = PageSize {
    width: 612.0,
    height: 792.0,
};

/// Page number used as the geometry reference (1-indexed)
pub const REFERENCE_PAGE: usize = 1;

/// Width and height of a page in unscaled units
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Size at the given zoom scale
    pub fn scaled(self, scale: f32) -> Self {
        Self {
            width: self.width * scale,
            height: self.height * scale,
        }
    }

    /// True when both dimensions are finite and strictly positive
    pub fn is_usable(self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Descriptive metadata reported by a source
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

/// RGB pixels of a rasterized page.
///
/// Three bytes per pixel, rows packed without padding.
#[derive(Clone, Default)]
pub struct PageSurface {
    pub pixels: Vec<u8>,
    pub width_px: u32,
    pub height_px: u32,
}

impl PageSurface {
    /// Resize the surface, clearing existing pixels to white
    pub fn reset(&mut self, width_px: u32, height_px: u32) {
        self.width_px = width_px;
        self.height_px = height_px;
        self.pixels.clear();
        self.pixels
            .resize(width_px as usize * height_px as usize * 3, 0xFF);
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
}

impl std::fmt::Debug for PageSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageSurface")
            .field("width_px", &self.width_px)
            .field("height_px", &self.height_px)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Capability to query and rasterize pages of an opened document.
///
/// Page numbers are 1-indexed throughout.
pub trait DocumentSource {
    fn page_count(&self) -> usize;

    /// Geometry-only query; implementations must not rasterize.
    fn page_geometry(&self, page: usize, scale: f32) -> Result<PageSize, GeometryError>;

    fn render_page(
        &self,
        page: usize,
        scale: f32,
        target: &mut PageSurface,
    ) -> Result<(), RenderError>;

    fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata::default()
    }
}

impl<T: DocumentSource + ?Sized> DocumentSource for Box<T> {
    fn page_count(&self) -> usize {
        (**self).page_count()
    }

    fn page_geometry(&self, page: usize, scale: f32) -> Result<PageSize, GeometryError> {
        (**self).page_geometry(page, scale)
    }

    fn render_page(
        &self,
        page: usize,
        scale: f32,
        target: &mut PageSurface,
    ) -> Result<(), RenderError> {
        (**self).render_page(page, scale, target)
    }

    fn metadata(&self) -> DocumentMetadata {
        (**self).metadata()
    }
}

/// Immutable description of a loaded document
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub page_count: usize,
    /// Natural size of the reference page at scale 1.0
    pub reference_page_size: PageSize,
    /// True when `reference_page_size` is [`FALLBACK_PAGE_SIZE`] because geometry failed
    pub geometry_fallback: bool,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn is_empty(&self) -> bool {
        self.page_count == 0
    }

    /// Clamp a page number into `1..=page_count` (0 for an empty document)
    pub fn clamp_page(&self, page: usize) -> usize {
        if self.page_count == 0 {
            0
        } else {
            page.clamp(1, self.page_count)
        }
    }
}

/// Build the [`Document`] description from an opened source.
///
/// Geometry failures are recovered with [`FALLBACK_PAGE_SIZE`]; only a
/// decode failure reported by `open` upstream ends the load.
pub fn load_document<S: DocumentSource + ?Sized>(source: &S) -> Document {
    let page_count = source.page_count();
    let metadata = source.metadata();

    if page_count == 0 {
        log::debug!("Loaded empty document");
        return Document {
            page_count,
            reference_page_size: FALLBACK_PAGE_SIZE,
            geometry_fallback: true,
            metadata,
        };
    }

    let (reference_page_size, geometry_fallback) =
        match source.page_geometry(REFERENCE_PAGE, 1.0) {
            Ok(size) if size.is_usable() => (size, false),
            Ok(size) => {
                log::warn!(
                    "Reference page reported unusable size {}x{}, using fallback",
                    size.width,
                    size.height
                );
                (FALLBACK_PAGE_SIZE, true)
            }
            Err(e) => {
                log::warn!("{e}; using fallback page size");
                (FALLBACK_PAGE_SIZE, true)
            }
        };

    log::debug!(
        "Loaded document: {} pages, reference {}x{}",
        page_count,
        reference_page_size.width,
        reference_page_size.height
    );

    Document {
        page_count,
        reference_page_size,
        geometry_fallback,
        metadata,
    }
}

/// Synthetic source where every page has the same size.
///
/// Rendering fills the surface with a per-page gray level so tests can tell
/// pages apart and observe inversion.
#[derive(Clone, Debug)]
pub struct FixedGeometrySource {
    page_count: usize,
    page_size: PageSize,
    metadata: DocumentMetadata,
    fail_geometry: bool,
    fail_render: Vec<usize>,
}

impl FixedGeometrySource {
    pub fn new(page_count: usize, page_size: PageSize) -> Self {
        Self {
            page_count,
            page_size,
            metadata: DocumentMetadata::default(),
            fail_geometry: false,
            fail_render: Vec::new(),
        }
    }

    /// Make every geometry query fail
    pub fn with_failing_geometry(mut self) -> Self {
        self.fail_geometry = true;
        self
    }

    /// Make rendering of `page` fail
    pub fn with_failing_render(mut self, page: usize) -> Self {
        self.fail_render.push(page);
        self
    }

    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Gray level painted for `page`
    pub fn shade_for(page: usize) -> u8 {
        (page % 200) as u8 + 20
    }
}

impl DocumentSource for FixedGeometrySource {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_geometry(&self, page: usize, scale: f32) -> Result<PageSize, GeometryError> {
        if self.fail_geometry {
            return Err(GeometryError::new(page, "geometry unavailable"));
        }
        if page == 0 || page > self.page_count {
            return Err(GeometryError::new(page, "page out of range"));
        }
        Ok(self.page_size.scaled(scale))
    }

    fn render_page(
        &self,
        page: usize,
        scale: f32,
        target: &mut PageSurface,
    ) -> Result<(), RenderError> {
        if page == 0 || page > self.page_count {
            return Err(RenderError::new(page, "page out of range"));
        }
        if self.fail_render.contains(&page) {
            return Err(RenderError::new(page, "rasterizer failure"));
        }
        let size = self.page_size.scaled(scale);
        target.reset(size.width.round() as u32, size.height.round() as u32);
        target.pixels.fill(Self::shade_for(page));
        Ok(())
    }

    fn metadata(&self) -> DocumentMetadata {
        self.metadata.clone()
    }
}
