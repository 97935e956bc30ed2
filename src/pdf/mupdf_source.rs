use std::path::Path;

use mupdf::{Colorspace, Document, Matrix, MetadataName, Pixmap};

use crate::document::{DocumentMetadata, DocumentSource, PageSize, PageSurface};
use crate::error::{DecodeError, GeometryError, RenderError};

/// A PDF opened through MuPDF
pub struct MupdfSource {
    doc: Document,
    page_count: usize,
}

impl MupdfSource {
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        let doc = Document::open(path.to_string_lossy().as_ref())
            .map_err(|e| DecodeError::new(format!("{}: {e}", path.display())))?;
        let page_count = doc
            .page_count()
            .map_err(|e| DecodeError::new(format!("{}: {e}", path.display())))?;
        log::info!("Opened {} ({page_count} pages)", path.display());
        Ok(Self {
            doc,
            page_count: page_count.max(0) as usize,
        })
    }

    fn load_page(&self, page: usize) -> Result<mupdf::Page, mupdf::error::Error> {
        self.doc.load_page(page as i32 - 1)
    }
}

impl DocumentSource for MupdfSource {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_geometry(&self, page: usize, scale: f32) -> Result<PageSize, GeometryError> {
        if page == 0 || page > self.page_count {
            return Err(GeometryError::new(page, "page out of range"));
        }
        let bounds = self
            .load_page(page)
            .and_then(|p| p.bounds())
            .map_err(|e| GeometryError::new(page, e.to_string()))?;
        Ok(PageSize::new(bounds.x1 - bounds.x0, bounds.y1 - bounds.y0).scaled(scale))
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
        let pixmap = self
            .load_page(page)
            .and_then(|p| {
                p.to_pixmap(
                    &Matrix::new_scale(scale, scale),
                    &Colorspace::device_rgb(),
                    false,
                    false,
                )
            })
            .map_err(|e| RenderError::new(page, e.to_string()))?;
        copy_rgb(&pixmap, target).map_err(|detail| RenderError::new(page, detail))
    }

    fn metadata(&self) -> DocumentMetadata {
        let field = |name| {
            self.doc
                .metadata(name)
                .ok()
                .filter(|value: &String| !value.is_empty())
        };
        DocumentMetadata {
            title: field(MetadataName::Title),
            author: field(MetadataName::Author),
        }
    }
}

/// Copy pixmap samples into a packed RGB surface, dropping alpha and stride padding
fn copy_rgb(pixmap: &Pixmap, target: &mut PageSurface) -> Result<(), String> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(format!("unsupported pixmap format: {n} channels"));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    if samples.len() < stride.saturating_mul(height) || row_bytes > stride {
        return Err("pixmap buffer size mismatch".to_string());
    }

    target.width_px = pixmap.width();
    target.height_px = pixmap.height();
    target.pixels.clear();
    target.pixels.reserve(width * height * 3);
    for y in 0..height {
        let row = &samples[y * stride..y * stride + row_bytes];
        if n == 3 {
            target.pixels.extend_from_slice(row);
        } else {
            for px in row.chunks_exact(n) {
                target.pixels.extend_from_slice(&px[..3]);
            }
        }
    }
    Ok(())
}
