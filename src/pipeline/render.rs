//! PDF rasterisation: turn workbook PDF pages into PNG images via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and is CPU-bound. Every call binds, parses and renders on the
//! blocking pool so Tokio worker threads never stall while a dashboard page
//! is being rasterised.
//!
//! ## Why cap pixels as well as DPI?
//!
//! DPI decides the scale, `max_rendered_pixels` bounds the longest edge. A
//! Tabloid page at 1200 DPI would otherwise be a 20 400 × 13 200 px bitmap.

use super::encode::to_page_image;
use crate::error::ExportError;
use crate::model::{PageImage, WorkbookDocument};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// PDF user-space units per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Converts a workbook PDF into page images.
#[async_trait::async_trait]
pub trait Rasterizer: Send + Sync {
    /// Number of pages; always ≥ 1 on success.
    async fn page_count(&self, document: &WorkbookDocument) -> Result<usize, ExportError>;

    /// Render 1-indexed `page_number` at `dpi`.
    async fn render(
        &self,
        document: &WorkbookDocument,
        page_number: usize,
        dpi: u32,
    ) -> Result<PageImage, ExportError>;
}

/// [`Rasterizer`] backed by a dynamically bound pdfium library.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    library_path: Option<PathBuf>,
    max_rendered_pixels: u32,
}

impl PdfiumRasterizer {
    /// `library_path` may name the pdfium shared library itself or the
    /// directory that holds it; `None` uses the system library search path.
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self {
            library_path,
            max_rendered_pixels: 10_000,
        }
    }

    pub fn with_max_rendered_pixels(mut self, px: u32) -> Self {
        self.max_rendered_pixels = px;
        self
    }

    /// Bind once to check that pdfium can be loaded at all.
    pub fn probe(&self) -> Result<(), ExportError> {
        bind(self.library_path.as_deref()).map(|_| ())
    }
}

#[async_trait::async_trait]
impl Rasterizer for PdfiumRasterizer {
    async fn page_count(&self, document: &WorkbookDocument) -> Result<usize, ExportError> {
        check_magic(document.as_bytes())?;
        let bytes = document.shared_bytes();
        let library = self.library_path.clone();

        let total = tokio::task::spawn_blocking(move || {
            let pdfium = bind(library.as_deref())?;
            let doc = open(&pdfium, &bytes)?;
            let total = doc.pages().len() as usize;
            Ok::<_, ExportError>(total)
        })
        .await
        .map_err(|e| ExportError::Internal(format!("Page-count task panicked: {}", e)))??;

        if total == 0 {
            return Err(ExportError::MalformedDocument {
                detail: "the PDF has no pages".to_string(),
            });
        }
        info!("PDF loaded: {} pages", total);
        Ok(total)
    }

    async fn render(
        &self,
        document: &WorkbookDocument,
        page_number: usize,
        dpi: u32,
    ) -> Result<PageImage, ExportError> {
        check_magic(document.as_bytes())?;
        if dpi == 0 {
            return Err(ExportError::Configuration("DPI must be positive".into()));
        }
        let bytes = document.shared_bytes();
        let library = self.library_path.clone();
        let max_pixels = self.max_rendered_pixels;

        tokio::task::spawn_blocking(move || {
            render_page_blocking(library.as_deref(), &bytes, page_number, dpi, max_pixels)
        })
        .await
        .map_err(|e| ExportError::Internal(format!("Render task panicked: {}", e)))?
    }
}

fn check_magic(bytes: &[u8]) -> Result<(), ExportError> {
    if bytes.starts_with(b"%PDF") {
        return Ok(());
    }
    let head = &bytes[..bytes.len().min(8)];
    Err(ExportError::MalformedDocument {
        detail: format!("missing %PDF header (starts with {:?})", String::from_utf8_lossy(head)),
    })
}

fn bind(library_path: Option<&Path>) -> Result<Pdfium, ExportError> {
    let bindings = match library_path {
        Some(path) if path.is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
        }
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| ExportError::EngineUnavailable(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

fn open<'a>(pdfium: &'a Pdfium, bytes: &'a Arc<[u8]>) -> Result<PdfDocument<'a>, ExportError> {
    pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| ExportError::MalformedDocument {
            detail: format!("{:?}", e),
        })
}

/// Blocking implementation of page rendering.
fn render_page_blocking(
    library_path: Option<&Path>,
    bytes: &Arc<[u8]>,
    page_number: usize,
    dpi: u32,
    max_pixels: u32,
) -> Result<PageImage, ExportError> {
    let pdfium = bind(library_path)?;
    let document = open(&pdfium, bytes)?;

    let pages = document.pages();
    let total = pages.len() as usize;
    if page_number == 0 || page_number > total {
        return Err(ExportError::PageOutOfRange {
            page: page_number,
            total,
        });
    }

    let page = pages
        .get((page_number - 1) as u16)
        .map_err(|e| ExportError::MalformedDocument {
            detail: format!("page {}: {:?}", page_number, e),
        })?;

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / POINTS_PER_INCH)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| ExportError::MalformedDocument {
            detail: format!("page {}: {:?}", page_number, e),
        })?;

    let image = bitmap.as_image();
    debug!(
        "Rendered page {} → {}x{} px",
        page_number,
        image.width(),
        image.height()
    );

    to_page_image(&image, page_number, dpi)
}
