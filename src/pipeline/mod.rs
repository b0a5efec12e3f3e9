//! Local pipeline stages between the Tableau download and the Drive upload.
//!
//! ## Data Flow
//!
//! ```text
//! WorkbookDocument ──▶ render ──▶ encode ──▶ PageImage
//!  (PDF bytes)         (pdfium)   (PNG)
//! ```
//!
//! 1. [`render`]: count pages and rasterise one page; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 2. [`encode`]: PNG-encode the bitmap deterministically

pub mod encode;
pub mod render;

pub use render::{PdfiumRasterizer, Rasterizer};
