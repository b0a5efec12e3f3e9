//! Progress-callback trait for per-page export events.
//!
//! Inject an [`Arc<dyn ExportProgressCallback>`] via
//! [`crate::config::ExportConfigBuilder::progress_callback`] to receive
//! events as the pipeline renders and uploads each page.
//!
//! # Example
//!
//! ```rust
//! use gslidegen::{ExportConfig, ExportProgressCallback, UploadedFile};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     uploaded: AtomicUsize,
//! }
//!
//! impl ExportProgressCallback for CountingCallback {
//!     fn on_page_uploaded(&self, page: usize, total: usize, file: &UploadedFile) {
//!         self.uploaded.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {page}/{total} → {}", file.name);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { uploaded: AtomicUsize::new(0) });
//!
//! let config = ExportConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExportProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::PageError;
use crate::model::UploadedFile;
use std::sync::Arc;

/// Called by the export pipeline as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// With `concurrency > 1`, `on_page_start`, `on_page_uploaded` and
/// `on_page_error` may be called for several pages at once. Implementations
/// must protect shared mutable state (`Mutex`, `AtomicUsize`, …).
pub trait ExportProgressCallback: Send + Sync {
    /// Called once after the page count is known, before page 1 is rendered.
    fn on_export_start(&self, workbook_name: &str, total_pages: usize) {
        let _ = (workbook_name, total_pages);
    }

    /// Called just before a page is rendered.
    fn on_page_start(&self, page: usize, total_pages: usize) {
        let _ = (page, total_pages);
    }

    /// Called when a page has landed in Drive.
    fn on_page_uploaded(&self, page: usize, total_pages: usize, file: &UploadedFile) {
        let _ = (page, total_pages, file);
    }

    /// Called when rendering or uploading a page failed.
    fn on_page_error(&self, page: usize, total_pages: usize, error: &PageError) {
        let _ = (page, total_pages, error);
    }

    /// Called once after every page has been attempted.
    ///
    /// # Arguments
    /// * `total_pages`   : pages in the document
    /// * `uploaded_count`: pages that were uploaded without error
    fn on_export_complete(&self, total_pages: usize, uploaded_count: usize) {
        let _ = (total_pages, uploaded_count);
    }
}

/// Ignores every event. For callers that must pass a [`ProgressCallback`]
/// but want no reporting; a config without a callback skips the calls entirely.
pub struct NoopProgressCallback;

impl ExportProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExportConfig`].
pub type ProgressCallback = Arc<dyn ExportProgressCallback>;
