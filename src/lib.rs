//! # gslidegen
//!
//! Export the pages of a Tableau workbook as PNG images into a Google Drive
//! folder.
//!
//! ## Why this crate?
//!
//! Slide decks and scheduled reports often embed Tableau dashboards as
//! pictures. Refreshing them by hand means exporting a PDF, screenshotting
//! every page and dragging files into Drive. This crate does the whole round
//! trip in one run: it asks Tableau for the workbook as a PDF, rasterises each
//! page with pdfium and uploads `page1.png`, `page2.png`, … into a folder,
//! replacing last run's images in place so links in the deck keep working.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Settings
//!  │
//!  ├─ 1. Sign in    Tableau personal access token → session
//!  ├─ 2. Lookup     explicit workbook id, or the first workbook on the site
//!  ├─ 3. Download   workbook PDF (page type, orientation, view filters)
//!  ├─ 4. Paginate   page count via pdfium (spawn_blocking)
//!  ├─ 5. Render     page N → PNG at the configured DPI
//!  ├─ 6. Upload     Drive v3 multipart upload as a service account
//!  └─ 7. Sign out   always, once the session was opened
//! ```
//!
//! Steps 5 and 6 run per page. A failed page is recorded in the
//! [`ExportReport`] and the run moves on; anything that fails in steps 1–4
//! aborts the run with a [`PipelineError`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gslidegen::{ExportConfig, ExportPipeline, HttpConfig, RunStatus, Settings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let export = ExportConfig::builder().workbook_id("wb-42").dpi(200).build()?;
//!     let settings = Settings::from_lookup(|k| std::env::var(k).ok(), HttpConfig::default(), export)?;
//!
//!     let pipeline = ExportPipeline::from_settings(&settings, None)?;
//!     let result = pipeline.run().await;
//!     if let Ok(ref report) = result {
//!         for (page, file) in report.uploaded() {
//!             println!("page {page} → {}", file.name);
//!         }
//!     }
//!     std::process::exit(RunStatus::of(&result).exit_code() as i32);
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `gslidegen` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! gslidegen = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime requirement
//!
//! Rendering needs a pdfium shared library. Put it on the system library
//! path, or pass its location to [`PdfiumRasterizer::new`] (the CLI reads
//! `PDFIUM_LIB_PATH`).

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod drive;
pub mod error;
pub mod export;
mod http;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod tableau;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    CollisionPolicy, DriveConfig, ExportConfig, ExportConfigBuilder, Grantee, HttpConfig, Settings, ShareRole, ShareSpec,
    TableauConfig,
};
pub use drive::{DriveClient, Uploader};
pub use error::{ErrorKind, ExportError, PageError, PageStage, PipelineError, Stage};
pub use export::{ExportPipeline, ExportState};
pub use model::{PageImage, UploadTarget, UploadedFile, WorkbookDocument};
pub use output::{ExportReport, PageOutcome, RunStatus};
pub use pipeline::{PdfiumRasterizer, Rasterizer};
pub use progress::{ExportProgressCallback, NoopProgressCallback, ProgressCallback};
pub use tableau::{Orientation, PageType, PdfExportOptions, Session, TableauApi, TableauClient, WorkbookSummary};
