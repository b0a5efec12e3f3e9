//! The export run: sign in, fetch the workbook PDF, then render and upload
//! every page.
//!
//! ```text
//! Idle ─▶ SessionOpen ─▶ DocumentRetrieved ─▶ Paginating(p) ─▶ Uploading(p) ─▶ … ─▶ Completed
//!   └──────────┴───────────────┴──────────────────┴─────────▶ Aborted
//! ```
//!
//! Fatal errors abort the run and come back as [`PipelineError`]; a page that
//! fails to render or upload is recorded in the [`ExportReport`] and the run
//! moves on to the next page. Whenever sign-in succeeded, sign-out runs exactly
//! once, after the inner run returns, whatever its outcome.

use crate::config::{ExportConfig, Settings};
use crate::drive::{DriveClient, Uploader};
use crate::error::{ExportError, PageError, PageStage, PipelineError, Stage};
use crate::model::{PageImage, UploadTarget, WorkbookDocument};
use crate::output::{ExportReport, PageOutcome};
use crate::pipeline::{PdfiumRasterizer, Rasterizer};
use crate::tableau::{Session, TableauApi, TableauClient};
use futures::stream::{self, StreamExt};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    SessionOpen,
    DocumentRetrieved,
    Paginating(usize),
    Uploading(usize),
    Completed,
    Aborted,
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportState::Idle => f.write_str("idle"),
            ExportState::SessionOpen => f.write_str("session open"),
            ExportState::DocumentRetrieved => f.write_str("document retrieved"),
            ExportState::Paginating(p) => write!(f, "paginating page {p}"),
            ExportState::Uploading(p) => write!(f, "uploading page {p}"),
            ExportState::Completed => f.write_str("completed"),
            ExportState::Aborted => f.write_str("aborted"),
        }
    }
}

fn enter(state: ExportState) {
    debug!(%state, "export state");
}

/// One workbook → one Drive folder.
pub struct ExportPipeline {
    tableau: Arc<dyn TableauApi>,
    rasterizer: Arc<dyn Rasterizer>,
    uploader: Arc<dyn Uploader>,
    folder_id: String,
    config: ExportConfig,
}

impl fmt::Debug for ExportPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportPipeline")
            .field("folder_id", &self.folder_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ExportPipeline {
    pub fn new(
        tableau: Arc<dyn TableauApi>,
        rasterizer: Arc<dyn Rasterizer>,
        uploader: Arc<dyn Uploader>,
        folder_id: impl Into<String>,
        config: ExportConfig,
    ) -> Self {
        Self {
            tableau,
            rasterizer,
            uploader,
            folder_id: folder_id.into(),
            config,
        }
    }

    /// Wire the real Tableau, pdfium and Drive components from settings.
    ///
    /// Reads the service-account key file but makes no network call.
    pub fn from_settings(settings: &Settings, pdfium_library: Option<PathBuf>) -> Result<Self, ExportError> {
        let tableau = TableauClient::new(settings.tableau.clone(), &settings.http)?;
        let drive = DriveClient::from_service_account(settings.drive.service_account_path(), &settings.http)?
            .with_collision_policy(settings.export.collision_policy)
            .with_share(settings.export.share.clone());
        let rasterizer =
            PdfiumRasterizer::new(pdfium_library).with_max_rendered_pixels(settings.export.max_rendered_pixels);

        Ok(Self::new(
            Arc::new(tableau),
            Arc::new(rasterizer),
            Arc::new(drive),
            settings.drive.folder_id(),
            settings.export.clone(),
        ))
    }

    pub fn folder_id(&self) -> &str {
        &self.folder_id
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Run one export.
    ///
    /// # Errors
    /// Returns `Err(PipelineError)` only for fatal errors (invalid config, sign-in, workbook
    /// lookup, download, page count). Per-page failures are reported inside
    /// the `Ok` report.
    pub async fn run(&self) -> Result<ExportReport, PipelineError> {
        let started = Instant::now();
        enter(ExportState::Idle);

        if let Err(e) = self.config.validate() {
            enter(ExportState::Aborted);
            return Err(PipelineError::new(Stage::Configuration, e));
        }

        let session = match self.tableau.sign_in().await {
            Ok(session) => session,
            Err(e) => {
                warn!("Tableau sign-in failed: {}", e);
                enter(ExportState::Aborted);
                return Err(PipelineError::new(Stage::SessionOpen, e));
            }
        };
        enter(ExportState::SessionOpen);

        let result = self.run_in_session(&session, started).await;

        match &result {
            Ok(_) => enter(ExportState::Completed),
            Err(e) => {
                warn!("{}", e);
                enter(ExportState::Aborted);
            }
        }
        if let Err(e) = self.tableau.sign_out(session).await {
            warn!("Tableau sign-out failed: {}", e);
        }

        result
    }

    async fn run_in_session(&self, session: &Session, started: Instant) -> Result<ExportReport, PipelineError> {
        // ── Step 1: Resolve workbook ─────────────────────────────────────────
        let (workbook_id, workbook_name) = match self.config.workbook_id {
            Some(ref id) => (id.clone(), None),
            None => {
                let workbooks = self
                    .tableau
                    .list_workbooks(session)
                    .await
                    .map_err(|e| PipelineError::new(Stage::WorkbookLookup, e))?;
                let first = workbooks.into_iter().next().ok_or_else(|| {
                    PipelineError::new(
                        Stage::WorkbookLookup,
                        ExportError::NotFound {
                            resource: "workbook".to_string(),
                            detail: "the site has no workbooks".to_string(),
                        },
                    )
                })?;
                info!("No workbook id given; exporting first workbook '{}' ({})", first.name, first.id);
                (first.id, Some(first.name))
            }
        };

        // ── Step 2: Download PDF ─────────────────────────────────────────────
        let mut document = self
            .tableau
            .download_workbook_pdf(session, &workbook_id, &self.config.pdf_options())
            .await
            .map_err(|e| PipelineError::new(Stage::Download, e))?;
        if let Some(name) = workbook_name {
            document = document.with_name(name);
        }
        enter(ExportState::DocumentRetrieved);
        self.keep_local_copy(&format!("{}.pdf", safe_file_stem(document.name())), document.as_bytes())
            .await;

        // ── Step 3: Page count ───────────────────────────────────────────────
        let total_pages = self
            .rasterizer
            .page_count(&document)
            .await
            .map_err(|e| PipelineError::new(Stage::Pagination, e))?;
        if total_pages > self.config.max_pages {
            return Err(PipelineError::new(
                Stage::Pagination,
                ExportError::LimitExceeded {
                    what: "page count",
                    actual: total_pages as u64,
                    limit: self.config.max_pages as u64,
                },
            ));
        }
        info!(
            "Exporting '{}' ({} pages) to Drive folder {}",
            document.name(),
            total_pages,
            self.folder_id
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_export_start(document.name(), total_pages);
        }

        // ── Step 4: Render + upload each page ────────────────────────────────
        let mut pages: Vec<PageOutcome> = stream::iter(1..=total_pages)
            .map(|page| self.process_page(&document, page, total_pages))
            .buffered(self.config.concurrency)
            .collect()
            .await;
        pages.sort_by_key(|p| p.page);

        let report = ExportReport {
            workbook_id: document.workbook_id().to_string(),
            workbook_name: document.name().to_string(),
            folder_id: self.folder_id.clone(),
            page_count: total_pages,
            pages,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            "Export complete: {}/{} pages uploaded, {}ms total",
            report.uploaded_count(),
            total_pages,
            report.duration_ms
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_export_complete(total_pages, report.uploaded_count());
        }

        Ok(report)
    }

    /// Render and upload one page. Never fails: errors become the outcome.
    async fn process_page(&self, document: &WorkbookDocument, page: usize, total: usize) -> PageOutcome {
        enter(ExportState::Paginating(page));
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_page_start(page, total);
        }

        let image = match self.rasterizer.render(document, page, self.config.dpi).await {
            Ok(image) => image,
            Err(e) => return self.page_failed(page, total, PageStage::Render, &e),
        };
        self.keep_local_png(&image).await;

        enter(ExportState::Uploading(page));
        let target = UploadTarget::for_page(&self.folder_id, page, self.config.file_prefix.as_deref());
        match self.uploader.upload(&image, &target).await {
            Ok(file) => {
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_page_uploaded(page, total, &file);
                }
                PageOutcome::uploaded(page, file)
            }
            Err(e) => self.page_failed(page, total, PageStage::Upload, &e),
        }
    }

    fn page_failed(&self, page: usize, total: usize, stage: PageStage, error: &ExportError) -> PageOutcome {
        let err = PageError::new(page, stage, error);
        warn!("{}", err);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_page_error(page, total, &err);
        }
        PageOutcome::failed(err)
    }

    async fn keep_local_png(&self, image: &PageImage) {
        let name = UploadTarget::for_page(&self.folder_id, image.page_number, self.config.file_prefix.as_deref())
            .file_name;
        self.keep_local_copy(&name, &image.png).await;
    }

    /// Best-effort copy into `output_dir`; a failure is only logged.
    async fn keep_local_copy(&self, file_name: &str, bytes: &[u8]) {
        let Some(ref dir) = self.config.output_dir else {
            return;
        };
        let dir = dir.clone();
        let name = file_name.to_string();
        let bytes = bytes.to_vec();
        let written = tokio::task::spawn_blocking(move || write_atomic(&dir, &name, &bytes))
            .await
            .map_err(|e| ExportError::Internal(format!("Local write task panicked: {}", e)))
            .and_then(|r| r);
        match written {
            Ok(path) => debug!("Wrote local copy {}", path.display()),
            Err(e) => warn!("Local copy of '{}' not written: {}", file_name, e),
        }
    }
}

/// Atomic write: temp file in the target directory, then rename.
fn write_atomic(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ExportError> {
    let path = dir.join(file_name);
    let fail = |source: std::io::Error| ExportError::OutputWriteFailed {
        path: path.clone(),
        source,
    };
    std::fs::create_dir_all(dir).map_err(fail)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(fail)?;
    tmp.write_all(bytes).map_err(fail)?;
    tmp.persist(&path).map_err(|e| fail(e.error))?;
    Ok(path)
}

/// Workbook names may contain path separators and other awkward characters.
fn safe_file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = stem.trim().trim_start_matches('.').to_string();
    if stem.is_empty() {
        "workbook".to_string()
    } else {
        stem
    }
}
