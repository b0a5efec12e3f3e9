//! Tableau Server / Tableau Cloud REST access.
//!
//! The pipeline depends on [`TableauApi`], never on HTTP details, so tests
//! can swap in an in-memory fake. [`TableauClient`] is the real thing.

mod client;
mod types;

pub use client::TableauClient;
pub use types::{Orientation, PageType, PdfExportOptions, Session, WorkbookSummary};

use crate::error::ExportError;
use crate::model::WorkbookDocument;

/// Session-scoped operations against one Tableau site.
#[async_trait::async_trait]
pub trait TableauApi: Send + Sync {
    /// Authenticate with the configured personal access token.
    async fn sign_in(&self) -> Result<Session, ExportError>;

    /// Every workbook on the site, across all result pages.
    async fn list_workbooks(&self, session: &Session) -> Result<Vec<WorkbookSummary>, ExportError>;

    /// Export a workbook as a PDF and hold it in memory.
    async fn download_workbook_pdf(
        &self,
        session: &Session,
        workbook_id: &str,
        options: &PdfExportOptions,
    ) -> Result<WorkbookDocument, ExportError>;

    /// Invalidate the session token.
    async fn sign_out(&self, session: Session) -> Result<(), ExportError>;
}
