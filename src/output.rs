//! What a finished run reports back.

use crate::error::{PageError, PipelineError};
use crate::model::UploadedFile;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one page: uploaded, or failed with a recorded cause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageOutcome {
    /// 1-indexed page number.
    pub page: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<UploadedFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PageError>,
}

impl PageOutcome {
    pub fn uploaded(page: usize, file: UploadedFile) -> Self {
        Self {
            page,
            file: Some(file),
            error: None,
        }
    }

    pub fn failed(error: PageError) -> Self {
        Self {
            page: error.page,
            file: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of a run that reached `Completed`.
///
/// `pages` holds exactly one outcome per document page, in page order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportReport {
    pub workbook_id: String,
    pub workbook_name: String,
    pub folder_id: String,
    pub page_count: usize,
    pub pages: Vec<PageOutcome>,
    pub duration_ms: u64,
}

impl ExportReport {
    pub fn status(&self) -> RunStatus {
        if self.pages.iter().all(PageOutcome::is_ok) {
            RunStatus::Succeeded
        } else {
            RunStatus::PartiallyCompleted
        }
    }

    pub fn failed_pages(&self) -> impl Iterator<Item = &PageError> {
        self.pages.iter().filter_map(|p| p.error.as_ref())
    }

    pub fn uploaded(&self) -> impl Iterator<Item = (usize, &UploadedFile)> {
        self.pages
            .iter()
            .filter_map(|p| p.file.as_ref().map(|f| (p.page, f)))
    }

    pub fn uploaded_count(&self) -> usize {
        self.uploaded().count()
    }
}

/// Run-level verdict, also the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Every page uploaded.
    Succeeded,
    /// The run completed but at least one page failed.
    PartiallyCompleted,
    /// A fatal error stopped the run.
    Aborted,
}

impl RunStatus {
    pub fn of(result: &Result<ExportReport, PipelineError>) -> Self {
        match result {
            Ok(report) => report.status(),
            Err(_) => RunStatus::Aborted,
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            RunStatus::Succeeded => 0,
            RunStatus::Aborted => 1,
            RunStatus::PartiallyCompleted => 2,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::PartiallyCompleted => "partially completed",
            RunStatus::Aborted => "aborted",
        })
    }
}
