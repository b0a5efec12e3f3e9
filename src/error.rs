//! Error types for the gslidegen library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`ExportError`]: a single operation against one vendor boundary
//!   failed (sign-in, download, render, upload). Every variant maps onto one
//!   [`ErrorKind`] of the shared taxonomy.
//!
//! * [`PipelineError`] (**fatal**): the run aborted before reaching
//!   `Completed`. Wraps the underlying [`ExportError`] together with the
//!   [`Stage`] that failed, so the message always names where it stopped.
//!
//! * [`PageError`] (**non-fatal**): one page failed to render or upload but
//!   the other pages are fine. Stored inside
//!   [`crate::output::PageOutcome`] so callers can report partial success
//!   rather than losing every already-uploaded page to one bad page.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification shared by every error in the crate.
///
/// The string form (`ConnectivityError`, `PermissionError`, …) is what the
/// CLI and the JSON report print for failed pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bad or missing settings, detected before any I/O.
    Configuration,
    /// Tableau rejected the personal access token or the site.
    Authentication,
    /// The Drive service-account credential is missing, malformed or rejected.
    Credential,
    /// Authenticated, but not allowed to touch the resource.
    Permission,
    /// Workbook, site or folder does not exist.
    NotFound,
    /// Transport failure, timeout or a transient server-side error.
    Connectivity,
    /// The downloaded bytes are not a usable PDF.
    MalformedDocument,
    /// A page number outside `[1, page_count]` was requested.
    PageOutOfRange,
    /// The document exceeds a configured size, page or pixel bound.
    LimitExceeded,
    /// An upload collided with an existing file under [`crate::CollisionPolicy::Fail`].
    Conflict,
    /// A vendor response that is neither a success nor a classified failure.
    UnexpectedResponse,
    /// Anything else (engine binding, local I/O, panicked task).
    Internal,
}

impl ErrorKind {
    /// Stable, human-readable name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "ConfigurationError",
            ErrorKind::Authentication => "AuthenticationError",
            ErrorKind::Credential => "CredentialError",
            ErrorKind::Permission => "PermissionError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::Connectivity => "ConnectivityError",
            ErrorKind::MalformedDocument => "MalformedDocumentError",
            ErrorKind::PageOutOfRange => "PageOutOfRangeError",
            ErrorKind::LimitExceeded => "LimitExceededError",
            ErrorKind::Conflict => "ConflictError",
            ErrorKind::UnexpectedResponse => "UnexpectedResponseError",
            ErrorKind::Internal => "InternalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one operation against Tableau, the rasteriser or Drive.
#[derive(Debug, Error)]
pub enum ExportError {
    // ── Configuration ─────────────────────────────────────────────────────
    /// A required setting is absent or empty.
    #[error("Missing required setting {name}\nSet it in the environment or pass the matching flag.")]
    MissingSetting { name: &'static str },

    /// A setting is present but invalid.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    // ── Identity ──────────────────────────────────────────────────────────
    /// Tableau refused the personal access token or the site content URL.
    #[error("Tableau sign-in rejected for site '{site}': {detail}\nCheck the token name/secret and TABLEAU_SITE_CONTENT_URL.")]
    Authentication { site: String, detail: String },

    /// The Drive service-account credential could not be used.
    #[error("Drive credential error: {detail}")]
    Credential { detail: String },

    // ── Resource access ───────────────────────────────────────────────────
    /// Authenticated but not authorised for the resource.
    #[error("Permission denied for {resource}: {detail}")]
    Permission { resource: String, detail: String },

    /// The resource does not exist.
    #[error("{resource} not found: {detail}")]
    NotFound { resource: String, detail: String },

    /// A file with the target name already exists and the policy forbids replacing it.
    #[error("A file named '{name}' already exists in folder {folder_id}")]
    Conflict { name: String, folder_id: String },

    // ── Transport ─────────────────────────────────────────────────────────
    /// The endpoint could not be reached or answered with a transient error.
    #[error("Could not reach {endpoint}: {detail}")]
    Connectivity { endpoint: String, detail: String },

    /// The request did not finish within the configured timeout.
    #[error("Request to {endpoint} timed out after {secs}s")]
    Timeout { endpoint: String, secs: u64 },

    /// The vendor answered with a status or body we cannot interpret.
    #[error("Unexpected response from {endpoint}: HTTP {status}: {body}")]
    UnexpectedResponse {
        endpoint: String,
        status: u16,
        body: String,
    },

    // ── Document ──────────────────────────────────────────────────────────
    /// The bytes are not a PDF or pdfium failed to parse them.
    #[error("Workbook PDF is malformed: {detail}")]
    MalformedDocument { detail: String },

    /// Requested page is outside the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// The document exceeds a configured bound.
    #[error("{what} exceeds the configured limit ({actual} > {limit})")]
    LimitExceeded {
        what: &'static str,
        actual: u64,
        limit: u64,
    },

    // ── Local ─────────────────────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install pdfium for your platform (https://github.com/bblanchon/pdfium-binaries)\n\
and either put it on the system library path or set PDFIUM_LIB_PATH=/path/to/libpdfium."
    )]
    EngineUnavailable(String),

    /// Could not write a local copy of the PDF or a page image.
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExportError {
    /// Classify the error into the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExportError::MissingSetting { .. } | ExportError::Configuration(_) => {
                ErrorKind::Configuration
            }
            ExportError::Authentication { .. } => ErrorKind::Authentication,
            ExportError::Credential { .. } => ErrorKind::Credential,
            ExportError::Permission { .. } => ErrorKind::Permission,
            ExportError::NotFound { .. } => ErrorKind::NotFound,
            ExportError::Conflict { .. } => ErrorKind::Conflict,
            ExportError::Connectivity { .. } | ExportError::Timeout { .. } => {
                ErrorKind::Connectivity
            }
            ExportError::UnexpectedResponse { .. } => ErrorKind::UnexpectedResponse,
            ExportError::MalformedDocument { .. } => ErrorKind::MalformedDocument,
            ExportError::PageOutOfRange { .. } => ErrorKind::PageOutOfRange,
            ExportError::LimitExceeded { .. } => ErrorKind::LimitExceeded,
            ExportError::EngineUnavailable(_)
            | ExportError::OutputWriteFailed { .. }
            | ExportError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Run-level stage in which a fatal error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Configuration,
    SessionOpen,
    WorkbookLookup,
    Download,
    Pagination,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Configuration => "configuration",
            Stage::SessionOpen => "session open",
            Stage::WorkbookLookup => "workbook lookup",
            Stage::Download => "download",
            Stage::Pagination => "pagination",
        })
    }
}

/// A fatal error: the run never reached `Completed`.
#[derive(Debug, Error)]
#[error("export aborted during {stage}: {error}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub error: ExportError,
}

impl PipelineError {
    pub fn new(stage: Stage, error: ExportError) -> Self {
        Self { stage, error }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

impl From<ExportError> for PipelineError {
    /// Errors raised while building settings belong to the configuration stage.
    fn from(error: ExportError) -> Self {
        Self::new(Stage::Configuration, error)
    }
}

/// Per-page step in which a non-fatal error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageStage {
    Render,
    Upload,
}

impl fmt::Display for PageStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PageStage::Render => "render",
            PageStage::Upload => "upload",
        })
    }
}

/// A non-fatal error for a single page.
///
/// Carries only owned, serialisable data so it can live in the JSON report.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("Page {page}: {stage} failed with {kind}: {detail}")]
pub struct PageError {
    /// 1-indexed page number.
    pub page: usize,
    pub stage: PageStage,
    pub kind: ErrorKind,
    pub detail: String,
}

impl PageError {
    pub fn new(page: usize, stage: PageStage, error: &ExportError) -> Self {
        Self {
            page,
            stage,
            kind: error.kind(),
            detail: error.to_string(),
        }
    }
}
