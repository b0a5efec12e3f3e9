//! Values that flow between pipeline stages.
//!
//! ```text
//! TableauApi ──▶ WorkbookDocument ──▶ Rasterizer ──▶ PageImage ──▶ Uploader ──▶ UploadedFile
//!                                                      │
//!                                                UploadTarget (page{N}.png)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A workbook exported as PDF, held in memory for the duration of one run.
///
/// The bytes sit behind an `Arc` so rendering tasks on the blocking pool can
/// share them without copying the whole document per page.
#[derive(Clone)]
pub struct WorkbookDocument {
    workbook_id: String,
    name: String,
    bytes: Arc<[u8]>,
}

impl WorkbookDocument {
    pub fn new(workbook_id: impl Into<String>, name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            workbook_id: workbook_id.into(),
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Replace the display name, e.g. once the workbook listing is known.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn workbook_id(&self) -> &str {
        &self.workbook_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Cheap handle to the underlying bytes.
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for WorkbookDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkbookDocument")
            .field("workbook_id", &self.workbook_id)
            .field("name", &self.name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// One rasterised page, PNG-encoded.
#[derive(Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 1-indexed page number; the only key linking a page to its upload.
    pub page_number: usize,
    pub dpi: u32,
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

impl PageImage {
    pub const MIME_TYPE: &'static str = "image/png";
}

impl fmt::Debug for PageImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageImage")
            .field("page_number", &self.page_number)
            .field("dpi", &self.dpi)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("png", &self.png.len())
            .finish()
    }
}

/// Where a page image goes: a Drive folder and a file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTarget {
    pub folder_id: String,
    pub file_name: String,
}

impl UploadTarget {
    /// Deterministic target for a page: `page{N}.png`, or `{prefix}_page{N}.png`.
    ///
    /// The same page number always maps to the same name, so repeated runs
    /// against one folder address the same files.
    pub fn for_page(folder_id: &str, page_number: usize, prefix: Option<&str>) -> Self {
        let file_name = match prefix {
            Some(p) if !p.is_empty() => format!("{p}_page{page_number}.png"),
            _ => format!("page{page_number}.png"),
        };
        Self {
            folder_id: folder_id.to_string(),
            file_name,
        }
    }
}

/// A file as reported by Drive after upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    pub name: String,
    pub web_view_link: Option<String>,
    /// `true` when an existing file's content was replaced instead of creating a new file.
    #[serde(default)]
    pub replaced: bool,
}
