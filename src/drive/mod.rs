//! Google Drive v3 uploads authenticated as a service account.

mod auth;
mod client;

pub use auth::{ServiceAccountKey, DEFAULT_TOKEN_URI, DRIVE_SCOPE};
pub use client::{DriveClient, DEFAULT_DRIVE_BASE_URL};

use crate::error::ExportError;
use crate::model::{PageImage, UploadTarget, UploadedFile};

/// Puts one page image into a Drive folder.
#[async_trait::async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, image: &PageImage, target: &UploadTarget) -> Result<UploadedFile, ExportError>;
}
