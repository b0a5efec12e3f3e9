//! Drive v3 file operations: name lookup, multipart create, media update
//! and permission grants.

use super::auth::{ServiceAccountKey, TokenSource};
use super::Uploader;
use crate::config::{CollisionPolicy, Grantee, HttpConfig, ShareSpec};
use crate::error::ExportError;
use crate::http::{build_client, fallback_status_error, parse_json, transport_error, ErrorBody};
use crate::model::{PageImage, UploadTarget, UploadedFile};
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

pub const DEFAULT_DRIVE_BASE_URL: &str = "https://www.googleapis.com";
const FILE_FIELDS: &str = "id,name,webViewLink";
const SHARED_DRIVE_HINT: &str =
    "If the folder is on a Shared Drive, the service account needs the Content Manager role there.";

static BOUNDARY_SEQ: AtomicU64 = AtomicU64::new(0);

/// HTTP implementation of [`Uploader`].
#[derive(Debug)]
pub struct DriveClient {
    http: reqwest::Client,
    tokens: TokenSource,
    base_url: String,
    collision_policy: CollisionPolicy,
    share: Option<ShareSpec>,
    timeout_secs: u64,
}

impl DriveClient {
    /// Load a service-account key file and prepare a client.
    ///
    /// No network traffic happens here; the first upload performs the token
    /// exchange, so missing Drive grants show up as a `Credential` error there.
    pub fn from_service_account(path: &Path, http: &HttpConfig) -> Result<Self, ExportError> {
        let key = ServiceAccountKey::from_file(path)?;
        Self::from_key(key, http)
    }

    pub fn from_key(key: ServiceAccountKey, http: &HttpConfig) -> Result<Self, ExportError> {
        let tokens = TokenSource::new(key)?;
        info!(client_email = tokens.client_email(), "Loaded Drive service account");
        Ok(Self {
            http: build_client(http)?,
            tokens,
            base_url: DEFAULT_DRIVE_BASE_URL.to_string(),
            collision_policy: CollisionPolicy::default(),
            share: None,
            timeout_secs: http.request_timeout_secs,
        })
    }

    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy;
        self
    }

    /// Grant `share` on every file after it is uploaded.
    pub fn with_share(mut self, share: Option<ShareSpec>) -> Self {
        self.share = share;
        self
    }

    /// Point the client at another Drive-compatible host (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn collision_policy(&self) -> CollisionPolicy {
        self.collision_policy
    }

    async fn bearer(&self) -> Result<String, ExportError> {
        self.tokens.access_token(&self.http, self.timeout_secs).await
    }

    async fn send(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ExportError> {
        let token = self.bearer().await?;
        request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transport_error(endpoint, e, self.timeout_secs))
    }

    /// Non-trashed file named `name` directly inside `folder_id`, if any.
    pub async fn find_file(&self, folder_id: &str, name: &str) -> Result<Option<UploadedFile>, ExportError> {
        const ENDPOINT: &str = "Drive file lookup";
        let query = format!(
            "'{}' in parents and name = '{}' and trashed = false",
            escape_query(folder_id),
            escape_query(name)
        );
        let request = self
            .http
            .get(format!("{}/drive/v3/files", self.base_url))
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id,name,webViewLink)"),
                ("pageSize", "10"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ]);
        let response = self.send(ENDPOINT, request).await?;
        let response = check_status(ENDPOINT, &folder_resource(folder_id), response).await?;

        let listing: FileList = parse_json(ENDPOINT, response).await?;
        Ok(listing.files.into_iter().next().map(|f| f.into_uploaded(false)))
    }

    /// Create a new file with metadata and content in one multipart request.
    pub async fn create_file(&self, image: &PageImage, target: &UploadTarget) -> Result<UploadedFile, ExportError> {
        const ENDPOINT: &str = "Drive upload";
        let metadata = serde_json::json!({
            "name": target.file_name,
            "parents": [target.folder_id],
            "mimeType": PageImage::MIME_TYPE,
        });
        let metadata = serde_json::to_vec(&metadata)
            .map_err(|e| ExportError::Internal(format!("Drive metadata serialisation failed: {e}")))?;
        let boundary = boundary_for(&[metadata.as_slice(), image.png.as_slice()]);
        let body = multipart_related(&boundary, &metadata, PageImage::MIME_TYPE, &image.png);

        let request = self
            .http
            .post(format!("{}/upload/drive/v3/files", self.base_url))
            .query(&[
                ("uploadType", "multipart"),
                ("supportsAllDrives", "true"),
                ("fields", FILE_FIELDS),
            ])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body);
        let response = self.send(ENDPOINT, request).await?;
        let response = check_status(ENDPOINT, &folder_resource(&target.folder_id), response).await?;

        let file: DriveFile = parse_json(ENDPOINT, response).await?;
        Ok(file.into_uploaded(false))
    }

    /// Replace the content of an existing file, keeping its id and link.
    pub async fn update_content(
        &self,
        file_id: &str,
        image: &PageImage,
        folder_id: &str,
    ) -> Result<UploadedFile, ExportError> {
        const ENDPOINT: &str = "Drive content update";
        let request = self
            .http
            .patch(format!("{}/upload/drive/v3/files/{}", self.base_url, file_id))
            .query(&[
                ("uploadType", "media"),
                ("supportsAllDrives", "true"),
                ("fields", FILE_FIELDS),
            ])
            .header(reqwest::header::CONTENT_TYPE, PageImage::MIME_TYPE)
            .body(image.png.clone());
        let response = self.send(ENDPOINT, request).await?;
        let response = check_status(ENDPOINT, &folder_resource(folder_id), response).await?;

        let file: DriveFile = parse_json(ENDPOINT, response).await?;
        Ok(file.into_uploaded(true))
    }

    /// Grant a permission on a file and return its (possibly new) view link.
    pub async fn share_file(&self, file_id: &str, share: &ShareSpec) -> Result<Option<String>, ExportError> {
        const ENDPOINT: &str = "Drive permission create";
        let resource = format!("Drive file '{file_id}'");
        let request = self
            .http
            .post(format!("{}/drive/v3/files/{}/permissions", self.base_url, file_id))
            .query(&[("supportsAllDrives", "true"), ("sendNotificationEmail", "false")])
            .json(&permission_body(share));
        let response = self.send(ENDPOINT, request).await?;
        check_status(ENDPOINT, &resource, response).await?;

        const LINK_ENDPOINT: &str = "Drive file metadata";
        let request = self
            .http
            .get(format!("{}/drive/v3/files/{}", self.base_url, file_id))
            .query(&[("fields", "webViewLink"), ("supportsAllDrives", "true")]);
        let response = self.send(LINK_ENDPOINT, request).await?;
        let response = check_status(LINK_ENDPOINT, &resource, response).await?;

        let link: FileLink = parse_json(LINK_ENDPOINT, response).await?;
        debug!(file_id, role = share.role.as_str(), grantee = share.grantee.type_name(), "Shared Drive file");
        Ok(link.web_view_link)
    }
}

#[async_trait::async_trait]
impl Uploader for DriveClient {
    async fn upload(&self, image: &PageImage, target: &UploadTarget) -> Result<UploadedFile, ExportError> {
        let existing = match self.collision_policy {
            CollisionPolicy::Duplicate => None,
            CollisionPolicy::Overwrite | CollisionPolicy::Fail => {
                self.find_file(&target.folder_id, &target.file_name).await?
            }
        };

        let mut uploaded = match (existing, self.collision_policy) {
            (Some(_), CollisionPolicy::Fail) => {
                return Err(ExportError::Conflict {
                    name: target.file_name.clone(),
                    folder_id: target.folder_id.clone(),
                })
            }
            (Some(file), _) => {
                debug!(file_id = %file.id, name = %target.file_name, "Replacing existing Drive file");
                self.update_content(&file.id, image, &target.folder_id).await?
            }
            (None, _) => self.create_file(image, target).await?,
        };
        if let Some(ref share) = self.share {
            if let Some(link) = self.share_file(&uploaded.id, share).await? {
                uploaded.web_view_link = Some(link);
            }
        }

        info!(
            page = image.page_number,
            file_id = %uploaded.id,
            name = %uploaded.name,
            replaced = uploaded.replaced,
            "Uploaded page"
        );
        Ok(uploaded)
    }
}

fn folder_resource(folder_id: &str) -> String {
    format!("Drive folder '{folder_id}'")
}

/// `permissions.create` request body.
fn permission_body(share: &ShareSpec) -> serde_json::Value {
    let mut body = serde_json::json!({
        "role": share.role.as_str(),
        "type": share.grantee.type_name(),
    });
    match &share.grantee {
        Grantee::Anyone => {}
        Grantee::User(email) | Grantee::Group(email) => body["emailAddress"] = email.clone().into(),
        Grantee::Domain(domain) => body["domain"] = domain.clone().into(),
    }
    body
}

/// Map a Drive error status onto the taxonomy.
async fn check_status(
    endpoint: &str,
    resource: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ExportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = ErrorBody::read(response).await;
    Err(match status {
        StatusCode::UNAUTHORIZED => ExportError::Credential {
            detail: format!("Drive rejected the access token: {}", body.message),
        },
        StatusCode::FORBIDDEN if body.has_reason("rateLimit") => ExportError::Connectivity {
            endpoint: endpoint.to_string(),
            detail: format!("rate limited: {}", body.message),
        },
        StatusCode::FORBIDDEN => ExportError::Permission {
            resource: resource.to_string(),
            detail: format!("{} {SHARED_DRIVE_HINT}", body.message),
        },
        StatusCode::NOT_FOUND => ExportError::NotFound {
            resource: resource.to_string(),
            detail: body.message,
        },
        _ => fallback_status_error(endpoint, status, body.message),
    })
}

/// Drive query string literal escaping: `\` and `'` get a backslash.
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// A boundary that does not occur in any of `parts`.
fn boundary_for(parts: &[&[u8]]) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    loop {
        let seq = BOUNDARY_SEQ.fetch_add(1, Ordering::Relaxed);
        let candidate = format!("gslidegen_{:016x}{:04x}", nanos, seq & 0xffff);
        let needle = candidate.as_bytes();
        let clash = parts
            .iter()
            .any(|p| p.windows(needle.len()).any(|w| w == needle));
        if !clash {
            return candidate;
        }
    }
}

/// `multipart/related` body: JSON metadata part, then the media part.
fn multipart_related(boundary: &str, metadata: &[u8], media_type: &str, media: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata.len() + media.len() + 256);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Type: {media_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(media);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    web_view_link: Option<String>,
}

impl DriveFile {
    fn into_uploaded(self, replaced: bool) -> UploadedFile {
        UploadedFile {
            id: self.id,
            name: self.name,
            web_view_link: self.web_view_link,
            replaced,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileLink {
    #[serde(default)]
    web_view_link: Option<String>,
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}
