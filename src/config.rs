//! Configuration types for an export run.
//!
//! Everything a run needs is gathered into one immutable [`Settings`] value
//! before any network call is made. The library never reads the process
//! environment itself: the binary collects the six named options (via clap's
//! `env` support) and hands them to [`Settings::from_lookup`], which fails
//! fast with [`ExportError::MissingSetting`] for anything absent or empty.
//!
//! Tuning knobs for the run itself live in [`ExportConfig`], built with
//! [`ExportConfigBuilder`] in the same style as the rest of the crate.

use crate::error::ExportError;
use crate::progress::ProgressCallback;
use crate::tableau::{Orientation, PageType, PdfExportOptions};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

// ── Named options ────────────────────────────────────────────────────────

pub const TABLEAU_SERVER: &str = "TABLEAU_SERVER";
pub const TABLEAU_SITE_CONTENT_URL: &str = "TABLEAU_SITE_CONTENT_URL";
pub const TABLEAU_TOKEN_NAME: &str = "TABLEAU_TOKEN_NAME";
pub const TABLEAU_TOKEN_SECRET: &str = "TABLEAU_TOKEN_SECRET";
pub const GOOGLE_SERVICE_ACCOUNT_PATH: &str = "GOOGLE_SERVICE_ACCOUNT_PATH";
pub const GOOGLE_DRIVE_FOLDER_ID: &str = "GOOGLE_DRIVE_FOLDER_ID";

/// Tableau REST API version used when none is given.
pub const DEFAULT_API_VERSION: &str = "3.21";

/// `https://drive.google.com/drive/folders/<id>` and `...?id=<id>` forms.
static FOLDER_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:/folders/|[?&]id=)([A-Za-z0-9_-]+)").expect("valid regex")
});

static FOLDER_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid regex"));

fn required(name: &'static str, value: Option<String>) -> Result<String, ExportError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ExportError::MissingSetting { name }),
    }
}

/// Like [`required`], but the value is kept byte for byte.
fn required_secret(name: &'static str, value: String) -> Result<String, ExportError> {
    if value.trim().is_empty() {
        return Err(ExportError::MissingSetting { name });
    }
    Ok(value)
}

// ── Tableau ──────────────────────────────────────────────────────────────

/// Connection details for Tableau Server or Tableau Cloud.
#[derive(Clone, PartialEq, Eq)]
pub struct TableauConfig {
    server: String,
    site_content_url: String,
    token_name: String,
    token_secret: String,
    api_version: String,
}

impl TableauConfig {
    /// Validate and build. All four values must be non-empty and `server`
    /// must be an absolute http(s) URL; a trailing `/` is dropped.
    pub fn new(
        server: impl Into<String>,
        site_content_url: impl Into<String>,
        token_name: impl Into<String>,
        token_secret: impl Into<String>,
    ) -> Result<Self, ExportError> {
        let server = required(TABLEAU_SERVER, Some(server.into()))?;
        let site_content_url = required(TABLEAU_SITE_CONTENT_URL, Some(site_content_url.into()))?;
        let token_name = required(TABLEAU_TOKEN_NAME, Some(token_name.into()))?;
        let token_secret = required_secret(TABLEAU_TOKEN_SECRET, token_secret.into())?;

        let url = reqwest::Url::parse(&server).map_err(|e| {
            ExportError::Configuration(format!("{TABLEAU_SERVER} '{server}' is not a valid URL: {e}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ExportError::Configuration(format!(
                "{TABLEAU_SERVER} '{server}' must be an http:// or https:// URL"
            )));
        }

        Ok(Self {
            server: server.trim_end_matches('/').to_string(),
            site_content_url,
            token_name,
            token_secret,
            api_version: DEFAULT_API_VERSION.to_string(),
        })
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn site_content_url(&self) -> &str {
        &self.site_content_url
    }

    pub fn token_name(&self) -> &str {
        &self.token_name
    }

    pub fn token_secret(&self) -> &str {
        &self.token_secret
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }
}

impl fmt::Debug for TableauConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableauConfig")
            .field("server", &self.server)
            .field("site_content_url", &self.site_content_url)
            .field("token_name", &self.token_name)
            .field("token_secret", &"<redacted>")
            .field("api_version", &self.api_version)
            .finish()
    }
}

// ── Drive ────────────────────────────────────────────────────────────────

/// Drive destination and the credential used to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveConfig {
    service_account_path: PathBuf,
    folder_id: String,
}

impl DriveConfig {
    /// `folder` may be a bare folder id or a Drive folder URL.
    pub fn new(service_account_path: impl Into<String>, folder: impl Into<String>) -> Result<Self, ExportError> {
        let path = required(GOOGLE_SERVICE_ACCOUNT_PATH, Some(service_account_path.into()))?;
        let folder = required(GOOGLE_DRIVE_FOLDER_ID, Some(folder.into()))?;
        Ok(Self {
            service_account_path: PathBuf::from(path),
            folder_id: parse_folder_id(&folder)?,
        })
    }

    pub fn service_account_path(&self) -> &std::path::Path {
        &self.service_account_path
    }

    pub fn folder_id(&self) -> &str {
        &self.folder_id
    }
}

/// Extract a Drive folder id from a bare id or a folder URL.
pub fn parse_folder_id(input: &str) -> Result<String, ExportError> {
    let input = input.trim();
    if FOLDER_ID_RE.is_match(input) {
        return Ok(input.to_string());
    }
    FOLDER_URL_RE
        .captures(input)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            ExportError::Configuration(format!(
                "{GOOGLE_DRIVE_FOLDER_ID} '{input}' is neither a folder id nor a Drive folder URL"
            ))
        })
}

// ── HTTP ─────────────────────────────────────────────────────────────────

/// Timeouts applied to every HTTP call against Tableau and Google.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// TCP/TLS connect timeout in seconds. Default: 10.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds, body included. Default: 120.
    ///
    /// Workbook PDF exports are rendered server-side and can take a while
    /// for large dashboards; 120 s covers typical workbooks.
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            request_timeout_secs: 120,
        }
    }
}

// ── Export ───────────────────────────────────────────────────────────────

/// What happens when the target folder already holds a file with the page's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CollisionPolicy {
    /// Replace the content of the existing file, keeping its id and link. (default)
    #[default]
    Overwrite,
    /// Always create a new file; Drive allows duplicate names.
    Duplicate,
    /// Record a `Conflict` error for the page and leave the existing file alone.
    Fail,
}

/// Access level of a Drive permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareRole {
    #[default]
    Reader,
    Commenter,
    Writer,
}

impl ShareRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ShareRole::Reader => "reader",
            ShareRole::Commenter => "commenter",
            ShareRole::Writer => "writer",
        }
    }
}

impl std::str::FromStr for ShareRole {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reader" => Ok(ShareRole::Reader),
            "commenter" => Ok(ShareRole::Commenter),
            "writer" => Ok(ShareRole::Writer),
            other => Err(ExportError::Configuration(format!(
                "unknown share role '{other}' (expected reader, commenter or writer)"
            ))),
        }
    }
}

/// Who a Drive permission is granted to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Grantee {
    /// Anyone with the link.
    #[default]
    Anyone,
    User(String),
    Group(String),
    /// Everyone in a Google Workspace domain.
    Domain(String),
}

impl Grantee {
    /// Drive's permission `type` value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Grantee::Anyone => "anyone",
            Grantee::User(_) => "user",
            Grantee::Group(_) => "group",
            Grantee::Domain(_) => "domain",
        }
    }
}

impl std::str::FromStr for Grantee {
    type Err = ExportError;

    /// `anyone`, `user:<email>`, `group:<email>` or `domain:<domain>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, target) = match s.split_once(':') {
            Some((k, t)) => (k, Some(t.trim().to_string())),
            None => (s, None),
        };
        let grantee = match (kind.to_ascii_lowercase().as_str(), target) {
            ("anyone", None) => Grantee::Anyone,
            ("user", Some(email)) => Grantee::User(email),
            ("group", Some(email)) => Grantee::Group(email),
            ("domain", Some(domain)) => Grantee::Domain(domain),
            _ => {
                return Err(ExportError::Configuration(format!(
                    "share grantee '{s}' must be anyone, user:<email>, group:<email> or domain:<domain>"
                )))
            }
        };
        Ok(grantee)
    }
}

/// A permission granted on each uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShareSpec {
    pub role: ShareRole,
    pub grantee: Grantee,
}

impl ShareSpec {
    /// Link sharing: anyone with the link can view.
    pub fn anyone_reader() -> Self {
        Self::default()
    }

    fn validate(&self) -> Result<(), ExportError> {
        match &self.grantee {
            Grantee::User(v) | Grantee::Group(v) if !v.contains('@') => Err(ExportError::Configuration(format!(
                "share {} '{v}' is not an email address",
                self.grantee.type_name()
            ))),
            Grantee::Domain(v) if v.trim().is_empty() => {
                Err(ExportError::Configuration("share domain must not be empty".into()))
            }
            _ => Ok(()),
        }
    }
}

/// Tuning for one export run.
#[derive(Clone)]
pub struct ExportConfig {
    /// Workbook to export. `None` exports the first workbook on the site.
    pub workbook_id: Option<String>,

    /// Rendering DPI. Range: 1–1200. Default: 300.
    ///
    /// 300 DPI gives print-quality slides; Letter landscape comes out at
    /// 3300 × 2550 px. Lower it for smaller uploads.
    pub dpi: u32,

    /// Longest rendered edge in pixels. Default: 10 000.
    ///
    /// Independent of DPI: a Tabloid page at 1200 DPI would otherwise be a
    /// 20 400 × 13 200 px bitmap (~1 GB RGBA).
    pub max_rendered_pixels: u32,

    /// Upper bound on pages per workbook. Default: 500.
    pub max_pages: usize,

    /// Upper bound on the downloaded PDF size in bytes. Default: 256 MiB.
    pub max_document_bytes: u64,

    /// Paper size requested from Tableau. Default: Letter.
    pub page_type: PageType,

    /// Page orientation requested from Tableau. Default: Landscape.
    pub orientation: Orientation,

    /// Maximum age in minutes of Tableau's cached data. Default: `Some(1)`.
    pub max_age_minutes: Option<u32>,

    /// View filters sent as `vf_<field>=<value>`.
    pub view_filters: BTreeMap<String, String>,

    /// Optional file-name prefix: `{prefix}_page{N}.png`.
    pub file_prefix: Option<String>,

    /// Name-collision policy on upload. Default: Overwrite.
    pub collision_policy: CollisionPolicy,

    /// Grant a Drive permission on every uploaded file. Default: none.
    ///
    /// Slides that embed images by link need the files readable by the
    /// viewers, typically `anyone` with `reader`.
    pub share: Option<ShareSpec>,

    /// Pages rendered/uploaded at once. Default: 1 (strict page order).
    ///
    /// Values above 1 overlap rendering and uploading of neighbouring pages.
    /// Results are still reported in page order, but Drive may receive the
    /// uploads out of order.
    pub concurrency: usize,

    /// Also keep the PDF and the rendered PNGs in this directory.
    pub output_dir: Option<PathBuf>,

    /// Per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            workbook_id: None,
            dpi: 300,
            max_rendered_pixels: 10_000,
            max_pages: 500,
            max_document_bytes: 256 * 1024 * 1024,
            page_type: PageType::Letter,
            orientation: Orientation::Landscape,
            max_age_minutes: Some(1),
            view_filters: BTreeMap::new(),
            file_prefix: None,
            collision_policy: CollisionPolicy::default(),
            share: None,
            concurrency: 1,
            output_dir: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportConfig")
            .field("workbook_id", &self.workbook_id)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("max_pages", &self.max_pages)
            .field("max_document_bytes", &self.max_document_bytes)
            .field("page_type", &self.page_type)
            .field("orientation", &self.orientation)
            .field("max_age_minutes", &self.max_age_minutes)
            .field("view_filters", &self.view_filters)
            .field("file_prefix", &self.file_prefix)
            .field("collision_policy", &self.collision_policy)
            .field("share", &self.share)
            .field("concurrency", &self.concurrency)
            .field("output_dir", &self.output_dir)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExportProgressCallback>"),
            )
            .finish()
    }
}

impl ExportConfig {
    pub fn builder() -> ExportConfigBuilder {
        ExportConfigBuilder {
            config: Self::default(),
        }
    }

    /// Check every bound. [`ExportConfigBuilder::build`] calls this, and so
    /// does [`crate::ExportPipeline::run`] before signing in, since the
    /// fields are public and a hand-built config skips the builder.
    pub fn validate(&self) -> Result<(), ExportError> {
        if self.dpi == 0 || self.dpi > 1200 {
            return Err(ExportError::Configuration(format!(
                "DPI must be 1–1200, got {}",
                self.dpi
            )));
        }
        if self.max_rendered_pixels < 100 {
            return Err(ExportError::Configuration(format!(
                "max rendered pixels must be ≥ 100, got {}",
                self.max_rendered_pixels
            )));
        }
        if self.max_pages == 0 {
            return Err(ExportError::Configuration("max pages must be ≥ 1".into()));
        }
        if self.max_document_bytes == 0 {
            return Err(ExportError::Configuration(
                "max document size must be ≥ 1 byte".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ExportError::Configuration("Concurrency must be ≥ 1".into()));
        }
        if let Some(ref id) = self.workbook_id {
            if id.trim().is_empty() {
                return Err(ExportError::Configuration("workbook id must not be empty".into()));
            }
        }
        if let Some(ref prefix) = self.file_prefix {
            if prefix.contains('/') {
                return Err(ExportError::Configuration(format!(
                    "file prefix '{prefix}' must not contain '/'"
                )));
            }
        }
        if let Some(ref share) = self.share {
            share.validate()?;
        }
        Ok(())
    }

    /// The Tableau-side knobs for the PDF download.
    pub fn pdf_options(&self) -> PdfExportOptions {
        PdfExportOptions {
            page_type: self.page_type,
            orientation: self.orientation,
            max_age_minutes: self.max_age_minutes,
            view_filters: self.view_filters.clone(),
            max_bytes: self.max_document_bytes,
        }
    }
}

/// Builder for [`ExportConfig`].
#[derive(Debug)]
pub struct ExportConfigBuilder {
    config: ExportConfig,
}

impl ExportConfigBuilder {
    pub fn workbook_id(mut self, id: impl Into<String>) -> Self {
        self.config.workbook_id = Some(id.into());
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px;
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n;
        self
    }

    pub fn max_document_bytes(mut self, n: u64) -> Self {
        self.config.max_document_bytes = n;
        self
    }

    pub fn page_type(mut self, page_type: PageType) -> Self {
        self.config.page_type = page_type;
        self
    }

    pub fn orientation(mut self, orientation: Orientation) -> Self {
        self.config.orientation = orientation;
        self
    }

    pub fn max_age_minutes(mut self, minutes: Option<u32>) -> Self {
        self.config.max_age_minutes = minutes;
        self
    }

    pub fn view_filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.view_filters.insert(field.into(), value.into());
        self
    }

    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.file_prefix = Some(prefix.into());
        self
    }

    pub fn collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.config.collision_policy = policy;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn share(mut self, share: ShareSpec) -> Self {
        self.config.share = Some(share);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExportConfig, ExportError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Settings ─────────────────────────────────────────────────────────────

/// Everything one run needs, validated up front.
#[derive(Debug, Clone)]
pub struct Settings {
    pub tableau: TableauConfig,
    pub drive: DriveConfig,
    pub http: HttpConfig,
    pub export: ExportConfig,
}

impl Settings {
    /// Build settings from a lookup over the six named options.
    ///
    /// The first absent or empty option fails the whole call, in the order
    /// they are listed in [`Settings::REQUIRED`].
    pub fn from_lookup<F>(lookup: F, http: HttpConfig, export: ExportConfig) -> Result<Self, ExportError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut values = Vec::with_capacity(Self::REQUIRED.len());
        for name in Self::REQUIRED {
            let value = lookup(name).ok_or(ExportError::MissingSetting { name })?;
            let value = if name == TABLEAU_TOKEN_SECRET {
                required_secret(name, value)?
            } else {
                required(name, Some(value))?
            };
            values.push(value);
        }
        let [server, site, token_name, token_secret, key_path, folder]: [String; 6] = values
            .try_into()
            .map_err(|_| ExportError::Internal("settings arity mismatch".into()))?;

        Ok(Self {
            tableau: TableauConfig::new(server, site, token_name, token_secret)?,
            drive: DriveConfig::new(key_path, folder)?,
            http,
            export,
        })
    }

    pub const REQUIRED: [&'static str; 6] = [
        TABLEAU_SERVER,
        TABLEAU_SITE_CONTENT_URL,
        TABLEAU_TOKEN_NAME,
        TABLEAU_TOKEN_SECRET,
        GOOGLE_SERVICE_ACCOUNT_PATH,
        GOOGLE_DRIVE_FOLDER_ID,
    ];
}
