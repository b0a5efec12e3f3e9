//! Shared helpers for the integration tests: in-memory fakes of the three
//! component traits and a tiny loopback HTTP responder.

#![allow(dead_code)]

use gslidegen::{
    ErrorKind, ExportError, PageImage, PdfExportOptions, Rasterizer, Session, TableauApi, UploadTarget,
    UploadedFile, Uploader, WorkbookDocument, WorkbookSummary,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Route library logs through the test harness; `RUST_LOG=debug` shows state transitions.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// ── Call log ─────────────────────────────────────────────────────────────────

/// Every call any fake receives, in order, as a short string.
#[derive(Default)]
pub struct CallLog {
    calls: Mutex<Vec<String>>,
    sign_outs: AtomicUsize,
}

impl CallLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn sign_outs(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }
}

/// A representative error of each kind.
pub fn error_of(kind: ErrorKind) -> ExportError {
    match kind {
        ErrorKind::Authentication => ExportError::Authentication {
            site: "site".into(),
            detail: "Signin Error: invalid PAT".into(),
        },
        ErrorKind::Credential => ExportError::Credential {
            detail: "invalid_grant".into(),
        },
        ErrorKind::Permission => ExportError::Permission {
            resource: "Drive folder 'F123'".into(),
            detail: "insufficientFilePermissions".into(),
        },
        ErrorKind::NotFound => ExportError::NotFound {
            resource: "workbook 'wb-42'".into(),
            detail: "404".into(),
        },
        ErrorKind::Connectivity => ExportError::Connectivity {
            endpoint: "Drive upload".into(),
            detail: "connection reset by peer".into(),
        },
        ErrorKind::MalformedDocument => ExportError::MalformedDocument {
            detail: "missing %PDF header".into(),
        },
        ErrorKind::PageOutOfRange => ExportError::PageOutOfRange { page: 99, total: 3 },
        _ => ExportError::Internal(format!("injected {kind}")),
    }
}

// ── Fake Tableau ─────────────────────────────────────────────────────────────

pub struct FakeTableau {
    pub log: Arc<CallLog>,
    pub sign_in_error: Option<ErrorKind>,
    pub list_error: Option<ErrorKind>,
    pub download_error: Option<ErrorKind>,
    pub sign_out_error: bool,
    pub workbooks: Vec<WorkbookSummary>,
    pub pdf: Vec<u8>,
    pub last_options: Mutex<Option<PdfExportOptions>>,
}

impl FakeTableau {
    pub fn new(log: Arc<CallLog>) -> Self {
        Self {
            log,
            sign_in_error: None,
            list_error: None,
            download_error: None,
            sign_out_error: false,
            workbooks: vec![WorkbookSummary {
                id: "wb-first".into(),
                name: "Quarterly Sales".into(),
                project_name: Some("Default".into()),
                owner_name: Some("ops".into()),
            }],
            pdf: b"%PDF-1.7 fake".to_vec(),
            last_options: Mutex::new(None),
        }
    }
}

#[async_trait::async_trait]
impl TableauApi for FakeTableau {
    async fn sign_in(&self) -> Result<Session, ExportError> {
        self.log.push("sign_in");
        match self.sign_in_error {
            Some(kind) => Err(error_of(kind)),
            None => Ok(Session::new("token-abc", "site-1", "user-1")),
        }
    }

    async fn list_workbooks(&self, _session: &Session) -> Result<Vec<WorkbookSummary>, ExportError> {
        self.log.push("list_workbooks");
        match self.list_error {
            Some(kind) => Err(error_of(kind)),
            None => Ok(self.workbooks.clone()),
        }
    }

    async fn download_workbook_pdf(
        &self,
        _session: &Session,
        workbook_id: &str,
        options: &PdfExportOptions,
    ) -> Result<WorkbookDocument, ExportError> {
        self.log.push(format!("download:{workbook_id}"));
        *self.last_options.lock().unwrap() = Some(options.clone());
        match self.download_error {
            Some(kind) => Err(error_of(kind)),
            None => Ok(WorkbookDocument::new(workbook_id, workbook_id, self.pdf.clone())),
        }
    }

    async fn sign_out(&self, _session: Session) -> Result<(), ExportError> {
        self.log.push("sign_out");
        self.log.sign_outs.fetch_add(1, Ordering::SeqCst);
        if self.sign_out_error {
            return Err(error_of(ErrorKind::Connectivity));
        }
        Ok(())
    }
}

// ── Fake rasteriser ──────────────────────────────────────────────────────────

pub struct FakeRasterizer {
    pub log: Arc<CallLog>,
    pub pages: usize,
    pub count_error: Option<ErrorKind>,
    pub render_errors: HashMap<usize, ErrorKind>,
}

impl FakeRasterizer {
    pub fn new(log: Arc<CallLog>, pages: usize) -> Self {
        Self {
            log,
            pages,
            count_error: None,
            render_errors: HashMap::new(),
        }
    }
}

/// Deterministic stand-in for a rendered page.
pub fn fake_png(page: usize) -> Vec<u8> {
    let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
    png.extend_from_slice(format!("page-{page}").as_bytes());
    png
}

#[async_trait::async_trait]
impl Rasterizer for FakeRasterizer {
    async fn page_count(&self, _document: &WorkbookDocument) -> Result<usize, ExportError> {
        self.log.push("page_count");
        match self.count_error {
            Some(kind) => Err(error_of(kind)),
            None if self.pages == 0 => Err(ExportError::MalformedDocument {
                detail: "the PDF has no pages".into(),
            }),
            None => Ok(self.pages),
        }
    }

    async fn render(
        &self,
        _document: &WorkbookDocument,
        page_number: usize,
        dpi: u32,
    ) -> Result<PageImage, ExportError> {
        self.log.push(format!("render:{page_number}"));
        if let Some(kind) = self.render_errors.get(&page_number) {
            return Err(error_of(*kind));
        }
        Ok(PageImage {
            page_number,
            dpi,
            width: 11 * dpi,
            height: 8 * dpi + dpi / 2,
            png: fake_png(page_number),
        })
    }
}

// ── Fake uploader ────────────────────────────────────────────────────────────

pub struct FakeUploader {
    pub log: Arc<CallLog>,
    pub errors: HashMap<usize, ErrorKind>,
    /// Every page from this one on fails with `Permission`.
    pub permission_denied_from: Option<usize>,
    /// Per-page artificial latency, used to finish uploads out of order.
    pub delays: HashMap<usize, Duration>,
    pub received: Mutex<Vec<(UploadTarget, Vec<u8>)>>,
}

impl FakeUploader {
    pub fn new(log: Arc<CallLog>) -> Self {
        Self {
            log,
            errors: HashMap::new(),
            permission_denied_from: None,
            delays: HashMap::new(),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn received_names(&self) -> Vec<String> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .map(|(t, _)| t.file_name.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl Uploader for FakeUploader {
    async fn upload(&self, image: &PageImage, target: &UploadTarget) -> Result<UploadedFile, ExportError> {
        if let Some(delay) = self.delays.get(&image.page_number) {
            tokio::time::sleep(*delay).await;
        }
        self.log
            .push(format!("upload:{}/{}", target.folder_id, target.file_name));

        if let Some(kind) = self.errors.get(&image.page_number) {
            return Err(error_of(*kind));
        }
        if matches!(self.permission_denied_from, Some(from) if image.page_number >= from) {
            return Err(error_of(ErrorKind::Permission));
        }

        self.received
            .lock()
            .unwrap()
            .push((target.clone(), image.png.clone()));
        Ok(UploadedFile {
            id: format!("drive-{}", image.page_number),
            name: target.file_name.clone(),
            web_view_link: Some(format!(
                "https://drive.google.com/file/d/drive-{}/view",
                image.page_number
            )),
            replaced: false,
        })
    }
}

// ── Loopback HTTP responder ──────────────────────────────────────────────────

/// One request as seen by the loopback server.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or("")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Decoded query parameter.
    pub fn query(&self, key: &str) -> Option<String> {
        let url = reqwest::Url::parse(&format!("http://loopback{}", self.target)).ok()?;
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A canned response.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    pub delay: Duration,
}

impl Reply {
    pub fn json(status: u16, value: serde_json::Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: value.to_string().into_bytes(),
            delay: Duration::ZERO,
        }
    }

    pub fn bytes(status: u16, content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn empty(status: u16) -> Self {
        Self::bytes(status, "text/plain", Vec::new())
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Handler = dyn Fn(&Recorded) -> Reply + Send + Sync;

/// Answers every request on 127.0.0.1 with whatever the handler returns.
pub struct LoopbackServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl LoopbackServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&Recorded) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let log = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = Arc::clone(&handler);
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let _ = serve(stream, handler, log).await;
                });
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, method: &str, path_prefix: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path().starts_with(path_prefix))
            .collect()
    }
}

/// A URL on which nothing listens.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

async fn serve(
    mut stream: TcpStream,
    handler: Arc<Handler>,
    log: Arc<Mutex<Vec<Recorded>>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];

    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter(|l| !l.is_empty())
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = buf[header_end..].to_vec();

    let recorded = Recorded {
        method,
        target,
        headers,
        body,
    };
    let reply = handler(&recorded);
    log.lock().unwrap().push(recorded);

    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }

    let head = format!(
        "HTTP/1.1 {} Loopback\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        reply.status,
        reply.content_type,
        reply.body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(&reply.body).await?;
    stream.shutdown().await
}
