//! REST client speaking Tableau's JSON dialect (`Accept: application/json`).

use super::types::{PdfExportOptions, Session, WorkbookSummary};
use super::TableauApi;
use crate::config::{HttpConfig, TableauConfig};
use crate::error::ExportError;
use crate::http::{build_client, fallback_status_error, parse_json, transport_error, ErrorBody};
use crate::model::WorkbookDocument;
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

const AUTH_HEADER: &str = "X-Tableau-Auth";
const WORKBOOK_PAGE_SIZE: u32 = 100;

/// HTTP implementation of [`TableauApi`].
#[derive(Debug, Clone)]
pub struct TableauClient {
    http: reqwest::Client,
    config: TableauConfig,
    timeout_secs: u64,
}

impl TableauClient {
    pub fn new(config: TableauConfig, http: &HttpConfig) -> Result<Self, ExportError> {
        Ok(Self {
            http: build_client(http)?,
            config,
            timeout_secs: http.request_timeout_secs,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!(
            "{}/api/{}/{}",
            self.config.server(),
            self.config.api_version(),
            endpoint
        )
    }

    async fn send(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ExportError> {
        request
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| transport_error(endpoint, e, self.timeout_secs))
    }

    async fn fetch_workbook_page(
        &self,
        session: &Session,
        page_number: u32,
    ) -> Result<WorkbooksResponse, ExportError> {
        const ENDPOINT: &str = "Tableau workbook listing";
        let url = self.url(&format!("sites/{}/workbooks", session.site_id()));
        let request = self
            .http
            .get(&url)
            .header(AUTH_HEADER, session.token())
            .query(&[
                ("pageSize", WORKBOOK_PAGE_SIZE.to_string()),
                ("pageNumber", page_number.to_string()),
            ]);
        let response = self.send(ENDPOINT, request).await?;

        let status = response.status();
        if !status.is_success() {
            let body = ErrorBody::read(response).await;
            return Err(match status {
                StatusCode::UNAUTHORIZED => ExportError::Authentication {
                    site: self.config.site_content_url().to_string(),
                    detail: body.message,
                },
                StatusCode::FORBIDDEN => ExportError::Permission {
                    resource: format!("workbooks on site '{}'", self.config.site_content_url()),
                    detail: body.message,
                },
                StatusCode::NOT_FOUND => ExportError::NotFound {
                    resource: format!("site '{}'", self.config.site_content_url()),
                    detail: body.message,
                },
                _ => fallback_status_error(ENDPOINT, status, body.message),
            });
        }

        parse_json(ENDPOINT, response).await
    }
}

#[async_trait::async_trait]
impl TableauApi for TableauClient {
    async fn sign_in(&self) -> Result<Session, ExportError> {
        const ENDPOINT: &str = "Tableau sign-in";
        let body = SignInRequest {
            credentials: SignInCredentials {
                personal_access_token_name: self.config.token_name(),
                personal_access_token_secret: self.config.token_secret(),
                site: SiteRef {
                    content_url: self.config.site_content_url(),
                },
            },
        };
        debug!(server = self.config.server(), "Signing in to Tableau");
        let request = self.http.post(self.url("auth/signin")).json(&body);
        let response = self.send(ENDPOINT, request).await?;

        let status = response.status();
        if !status.is_success() {
            let body = ErrorBody::read(response).await;
            return Err(match status {
                StatusCode::BAD_REQUEST
                | StatusCode::UNAUTHORIZED
                | StatusCode::FORBIDDEN
                | StatusCode::NOT_FOUND => ExportError::Authentication {
                    site: self.config.site_content_url().to_string(),
                    detail: body.message,
                },
                _ => fallback_status_error(ENDPOINT, status, body.message),
            });
        }

        let parsed: SignInResponse = parse_json(ENDPOINT, response).await?;
        let creds = parsed.credentials;
        if creds.token.is_empty() || creds.site.id.is_empty() {
            return Err(ExportError::UnexpectedResponse {
                endpoint: ENDPOINT.to_string(),
                status: status.as_u16(),
                body: "sign-in response carries no token or site id".to_string(),
            });
        }

        info!(
            site = self.config.site_content_url(),
            site_id = %creds.site.id,
            "Signed in to Tableau"
        );
        Ok(Session::new(
            creds.token,
            creds.site.id,
            creds.user.map(|u| u.id).unwrap_or_default(),
        ))
    }

    async fn list_workbooks(&self, session: &Session) -> Result<Vec<WorkbookSummary>, ExportError> {
        let mut workbooks = Vec::new();
        let mut page_number = 1;

        loop {
            let page = self.fetch_workbook_page(session, page_number).await?;
            let received = page.workbooks.workbook.len();
            workbooks.extend(page.workbooks.workbook.into_iter().map(WorkbookSummary::from));

            let total = page.pagination.map(|p| p.total_available).unwrap_or(0);
            debug!(page_number, received, total, "Fetched workbook page");
            if received == 0 || workbooks.len() as u64 >= total {
                break;
            }
            page_number += 1;
        }

        Ok(workbooks)
    }

    async fn download_workbook_pdf(
        &self,
        session: &Session,
        workbook_id: &str,
        options: &PdfExportOptions,
    ) -> Result<WorkbookDocument, ExportError> {
        const ENDPOINT: &str = "Tableau PDF export";
        let url = self.url(&format!(
            "sites/{}/workbooks/{}/pdf",
            session.site_id(),
            workbook_id
        ));
        let request = self
            .http
            .get(&url)
            .header(AUTH_HEADER, session.token())
            .query(&options.query_pairs());
        info!(workbook_id, page_type = %options.page_type, orientation = %options.orientation, "Requesting workbook PDF");
        let mut response = self.send(ENDPOINT, request).await?;

        let status = response.status();
        if !status.is_success() {
            let body = ErrorBody::read(response).await;
            return Err(match status {
                StatusCode::NOT_FOUND => ExportError::NotFound {
                    resource: format!("workbook '{workbook_id}'"),
                    detail: body.message,
                },
                StatusCode::FORBIDDEN => ExportError::Permission {
                    resource: format!("workbook '{workbook_id}'"),
                    detail: body.message,
                },
                StatusCode::UNAUTHORIZED => ExportError::Authentication {
                    site: self.config.site_content_url().to_string(),
                    detail: body.message,
                },
                _ => fallback_status_error(ENDPOINT, status, body.message),
            });
        }

        if let Some(len) = response.content_length() {
            if len > options.max_bytes {
                return Err(ExportError::LimitExceeded {
                    what: "workbook PDF size",
                    actual: len,
                    limit: options.max_bytes,
                });
            }
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| transport_error(ENDPOINT, e, self.timeout_secs))?
        {
            let next = (bytes.len() + chunk.len()) as u64;
            if next > options.max_bytes {
                return Err(ExportError::LimitExceeded {
                    what: "workbook PDF size",
                    actual: next,
                    limit: options.max_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        info!(workbook_id, bytes = bytes.len(), "Downloaded workbook PDF");
        Ok(WorkbookDocument::new(workbook_id, workbook_id, bytes))
    }

    async fn sign_out(&self, session: Session) -> Result<(), ExportError> {
        const ENDPOINT: &str = "Tableau sign-out";
        let request = self
            .http
            .post(self.url("auth/signout"))
            .header(AUTH_HEADER, session.token());
        let response = self.send(ENDPOINT, request).await?;

        let status = response.status();
        if !status.is_success() {
            let body = ErrorBody::read(response).await;
            return Err(fallback_status_error(ENDPOINT, status, body.message));
        }
        debug!(site_id = session.site_id(), "Signed out of Tableau");
        Ok(())
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SignInRequest<'a> {
    credentials: SignInCredentials<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInCredentials<'a> {
    personal_access_token_name: &'a str,
    personal_access_token_secret: &'a str,
    site: SiteRef<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SiteRef<'a> {
    content_url: &'a str,
}

#[derive(Deserialize)]
struct SignInResponse {
    credentials: SignInResult,
}

#[derive(Deserialize)]
struct SignInResult {
    #[serde(default)]
    token: String,
    site: IdOnly,
    #[serde(default)]
    user: Option<IdOnly>,
}

#[derive(Deserialize)]
struct IdOnly {
    #[serde(default)]
    id: String,
}

#[derive(Deserialize)]
struct WorkbooksResponse {
    #[serde(default)]
    pagination: Option<Pagination>,
    #[serde(default)]
    workbooks: WorkbookList,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    #[serde(deserialize_with = "string_or_number")]
    total_available: u64,
}

#[derive(Deserialize, Default)]
struct WorkbookList {
    #[serde(default)]
    workbook: Vec<WorkbookWire>,
}

#[derive(Deserialize)]
struct WorkbookWire {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    project: Option<NamedRef>,
    #[serde(default)]
    owner: Option<NamedRef>,
}

#[derive(Deserialize)]
struct NamedRef {
    #[serde(default)]
    name: Option<String>,
}

impl From<WorkbookWire> for WorkbookSummary {
    fn from(w: WorkbookWire) -> Self {
        Self {
            id: w.id,
            name: w.name,
            project_name: w.project.and_then(|p| p.name),
            owner_name: w.owner.and_then(|o| o.name),
        }
    }
}

/// Tableau sends pagination counters as strings in JSON mode.
fn string_or_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
