//! Shared HTTP plumbing for the Tableau and Drive clients.
//!
//! Both vendors report errors as JSON bodies with slightly different shapes;
//! [`ErrorBody::parse`] pulls a human-readable message out of whichever one
//! arrives so error messages stay actionable without dumping raw payloads.

use crate::config::HttpConfig;
use crate::error::ExportError;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

/// Longest vendor message carried into an error, in characters.
const MAX_DETAIL_CHARS: usize = 500;

/// Build a `reqwest::Client` with the run's connect and request timeouts.
pub(crate) fn build_client(config: &HttpConfig) -> Result<reqwest::Client, ExportError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .user_agent(concat!("gslidegen/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ExportError::Internal(format!("Failed to build HTTP client: {e}")))
}

/// Map a transport-level failure (no HTTP status) onto the taxonomy.
pub(crate) fn transport_error(endpoint: &str, err: reqwest::Error, timeout_secs: u64) -> ExportError {
    if err.is_timeout() {
        ExportError::Timeout {
            endpoint: endpoint.to_string(),
            secs: timeout_secs,
        }
    } else {
        ExportError::Connectivity {
            endpoint: endpoint.to_string(),
            detail: err.to_string(),
        }
    }
}

/// Classification shared by every endpoint once the endpoint-specific
/// statuses (401/403/404) have been handled: transient server-side errors
/// are connectivity problems, everything else is unexpected.
pub(crate) fn fallback_status_error(endpoint: &str, status: StatusCode, detail: String) -> ExportError {
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        ExportError::Connectivity {
            endpoint: endpoint.to_string(),
            detail: format!("HTTP {}: {detail}", status.as_u16()),
        }
    } else {
        ExportError::UnexpectedResponse {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body: detail,
        }
    }
}

/// Decode a successful JSON response; a body that does not match `T` is an
/// `UnexpectedResponse`.
pub(crate) async fn parse_json<T: serde::de::DeserializeOwned>(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<T, ExportError> {
    let status = response.status().as_u16();
    let text = response.text().await.map_err(|e| ExportError::Connectivity {
        endpoint: endpoint.to_string(),
        detail: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| ExportError::UnexpectedResponse {
        endpoint: endpoint.to_string(),
        status,
        body: format!("invalid JSON ({e})"),
    })
}

/// The interesting parts of a vendor error body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ErrorBody {
    pub message: String,
    /// Google `errors[].reason` values (e.g. `rateLimitExceeded`).
    pub reasons: Vec<String>,
}

impl ErrorBody {
    /// Read the body of a failed response. Never fails: an unreadable body
    /// becomes a placeholder message.
    pub(crate) async fn read(response: reqwest::Response) -> Self {
        match response.text().await {
            Ok(text) => Self::parse(&text),
            Err(_) => Self {
                message: "(unable to read error body)".to_string(),
                reasons: Vec::new(),
            },
        }
    }

    /// Understands:
    /// * Tableau: `{"error": {"summary", "detail", "code"}}`
    /// * Google APIs: `{"error": {"message", "errors": [{"reason"}]}}`
    /// * OAuth token endpoint: `{"error": "...", "error_description": "..."}`
    ///
    /// Anything else is kept verbatim (truncated).
    pub(crate) fn parse(text: &str) -> Self {
        let Ok(json) = serde_json::from_str::<Value>(text) else {
            return Self {
                message: truncate(text.trim()),
                reasons: Vec::new(),
            };
        };

        let mut reasons = Vec::new();
        let message = match json.get("error") {
            Some(Value::Object(err)) => {
                if let Some(Value::Array(items)) = err.get("errors") {
                    reasons = items
                        .iter()
                        .filter_map(|i| i.get("reason").and_then(Value::as_str))
                        .map(str::to_string)
                        .collect();
                }
                let summary = err.get("summary").and_then(Value::as_str);
                let detail = err.get("detail").and_then(Value::as_str);
                match (summary, detail) {
                    (Some(s), Some(d)) => format!("{s}: {d}"),
                    (Some(s), None) => s.to_string(),
                    (None, Some(d)) => d.to_string(),
                    (None, None) => err
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| text.trim().to_string()),
                }
            }
            Some(Value::String(code)) => match json.get("error_description").and_then(Value::as_str) {
                Some(desc) => format!("{code}: {desc}"),
                None => code.clone(),
            },
            _ => text.trim().to_string(),
        };

        Self {
            message: truncate(&message),
            reasons,
        }
    }

    pub(crate) fn has_reason(&self, needle: &str) -> bool {
        self.reasons.iter().any(|r| r.contains(needle))
    }
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= MAX_DETAIL_CHARS {
        return s.to_string();
    }
    let mut out: String = s.chars().take(MAX_DETAIL_CHARS).collect();
    out.push('…');
    out
}
