//! Service-account credentials and the OAuth 2.0 JWT-bearer grant.
//!
//! ```text
//! key file ──▶ RS256-signed assertion ──▶ POST token_uri ──▶ bearer token (cached)
//! ```

use crate::error::ExportError;
use crate::http::{fallback_status_error, transport_error, ErrorBody};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use reqwest::StatusCode;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: u64 = 3600;
/// A cached token is refreshed once it has less than this left.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a Google service-account JSON key that matter here.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub key_type: String,
    pub client_email: String,
    private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("key_type", &self.key_type)
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self, ExportError> {
        let text = std::fs::read_to_string(path).map_err(|e| ExportError::Credential {
            detail: format!("cannot read service account key {}: {e}", path.display()),
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ExportError> {
        let key: Self = serde_json::from_str(text).map_err(|e| ExportError::Credential {
            detail: format!("not a service account JSON key: {e}"),
        })?;
        if key.key_type != "service_account" {
            return Err(ExportError::Credential {
                detail: format!(
                    "expected a key of type 'service_account', found '{}'",
                    key.key_type
                ),
            });
        }
        if key.client_email.trim().is_empty() {
            return Err(ExportError::Credential {
                detail: "service account key has no client_email".to_string(),
            });
        }
        Ok(key)
    }

    /// Parse the embedded PEM key, PKCS#8 first, then PKCS#1.
    pub fn rsa_key(&self) -> Result<RsaPrivateKey, ExportError> {
        if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(&self.private_key) {
            return Ok(key);
        }
        RsaPrivateKey::from_pkcs1_pem(&self.private_key).map_err(|e| ExportError::Credential {
            detail: format!("failed to parse private_key: {e}"),
        })
    }
}

#[derive(Serialize)]
struct JwtHeader<'a> {
    alg: &'static str,
    typ: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<&'a str>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub(crate) struct JwtClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: u64,
    pub exp: u64,
}

/// Build and sign a JWT assertion for the token endpoint.
pub(crate) fn signed_assertion(
    key: &ServiceAccountKey,
    rsa: &RsaPrivateKey,
    issued_at: u64,
) -> Result<String, ExportError> {
    let header = JwtHeader {
        alg: "RS256",
        typ: "JWT",
        kid: key.private_key_id.as_deref(),
    };
    let claims = JwtClaims {
        iss: key.client_email.clone(),
        scope: DRIVE_SCOPE.to_string(),
        aud: key.token_uri.clone(),
        iat: issued_at,
        exp: issued_at + ASSERTION_LIFETIME_SECS,
    };
    let signing_input = format!("{}.{}", b64_json(&header)?, b64_json(&claims)?);

    let signing_key = SigningKey::<Sha256>::new(rsa.clone());
    let signature = signing_key.sign(signing_input.as_bytes());
    Ok(format!(
        "{signing_input}.{}",
        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    ))
}

fn b64_json<T: Serialize>(value: &T) -> Result<String, ExportError> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| ExportError::Internal(format!("JWT serialisation failed: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    ASSERTION_LIFETIME_SECS
}

/// Hands out bearer tokens, exchanging a fresh assertion when needed.
pub(crate) struct TokenSource {
    key: ServiceAccountKey,
    rsa: RsaPrivateKey,
    cached: Mutex<Option<CachedToken>>,
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSource")
            .field("client_email", &self.key.client_email)
            .finish_non_exhaustive()
    }
}

impl TokenSource {
    pub(crate) fn new(key: ServiceAccountKey) -> Result<Self, ExportError> {
        let rsa = key.rsa_key()?;
        Ok(Self {
            key,
            rsa,
            cached: Mutex::new(None),
        })
    }

    pub(crate) fn client_email(&self) -> &str {
        &self.key.client_email
    }

    pub(crate) async fn access_token(
        &self,
        http: &reqwest::Client,
        timeout_secs: u64,
    ) -> Result<String, ExportError> {
        let mut guard = self.cached.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.expires_at > Instant::now() + REFRESH_MARGIN {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.exchange(http, timeout_secs).await?;
        let value = fresh.value.clone();
        *guard = Some(fresh);
        Ok(value)
    }

    async fn exchange(&self, http: &reqwest::Client, timeout_secs: u64) -> Result<CachedToken, ExportError> {
        const ENDPOINT: &str = "Google OAuth token endpoint";
        let assertion = signed_assertion(&self.key, &self.rsa, unix_now())?;
        debug!(client_email = %self.key.client_email, "Exchanging service-account assertion");

        let response = http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| transport_error(ENDPOINT, e, timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = ErrorBody::read(response).await;
            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    ExportError::Credential {
                        detail: format!("token exchange rejected: {}", body.message),
                    }
                }
                _ => fallback_status_error(ENDPOINT, status, body.message),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| transport_error(ENDPOINT, e, timeout_secs))?;
        let token: TokenResponse = serde_json::from_str(&text).map_err(|e| ExportError::Credential {
            detail: format!("token endpoint returned an unreadable body: {e}"),
        })?;

        info!(client_email = %self.key.client_email, expires_in = token.expires_in, "Obtained Drive access token");
        Ok(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }
}
