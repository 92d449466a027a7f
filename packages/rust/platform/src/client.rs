//! Authenticated transport for the voice platform's REST API.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tracing::debug;

use voicebolt_shared::{ApiKeySource, PlatformConfig, Result, VoiceBoltError};

/// User-Agent string for platform requests.
const USER_AGENT: &str = concat!("VoiceBolt/", env!("CARGO_PKG_VERSION"));

/// Header carrying the API key.
const API_KEY_HEADER: &str = "xi-api-key";

/// Service name used in error messages.
pub(crate) const SERVICE: &str = "voice platform";

/// Client for the voice platform. Cheap to clone.
#[derive(Clone)]
pub struct PlatformClient {
    client: Client,
    base_url: String,
    keys: Arc<dyn ApiKeySource>,
}

impl PlatformClient {
    /// Create a new client. The API key is resolved on every request.
    pub fn new(config: &PlatformConfig, keys: Arc<dyn ApiKeySource>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VoiceBoltError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            keys,
        })
    }

    /// Send a JSON request to `path` (relative to the base URL).
    ///
    /// Returns the parsed body, or `Value::Null` for empty 2xx bodies.
    pub async fn request_json(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        self.send(method, path, body, &[]).await
    }

    pub(crate) async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        query: &[(&str, String)],
    ) -> Result<Value> {
        let key = self.keys.api_key()?;
        let url = format!("{}{path}", self.base_url);
        debug!(%method, %url, "platform request");

        let mut request = self
            .client
            .request(method, &url)
            .header(API_KEY_HEADER, key);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VoiceBoltError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| VoiceBoltError::Network(format!("{url}: failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(map_error(status, &text));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text)
            .map_err(|e| VoiceBoltError::contract(format!("{SERVICE} returned invalid JSON: {e}")))
    }
}

/// Map a non-2xx platform response to the error taxonomy.
pub(crate) fn map_error(status: StatusCode, body: &str) -> VoiceBoltError {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .as_ref()
        .and_then(error_detail)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        });

    match status.as_u16() {
        401 | 403 => VoiceBoltError::auth(
            SERVICE,
            format!("{detail}. Check your API key and subscription."),
        ),
        422 => VoiceBoltError::validation(detail),
        429 => VoiceBoltError::RateLimited {
            service: SERVICE.into(),
        },
        code => VoiceBoltError::Platform {
            service: SERVICE.into(),
            status: code,
            message: detail,
        },
    }
}

/// Best-effort human-readable message from a JSON error body.
pub fn error_detail(body: &Value) -> Option<String> {
    if let Some(detail) = body.get("detail") {
        if let Some(msg) = detail.get("message").and_then(Value::as_str) {
            return Some(msg.to_string());
        }
        if let Some(msg) = detail.as_str() {
            return Some(msg.to_string());
        }
        if let Some(first) = detail.as_array().and_then(|a| a.first()) {
            let msg = first.get("msg").and_then(Value::as_str).unwrap_or("invalid request");
            let loc = first
                .get("loc")
                .and_then(Value::as_array)
                .map(|parts| {
                    parts
                        .iter()
                        .map(|p| match p {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(".")
                })
                .filter(|l| !l.is_empty());
            return Some(match loc {
                Some(loc) => format!("{loc}: {msg}"),
                None => msg.to_string(),
            });
        }
    }

    if let Some(msg) = body.get("message").and_then(Value::as_str) {
        return Some(msg.to_string());
    }

    match body.get("error") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(obj) => obj.get("message").and_then(Value::as_str).map(String::from),
        None => None,
    }
}
