//! Public types for the e2b-sandbox crate.

use std::fmt;
use std::time::Duration;

use sandbox::SandboxError;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite;

pub(crate) const DEFAULT_API_URL: &str = "https://api.e2b.dev";
pub(crate) const DEFAULT_DOMAIN: &str = "e2b.dev";
pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Identity of a created sandbox, as returned by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxInfo {
    #[serde(rename = "sandboxID")]
    pub sandbox_id: String,
    #[serde(rename = "clientID")]
    pub client_id: String,
    #[serde(rename = "templateID", default)]
    pub template_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(
        rename = "envdVersion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub envd_version: Option<String>,
}

/// Timeouts and buffer sizes. The defaults suit the hosted service.
#[derive(Debug, Clone)]
pub struct TimingConfig {
    /// Bound on the REST calls and the WebSocket handshake.
    pub connect_timeout: Duration,
    /// Bound on a single JSON-RPC call, from send to response.
    pub request_timeout: Duration,
    /// Buffered notifications per watcher before new ones are dropped.
    /// Process output is never dropped.
    pub event_channel_capacity: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            request_timeout: REQUEST_TIMEOUT,
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

/// Where and how to reach the sandbox service.
#[derive(Clone)]
pub struct E2bConfig {
    pub api_key: String,
    /// Control plane base URL. Defaults to `"https://api.e2b.dev"`.
    pub api_url: String,
    /// Domain the per-sandbox hosts live under. Defaults to `"e2b.dev"`.
    pub domain: String,
    /// Replaces the derived `wss://49982-{sandbox}-{client}.{domain}/ws`.
    pub ws_url: Option<String>,
    /// Replaces the derived `https://49982-{sandbox}-{client}.{domain}` used
    /// for file transfer.
    pub envd_url: Option<String>,
    pub timing: TimingConfig,
}

impl E2bConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
            domain: DEFAULT_DOMAIN.to_string(),
            ws_url: None,
            envd_url: None,
            timing: TimingConfig::default(),
        }
    }
}

impl fmt::Debug for E2bConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("E2bConfig")
            .field("api_key", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("domain", &self.domain)
            .field("ws_url", &self.ws_url)
            .field("envd_url", &self.envd_url)
            .field("timing", &self.timing)
            .finish()
    }
}

/// Errors returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: status={status}, {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("remote error: code={code}, {message}")]
    Rpc { code: i64, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("unexpected {method} result: {detail}")]
    UnexpectedResponse { method: String, detail: String },

    #[error("{0} timed out")]
    Timeout(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("session closed")]
    Closed,
}

impl From<tungstenite::Error> for Error {
    fn from(e: tungstenite::Error) -> Self {
        Error::WebSocket(Box::new(e))
    }
}

impl From<Error> for SandboxError {
    fn from(e: Error) -> Self {
        match e {
            Error::Closed => SandboxError::Closed,
            Error::NotFound(m) => SandboxError::NotFound(m),
            Error::PermissionDenied(m) => SandboxError::PermissionDenied(m),
            Error::Timeout(m) => SandboxError::Timeout(m),
            Error::Rpc { code, message } => SandboxError::Rpc { code, message },
            Error::InvalidArgument(m) => SandboxError::InvalidArgument(m),
            other @ (Error::WebSocket(_) | Error::Http(_) | Error::Api { .. }) => {
                SandboxError::Connection(other.to_string())
            }
            other @ (Error::Json(_)
            | Error::Url(_)
            | Error::Base64(_)
            | Error::UnexpectedResponse { .. }) => SandboxError::Rpc {
                code: 0,
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandbox_info_uses_upper_case_ids() {
        let json = r#"{
            "sandboxID": "sb-123",
            "clientID": "c-456",
            "templateID": "base",
            "envdVersion": "0.1.1"
        }"#;
        let info: SandboxInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.sandbox_id, "sb-123");
        assert_eq!(info.client_id, "c-456");
        assert_eq!(info.template_id, "base");
        assert_eq!(info.alias, None);
        assert_eq!(info.envd_version.as_deref(), Some("0.1.1"));

        let back = serde_json::to_string(&info).unwrap();
        assert!(back.contains("\"sandboxID\":\"sb-123\""));
        assert!(!back.contains("alias"));
    }

    #[test]
    fn config_debug_redacts_api_key() {
        let config = E2bConfig::new("e2b_secret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("e2b_secret"));
        assert!(debug.contains("api.e2b.dev"));
    }

    #[test]
    fn errors_map_to_sandbox_taxonomy() {
        assert!(matches!(
            SandboxError::from(Error::Closed),
            SandboxError::Closed
        ));
        assert!(matches!(
            SandboxError::from(Error::NotFound("/x".into())),
            SandboxError::NotFound(_)
        ));
        assert!(matches!(
            SandboxError::from(Error::Api {
                status: 502,
                body: "bad gateway".into()
            }),
            SandboxError::Connection(_)
        ));
        assert!(matches!(
            SandboxError::from(Error::Rpc {
                code: -32601,
                message: "method not found".into()
            }),
            SandboxError::Rpc { code: -32601, .. }
        ));
    }
}
