//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! The backend token is wrapped in secrecy::SecretString to prevent log leaks.

use std::time::Duration;

use crate::error::{Error, Result};
use reqwest::Url;
use secrecy::SecretString;

/// Session deadline used when `GENERATE_TIMEOUT_SECS` is not set.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP origin of the generation backend, e.g. `http://localhost:8000`.
    pub backend_url: String,
    /// WebSocket origin. Derived from `backend_url` when `None`.
    pub backend_ws_url: Option<String>,
    /// Bearer token for session creation and the stream handshake.
    pub api_token: Option<SecretString>,
    /// Origin of the upload-authorization service. Falls back to `backend_url`.
    pub upload_api_url: Option<String>,
    /// Overall deadline for one generation session. `None` waits forever.
    pub session_timeout: Option<Duration>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Configuration pointing at `backend_url` with every optional value defaulted.
    pub fn new(backend_url: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            backend_ws_url: None,
            api_token: None,
            upload_api_url: None,
            session_timeout: Some(DEFAULT_SESSION_TIMEOUT),
            otel_endpoint: None,
            log_level: "info".to_string(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let session_timeout = match std::env::var("GENERATE_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    Error::Config(format!("GENERATE_TIMEOUT_SECS is not a number: {raw}"))
                })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            Err(_) => Some(DEFAULT_SESSION_TIMEOUT),
        };

        Ok(Self {
            backend_url: required_var("BACKEND_URL")?,
            backend_ws_url: optional_var("BACKEND_WS_URL"),
            api_token: optional_var("BACKEND_API_TOKEN").map(SecretString::from),
            upload_api_url: optional_var("UPLOAD_API_URL"),
            session_timeout,
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Base URL that session creation requests are sent to.
    pub fn http_base(&self) -> Result<Url> {
        parse_origin("BACKEND_URL", &self.backend_url)
    }

    /// Base URL for upload authorization.
    pub fn upload_base(&self) -> Result<Url> {
        match self.upload_api_url {
            Some(ref url) => parse_origin("UPLOAD_API_URL", url),
            None => self.http_base(),
        }
    }

    /// WebSocket origin for event streams.
    ///
    /// Uses `backend_ws_url` verbatim when present, otherwise swaps the
    /// scheme of `backend_url` (`http` → `ws`, `https` → `wss`).
    pub fn websocket_base(&self) -> Result<Url> {
        if let Some(ref ws) = self.backend_ws_url {
            let url = parse_origin("BACKEND_WS_URL", ws)?;
            return match url.scheme() {
                "ws" | "wss" => Ok(url),
                other => Err(Error::Config(format!(
                    "BACKEND_WS_URL must use ws or wss, got {other}"
                ))),
            };
        }

        let mut url = self.http_base()?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(Error::Config(format!(
                    "cannot derive a websocket url from scheme {other}"
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|()| Error::Config(format!("cannot switch {url} to {scheme}")))?;
        Ok(url)
    }
}

fn parse_origin(name: &str, raw: &str) -> Result<Url> {
    Url::parse(raw.trim_end_matches('/'))
        .map_err(|e| Error::Config(format!("{name} is not a valid url ({raw}): {e}")))
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
