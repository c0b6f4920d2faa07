//! Session creation against the generation backend.

use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{GenerateRequest, SessionId};

/// Path, relative to the backend origin, that creates a session.
pub const SESSION_PATH: &str = "/api/v1/generate/session";

#[derive(Debug, Deserialize)]
struct SessionResponse {
    session_id: Option<serde_json::Value>,
}

/// Creates generation sessions. One request per call, no retry.
#[derive(Debug, Clone)]
pub struct SessionClient {
    http: reqwest::Client,
    endpoint: Url,
    api_token: Option<SecretString>,
}

impl SessionClient {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Build on top of an existing HTTP client (shared pools, custom timeouts).
    pub fn with_client(http: reqwest::Client, config: &Config) -> Result<Self> {
        let base = config.http_base()?;
        let endpoint = Url::parse(&format!(
            "{}{SESSION_PATH}",
            base.as_str().trim_end_matches('/')
        ))
        .map_err(|e| Error::Config(format!("bad session endpoint: {e}")))?;

        Ok(Self {
            http,
            endpoint,
            api_token: config.api_token.clone(),
        })
    }

    /// Ask the backend for a new session.
    ///
    /// Fails with [`Error::InvalidRequest`] before any I/O when the theme
    /// list is empty, and with [`Error::SessionCreation`] when the call fails
    /// or the body carries no usable `session_id`.
    pub async fn create_session(&self, request: &GenerateRequest) -> Result<SessionId> {
        if request.macro_themes.is_empty() {
            return Err(Error::InvalidRequest(
                "at least one macro theme is required".to_string(),
            ));
        }

        debug!(
            themes = ?request.macro_themes,
            has_prompt = request.user_prompt.is_some(),
            profile_len = request.user_profile.len(),
            "creating generation session"
        );

        let mut call = self.http.post(self.endpoint.clone()).json(request);
        if let Some(ref token) = self.api_token {
            call = call.bearer_auth(token.expose_secret());
        }

        let response = call
            .send()
            .await
            .map_err(|e| Error::SessionCreation(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "session creation rejected");
            return Err(Error::SessionCreation(format!(
                "backend returned {status}: {}",
                body.trim()
            )));
        }

        let body: SessionResponse = response
            .json()
            .await
            .map_err(|e| Error::SessionCreation(format!("malformed response body: {e}")))?;

        let session_id = body
            .session_id
            .as_ref()
            .and_then(serde_json::Value::as_str)
            .and_then(SessionId::new)
            .ok_or_else(|| {
                Error::SessionCreation("response did not contain a session_id".to_string())
            })?;

        info!(session_id = %session_id, "generation session created");
        Ok(session_id)
    }
}
