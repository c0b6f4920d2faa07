//! Upload collaborator: short-lived upload authorization plus direct transfer.
//!
//! The upload service issues a signed POST policy for one object; the bytes
//! then go straight to storage. Stages are restricted to an allow-list and
//! the object path is built here unless a validated override is supplied.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use opentelemetry::KeyValue;
use reqwest::Url;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::telemetry::metrics;

/// Path of the authorization endpoint, relative to the upload service origin.
pub const AUTHORIZE_PATH: &str = "/api/upload/gcs";
pub const DEFAULT_CONTENT_TYPE: &str = "video/mp4";
pub const DEFAULT_FILE_NAME: &str = "upload.mp4";

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Onboarding stage an upload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStage {
    Taste,
    Performance,
    LowPerformance,
}

impl UploadStage {
    pub const ALL: [UploadStage; 3] = [Self::Taste, Self::Performance, Self::LowPerformance];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Taste => "taste",
            Self::Performance => "performance",
            Self::LowPerformance => "low_performance",
        }
    }
}

impl std::fmt::Display for UploadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadStage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let slug = slugify(s);
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == slug)
            .ok_or_else(|| {
                let allowed: Vec<&str> = Self::ALL.iter().map(|s| s.as_str()).collect();
                Error::InvalidRequest(format!(
                    "invalid stage {s:?}, must be one of: {}",
                    allowed.join(", ")
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Lowercase, whitespace to `-`, keep `[a-z0-9._-]`, collapse dashes, 80 chars max.
pub fn slugify(input: &str) -> String {
    let mut out = String::new();
    for c in input.trim().to_lowercase().chars() {
        let c = if c.is_whitespace() { '-' } else { c };
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-')) {
            continue;
        }
        if c == '-' && out.ends_with('-') {
            continue;
        }
        out.push(c);
    }
    out.chars().take(80).collect()
}

/// Last path component with anything outside `[A-Za-z0-9._-]` replaced by `_`.
pub fn safe_file_name(name: &str) -> String {
    let base = name.rsplit('/').next().filter(|b| !b.is_empty()).unwrap_or("upload.bin");
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(120)
        .collect()
}

/// Accept a caller-supplied object path only if it stays inside the bucket.
pub fn safe_object_path(input: &str) -> Option<String> {
    let path = input.trim().trim_start_matches('/');
    if path.is_empty() || path.contains("..") {
        None
    } else {
        Some(path.to_string())
    }
}

// ---------------------------------------------------------------------------
// Request / ticket
// ---------------------------------------------------------------------------

/// Body sent to the authorization endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub session_id: String,
    pub stage: UploadStage,
    pub file_name: String,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Already-validated destination override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_path: Option<String>,
}

impl UploadRequest {
    pub fn new(session_id: impl Into<String>, stage: UploadStage, file_name: &str) -> Self {
        Self {
            session_id: session_id.into(),
            stage,
            file_name: file_name.to_string(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            stage_index: None,
            user_name: None,
            object_path: None,
        }
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn stage_index(mut self, index: u32) -> Self {
        self.stage_index = Some(index);
        self
    }

    pub fn user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    /// Set a destination override. Rejected if it escapes the bucket.
    pub fn object_path(mut self, path: &str) -> Result<Self> {
        let path = safe_object_path(path)
            .ok_or_else(|| Error::InvalidRequest(format!("invalid object path {path:?}")))?;
        self.object_path = Some(path);
        Ok(self)
    }

    /// Check the request before it leaves the process.
    pub fn validate(&self) -> Result<()> {
        if self.session_id.trim().is_empty() {
            return Err(Error::InvalidRequest("missing session id".to_string()));
        }
        if let Some(ref path) = self.object_path {
            if safe_object_path(path).is_none() {
                return Err(Error::InvalidRequest(format!("invalid object path {path:?}")));
            }
        }
        Ok(())
    }
}

/// Where an upload lands when no override is given:
/// `onboarding/{session}/{stage}/{user}/{timestamp}-{index}-{nonce}-{file}`.
pub fn object_path_for(request: &UploadRequest, now: DateTime<Utc>, nonce: &str) -> String {
    if let Some(path) = request.object_path.as_deref().and_then(safe_object_path) {
        return path;
    }

    let user = request
        .user_name
        .as_deref()
        .map(slugify)
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "anonymous".to_string());
    let file = match request.file_name.trim() {
        "" => DEFAULT_FILE_NAME.to_string(),
        name => safe_file_name(name),
    };
    let timestamp = now
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    let index = request.stage_index.map(|i| i.to_string()).unwrap_or_default();

    format!(
        "onboarding/{}/{}/{user}/{timestamp}-{index}-{nonce}-{file}",
        request.session_id.trim(),
        request.stage,
    )
}

/// Random component for generated object paths.
pub fn new_nonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..16].to_string()
}

/// Signed POST policy: target URL and the form fields storage expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedPost {
    pub url: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

/// Upload authorization returned by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTicket {
    pub signed_url: SignedPost,
    /// Final storage location, e.g. `gs://bucket/onboarding/...`.
    pub gcs_uri: String,
    pub object_path: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Talks to the upload service and to storage.
#[derive(Debug, Clone)]
pub struct UploadClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl UploadClient {
    pub fn new(config: &Config) -> Result<Self> {
        let base = config.upload_base()?;
        let endpoint = Url::parse(&format!(
            "{}{AUTHORIZE_PATH}",
            base.as_str().trim_end_matches('/')
        ))
        .map_err(|e| Error::Config(format!("bad upload endpoint: {e}")))?;
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint,
        })
    }

    /// Ask the service for a signed upload policy.
    pub async fn authorize(&self, request: &UploadRequest) -> Result<UploadTicket> {
        request.validate()?;
        debug!(
            session_id = %request.session_id,
            stage = %request.stage,
            file = %request.file_name,
            "requesting upload authorization"
        );

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Upload(format!("authorization request failed: {e}")))?;

        let status = response.status();
        let body: Option<Value> = response.json().await.ok();
        let accepted = body
            .as_ref()
            .and_then(|b| b.get("ok"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        match body {
            Some(body) if status.is_success() && accepted => serde_json::from_value(body)
                .map_err(|e| Error::Upload(format!("malformed authorization response: {e}"))),
            body => {
                let message = body
                    .as_ref()
                    .and_then(|b| b.get("error"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("failed to get upload url ({status})"));
                Err(Error::Upload(message))
            }
        }
    }

    /// Send the file to the signed destination. Policy fields go first,
    /// the file part last.
    pub async fn transmit(
        &self,
        ticket: &UploadTicket,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<()> {
        let mut form = Form::new();
        for (key, value) in &ticket.signed_url.fields {
            form = form.text(key.clone(), value.clone());
        }
        let mut part = Part::bytes(bytes).file_name(safe_file_name(file_name));
        if let Some(ref content_type) = ticket.content_type {
            part = part
                .mime_str(content_type)
                .map_err(|e| Error::Upload(format!("invalid content type {content_type}: {e}")))?;
        }
        form = form.part("file", part);

        let response = self
            .http
            .post(&ticket.signed_url.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Upload(format!("transfer failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Upload(format!("storage rejected upload ({status}): {text}")));
        }
        Ok(())
    }

    /// Authorize and transmit one file. Returns the storage URI.
    pub async fn upload(&self, request: &UploadRequest, bytes: Vec<u8>) -> Result<String> {
        let result = async {
            let ticket = self.authorize(request).await?;
            self.transmit(&ticket, &request.file_name, bytes).await?;
            Ok(ticket.gcs_uri)
        }
        .await;

        match result {
            Ok(ref uri) => {
                metrics::uploads().add(1, &[KeyValue::new("result", "ok")]);
                info!(session_id = %request.session_id, uri = %uri, "upload stored");
            }
            Err(ref e) => {
                metrics::uploads().add(1, &[KeyValue::new("result", "error")]);
                warn!(session_id = %request.session_id, error = %e, "upload failed");
            }
        }
        result
    }
}
