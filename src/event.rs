//! Frames exchanged on the generation event stream.
//!
//! Inbound frames are JSON objects discriminated by `type`. The backend is
//! free to add new types, so decoding never fails: unknown or ill-typed
//! frames are dropped and text that is not JSON at all is surfaced as a
//! token.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message used when the backend sends an `error` frame without one.
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown generate error";

/// A decoded, inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The backend acknowledged the connection.
    Ready { message: Option<String> },
    /// A chunk of streamed text, optionally tagged with the producing node.
    Token {
        content: String,
        node: Option<String>,
    },
    /// A pipeline node finished. `state` is whatever the backend attached.
    NodeComplete { node: Option<String>, state: Value },
    /// The session finished normally.
    Complete { message: Option<String> },
    /// The session failed on the backend side.
    Error { message: String },
}

impl StreamEvent {
    /// `complete` and `error` end a session; nothing follows them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    /// Short label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "connected",
            Self::Token { .. } => "token",
            Self::NodeComplete { .. } => "node_complete",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }
}

/// Wire shape of the frames the backend sends.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InboundFrame {
    Connected {
        #[serde(default)]
        message: Option<String>,
    },
    Token {
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        node: Option<String>,
    },
    NodeComplete {
        #[serde(default)]
        node: Option<String>,
        #[serde(default)]
        state: Value,
    },
    Complete {
        #[serde(default)]
        message: Option<String>,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
    },
}

const KNOWN_TYPES: [&str; 5] = ["connected", "token", "node_complete", "complete", "error"];

/// Frames the client sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    Start,
}

impl ControlFrame {
    pub fn to_json(self) -> String {
        serde_json::to_string(&self).unwrap_or_else(|_| r#"{"type":"start"}"#.to_string())
    }
}

/// Decode one text frame.
///
/// Returns `None` for frames that carry nothing to deliver: unknown types,
/// objects without a `type`, known types whose fields have the wrong shape,
/// and tokens without content.
pub fn decode_frame(raw: &str) -> Option<StreamEvent> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(_) => {
            // Plain text from the backend is treated as a token.
            return Some(StreamEvent::Token {
                content: raw.to_string(),
                node: None,
            });
        }
    };

    let tag = value.get("type").and_then(Value::as_str)?;
    if !KNOWN_TYPES.contains(&tag) {
        return None;
    }

    let frame: InboundFrame = serde_json::from_value(value).ok()?;
    match frame {
        InboundFrame::Connected { message } => Some(StreamEvent::Ready { message }),
        InboundFrame::Token { content, node } => content
            .filter(|c| !c.is_empty())
            .map(|content| StreamEvent::Token { content, node }),
        InboundFrame::NodeComplete { node, state } => {
            Some(StreamEvent::NodeComplete { node, state })
        }
        InboundFrame::Complete { message } => Some(StreamEvent::Complete { message }),
        InboundFrame::Error { message } => Some(StreamEvent::Error {
            message: message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string()),
        }),
    }
}
