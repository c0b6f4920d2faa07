//! Core data model.
//!
//! A generation request goes out, a loosely shaped state comes back over the
//! event stream, an [`IdeaRecord`] is pulled out of it, and a [`CardResult`]
//! is handed to the caller.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Opaque, server-issued identifier of one generation session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a server-issued id, trimmed. Returns `None` for blank ids.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        match raw.trim() {
            "" => None,
            trimmed if trimmed.len() == raw.len() => Some(Self(raw)),
            trimmed => Some(Self(trimmed.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Generation request
// ---------------------------------------------------------------------------

/// What the caller asks the backend to generate from.
///
/// Serializes to the session-creation body:
/// `{ user_profile, macro_themes, user_prompt? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Free-text description of the creator.
    pub user_profile: String,
    /// Ordered, non-empty list of themes.
    pub macro_themes: Vec<String>,
    /// Optional extra instruction from the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_prompt: Option<String>,
}

impl GenerateRequest {
    pub fn new(user_profile: impl Into<String>, macro_themes: Vec<String>) -> Self {
        Self {
            user_profile: user_profile.into(),
            macro_themes,
            user_prompt: None,
        }
    }

    pub fn user_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.user_prompt = Some(prompt.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Idea record
// ---------------------------------------------------------------------------

/// A structured idea found inside a node's state.
///
/// Only produced once `title`, `hook` and `script_outline` were confirmed to
/// be strings; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdeaRecord {
    pub title: String,
    pub hook: String,
    pub script_outline: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_length: Option<String>,
}

// ---------------------------------------------------------------------------
// Card
// ---------------------------------------------------------------------------

/// Display status of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    Shown,
    Liked,
    Skipped,
}

/// The post-processed artifact returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardResult {
    /// Position of the card in the caller's sequence.
    pub id: u64,
    pub title: String,
    /// Hook with surrounding quotes removed.
    pub hook: String,
    /// One to three narrative beat labels.
    pub beats: Vec<String>,
    pub rationale: String,
    /// Untouched script outline.
    pub content_md: String,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_length: Option<String>,
    pub status: CardStatus,
}
