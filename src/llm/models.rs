use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message role in LLM conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

/// Message in the upstream `messages` array
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LlmMessage {
    pub role: MessageRole,
    pub content: String,
}

impl LlmMessage {
    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Generate a fresh session identifier (UUID v4, hyphen-less).
pub fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// A chat request from an end user.
///
/// The prompt in `message` is opaque to the gateway. `context` is carried
/// along for the outer layers but is not sent upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: None,
            context: None,
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Return the session id, generating and storing one first if it is
    /// absent or blank.
    ///
    /// This is the only mutation the gateway performs on a request.
    pub fn ensure_session_id(&mut self) -> &str {
        if self.session_id.as_deref().map_or(true, |id| id.trim().is_empty()) {
            self.session_id = Some(new_session_id());
        }
        self.session_id.as_deref().unwrap_or_default()
    }

    /// True when the message has visible content.
    pub fn has_message(&self) -> bool {
        !self.message.trim().is_empty()
    }
}

/// Outcome of a chat call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// The single response shape handed back to callers.
///
/// When `status` is [`ResponseStatus::Error`], `response` holds a
/// human-readable error description and never partial model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
    pub status: ResponseStatus,
    pub timestamp: DateTime<Utc>,
}

impl ChatResponse {
    pub fn success(response: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            session_id: session_id.into(),
            status: ResponseStatus::Success,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            response: message.into(),
            session_id: session_id.into(),
            status: ResponseStatus::Error,
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}
