//! Typed upstream response schema and its mapping to [`ChatResponse`].
//!
//! All decoding of upstream JSON goes through the serde types here, so a
//! malformed shape fails in one place instead of at scattered key lookups.

use crate::error::{GatewayError, Result};
use crate::llm::models::ChatResponse;
use serde::Deserialize;

/// Non-streaming body: `{choices:[{message:{content}}]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChoice {
    pub message: AssistantMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// One SSE data payload: `{choices:[{delta:{content}}]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
}

/// Pull `choices[0].message.content` out of a full response body.
pub fn extract_content(body: &str) -> Result<String> {
    let response: ChatCompletionResponse = serde_json::from_str(body)?;
    response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::DecodeError("response has no choices".to_string()))?
        .message
        .content
        .ok_or_else(|| GatewayError::DecodeError("response message has no content".to_string()))
}

/// Pull a non-empty `choices[0].delta.content` out of one stream payload.
pub fn extract_delta(payload: &str) -> Result<Option<String>> {
    let chunk: ChatCompletionChunk = serde_json::from_str(payload)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

/// Fold the outcome of a chat call into the caller-facing shape.
pub fn normalize(outcome: Result<String>, session_id: &str) -> ChatResponse {
    match outcome {
        Ok(content) => ChatResponse::success(content, session_id),
        Err(err) => ChatResponse::error(error_message(&err), session_id),
    }
}

/// Human-readable text for an error response.
pub fn error_message(err: &GatewayError) -> String {
    match err {
        GatewayError::UpstreamError { status, body } => format!("{} {}", status, body),
        GatewayError::SerializationError(_) | GatewayError::DecodeError(_) => {
            format!("Failed to decode upstream response: {}", describe(err))
        }
        _ => format!("API call failed: {}", describe(err)),
    }
}

/// An error's message followed by its source chain.
pub fn describe(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}
