//! Builds the upstream chat-completions payload.

use crate::error::Result;
use crate::llm::gateways::config::GatewayConfig;
use crate::llm::models::{ChatRequest, LlmMessage};
use serde::Serialize;
use std::sync::Arc;

/// System preamble sent ahead of every user message.
pub const TUTOR_SYSTEM_PROMPT: &str =
    "You are a professional math teacher. Answer questions in concise, clear language.";

/// Body of `POST {base_url}/chat/completions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionPayload {
    pub model: String,
    pub messages: Vec<LlmMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
}

/// Composes upstream payloads from caller requests and the shared config.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    config: Arc<GatewayConfig>,
}

impl RequestBuilder {
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        Self { config }
    }

    /// Payload with the tutor preamble followed by the caller's message.
    pub fn build(&self, request: &ChatRequest, stream: bool) -> ChatCompletionPayload {
        ChatCompletionPayload {
            model: self.config.model.clone(),
            messages: vec![
                LlmMessage::system(TUTOR_SYSTEM_PROMPT),
                LlmMessage::user(request.message.clone()),
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            stream,
        }
    }

    /// Serialized JSON body for the request.
    pub fn build_body(&self, request: &ChatRequest, stream: bool) -> Result<String> {
        Ok(serde_json::to_string(&self.build(request, stream))?)
    }
}
