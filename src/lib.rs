//! Outbound LLM gateway for the MathTutor backend.
//!
//! [`GatewayClient`](llm::gateways::GatewayClient) talks to an
//! OpenAI-compatible chat-completions service in three modes (awaited,
//! background, and SSE streaming) and reports every outcome through one
//! [`ChatResponse`](llm::ChatResponse) shape.

pub mod error;
pub mod llm;

pub use error::{GatewayError, Result};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::error::{GatewayError, Result};
    pub use crate::llm::gateways::{GatewayClient, GatewayConfig};
    pub use crate::llm::{
        ChatHandle, ChatRequest, ChatResponse, LlmClient, ResponseStatus, StreamEnd, StreamEvent,
        StreamHandler,
    };
}
