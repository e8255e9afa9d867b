pub mod config;
pub mod gateway_client;
pub mod normalizer;
pub mod request_builder;
pub mod sse;

pub use config::GatewayConfig;
pub use gateway_client::GatewayClient;
pub use request_builder::{ChatCompletionPayload, RequestBuilder, TUTOR_SYSTEM_PROMPT};
pub use sse::StreamDecoder;
