pub mod gateway;
pub mod gateways;
pub mod models;

pub use gateway::{ChatHandle, LlmClient, StreamEnd, StreamEvent, StreamHandler};
pub use models::{ChatRequest, ChatResponse, LlmMessage, MessageRole, ResponseStatus};
