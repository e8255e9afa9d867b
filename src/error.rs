//! Error types and result aliases for the MathTutor gateway.
//!
//! This module defines [`GatewayError`] and the [`Result`] alias used by
//! constructors and internal plumbing. The public chat surface never returns
//! these errors directly: every failure is folded into an error
//! [`ChatResponse`](crate::llm::ChatResponse), a terminal stream event, or a
//! `false` health probe.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("{status} {body}")]
    UpstreamError { status: u16, body: String },

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
