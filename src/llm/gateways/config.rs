//! Upstream connection settings.
//!
//! A [`GatewayConfig`] is built once at startup and shared read-only by every
//! call the client makes.

use crate::error::{GatewayError, Result};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PROVIDER: &str = "deepseek";
pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_MODEL: &str = "deepseek-chat";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

const MAX_TEMPERATURE: f32 = 2.0;
const MASKED_PREFIX_LEN: usize = 6;

/// Configuration for connecting to an OpenAI-compatible chat API.
#[derive(Clone, PartialEq)]
pub struct GatewayConfig {
    pub provider: String,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            provider: std::env::var("MATHTUTOR_LLM_PROVIDER")
                .unwrap_or_else(|_| DEFAULT_PROVIDER.to_string()),
            api_key: std::env::var("MATHTUTOR_LLM_API_KEY")
                .or_else(|_| std::env::var("DEEPSEEK_API_KEY"))
                .unwrap_or_default(),
            base_url: std::env::var("MATHTUTOR_LLM_BASE_URL")
                .map(|url| trim_base_url(&url))
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            model: std::env::var("MATHTUTOR_LLM_MODEL")
                .unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from the process environment, after merging any
    /// `.env` file found in the working directory or its parents.
    pub fn from_env() -> Result<Self> {
        // A missing .env is normal; real variables take precedence anyway.
        let _ = dotenv::dotenv();
        Self::from_process_env()
    }

    /// Load a specific dotenv file, then read the environment.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        dotenv::from_path(path).map_err(|e| {
            GatewayError::ConfigError(format!("cannot load {}: {}", path.display(), e))
        })?;
        Self::from_process_env()
    }

    fn from_process_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(max_tokens) = parse_env::<u32>("MATHTUTOR_LLM_MAX_TOKENS")? {
            config.max_tokens = max_tokens;
        }
        if let Some(temperature) = parse_env::<f32>("MATHTUTOR_LLM_TEMPERATURE")? {
            config.temperature = temperature;
        }
        if let Some(secs) = parse_env::<u64>("MATHTUTOR_LLM_CONNECT_TIMEOUT_SECS")? {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>("MATHTUTOR_LLM_READ_TIMEOUT_SECS")? {
            config.read_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.base_url = trim_base_url(base_url.as_ref());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    /// Check the settings the upstream would otherwise reject.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(GatewayError::ConfigError("base URL is empty".to_string()));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(GatewayError::ConfigError(format!(
                "base URL must be http(s): {}",
                self.base_url
            )));
        }
        if self.model.trim().is_empty() {
            return Err(GatewayError::ConfigError("model name is empty".to_string()));
        }
        if self.max_tokens == 0 {
            return Err(GatewayError::ConfigError("max_tokens must be positive".to_string()));
        }
        if !self.temperature.is_finite()
            || !(0.0..=MAX_TEMPERATURE).contains(&self.temperature)
        {
            return Err(GatewayError::ConfigError(format!(
                "temperature must be within 0.0..={}, got {}",
                MAX_TEMPERATURE, self.temperature
            )));
        }
        Ok(())
    }

    /// API key safe for logs: a short prefix followed by `...`.
    ///
    /// The prefix never covers more than half the key.
    pub fn masked_api_key(&self) -> String {
        if self.api_key.is_empty() {
            return "<unset>".to_string();
        }
        let visible = (self.api_key.chars().count() / 2).min(MASKED_PREFIX_LEN);
        let prefix: String = self.api_key.chars().take(visible).collect();
        format!("{}...", prefix)
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    pub fn models_url(&self) -> String {
        format!("{}/models", self.base_url)
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("provider", &self.provider)
            .field("api_key", &self.masked_api_key())
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

fn trim_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn parse_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| GatewayError::ConfigError(format!("{}={:?}: {}", key, raw, e))),
        Err(_) => Ok(None),
    }
}
