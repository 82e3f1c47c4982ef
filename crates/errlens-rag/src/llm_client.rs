// LLM client trait - the seam every reasoning-model backend plugs into

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Missing API key: {0}")]
    MissingApiKey(String),

    #[error("API error: {0}")]
    ApiError(String),
}

impl LlmError {
    /// Classify an HTTP failure by status code
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Unauthorized(body),
            StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited(body),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => LlmError::Timeout,
            _ => LlmError::ApiError(format!("{}: {}", status, body)),
        }
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::RequestFailed(err.to_string())
        }
    }

    /// Credentials problems do not improve with retries
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LlmError::Unauthorized(_) | LlmError::MissingApiKey(_))
    }

    /// short class name for logs
    pub fn class(&self) -> &'static str {
        match self {
            LlmError::RequestFailed(_) => "transport",
            LlmError::Timeout => "timeout",
            LlmError::RateLimited(_) => "rate_limit",
            LlmError::Unauthorized(_) | LlmError::MissingApiKey(_) => "auth",
            LlmError::ApiError(_) => "api",
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send one prompt to `self.model()` and return the raw completion text
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;

    fn model(&self) -> &str;

    fn provider(&self) -> &str;
}
