use thiserror::Error;

#[derive(Debug, Error)]
pub enum RestError {
    /// Non-success status. `body` is kept verbatim so venue crates can decode
    /// their own error payloads out of it.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request timeout")]
    Timeout,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("JSON parse error: {0}")]
    Parse(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Client setup failed: {0}")]
    Setup(String),
}

impl RestError {
    /// Network failures, rate limits and gateway errors (502/503/504).
    pub fn is_retryable(&self) -> bool {
        match self {
            RestError::Timeout | RestError::Connection(_) | RestError::RateLimited { .. } => true,
            RestError::Status { status, .. } => matches!(status, 502..=504),
            RestError::Parse(_) | RestError::Setup(_) => false,
        }
    }
}

impl From<reqwest::Error> for RestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return RestError::Timeout;
        }
        if err.is_decode() {
            return RestError::Parse(err.to_string());
        }
        match err.status() {
            Some(status) if !err.is_connect() => RestError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            },
            _ => RestError::Connection(err.to_string()),
        }
    }
}
