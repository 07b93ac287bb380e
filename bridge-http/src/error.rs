use thiserror::Error;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to decode response body: {0}")]
    Decode(String),
}

impl HttpError {
    /// Timeouts and transport failures are worth another attempt; everything
    /// else indicates a malformed request or response.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HttpError::Timeout | HttpError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, HttpError>;
