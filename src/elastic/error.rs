//! Error types for search engine round trips

/// Result type for search engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Errors returned by a [`super::SearchEngine`]
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The request never produced an HTTP response
    #[error("Transport error: {0}")]
    Transport(String),

    /// The request timed out
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Non-2xx response, with the engine's error type and reason when present
    #[error("HTTP {status} {error_type}: {reason}")]
    Status {
        status: u16,
        error_type: String,
        reason: String,
    },

    /// A conditional write lost against a newer document version
    #[error("Version conflict on {0}")]
    Conflict(String),

    /// The response body did not have the expected shape
    #[error("Decode error: {0}")]
    Decode(String),
}

impl EngineError {
    /// HTTP status when the engine answered
    pub fn status(&self) -> Option<u16> {
        match self {
            EngineError::Status { status, .. } => Some(*status),
            EngineError::Conflict(_) => Some(409),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EngineError::Timeout(err.to_string())
        } else if err.is_decode() {
            EngineError::Decode(err.to_string())
        } else {
            EngineError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Decode(err.to_string())
    }
}
