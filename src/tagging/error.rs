//! Error types for tag enrichment

use crate::elastic::EngineError;

/// Result type for tagging operations
pub type TagResult<T> = std::result::Result<T, TagError>;

#[derive(Debug, thiserror::Error)]
pub enum TagError {
    /// The provider refused the call for quota or billing reasons (429/402)
    #[error("Provider quota exceeded (HTTP {status})")]
    QuotaExceeded { status: u16 },

    /// Any other non-2xx provider response
    #[error("Provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    /// The reduced image could not be produced
    #[error("Image reduction failed: {0}")]
    ImageReduction(String),

    #[error("Tag cache error: {0}")]
    Cache(String),

    /// The media document disappeared before the tags could be merged
    #[error("No matching media found: {0}")]
    DocumentNotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TagError {
    /// Map a provider response status to an error
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        match status {
            402 | 429 => TagError::QuotaExceeded { status },
            _ => TagError::Http {
                status,
                body: body.into(),
            },
        }
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, TagError::QuotaExceeded { .. })
    }
}

impl From<reqwest::Error> for TagError {
    fn from(err: reqwest::Error) -> Self {
        TagError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_statuses() {
        assert!(TagError::from_status(429, "").is_quota());
        assert!(TagError::from_status(402, "").is_quota());
        assert!(matches!(
            TagError::from_status(500, "boom"),
            TagError::Http { status: 500, .. }
        ));
    }
}
