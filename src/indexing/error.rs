//! Error types for the ingestion pipeline

use crate::elastic::EngineError;

/// Result type for ingestion operations
pub type IndexingResult<T> = std::result::Result<T, IndexingError>;

#[derive(Debug, thiserror::Error)]
pub enum IndexingError {
    /// The root folder to index does not exist
    #[error("No such folder: {0}")]
    FolderNotFound(String),

    /// A directory could not be listed
    #[error("Enumeration failed at {path}: {reason}")]
    Enumeration { path: String, reason: String },

    /// A registered alias could not be found or created
    #[error("Alias error: {0}")]
    Alias(String),

    /// The reverse geocoding service failed as a whole
    #[error("Reverse geocoding failed: {0}")]
    Geocode(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for IndexingError {
    fn from(err: reqwest::Error) -> Self {
        IndexingError::Geocode(err.to_string())
    }
}
