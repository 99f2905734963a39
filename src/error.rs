use reqwest::StatusCode;
use thiserror::Error;

use crate::elastic::EngineError;
use crate::indexing::IndexingError;
use crate::search::SearchError;
use crate::tagging::TagError;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed caller input, rejected before any I/O
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Search engine returned a non-2xx response or could not be reached
    #[error("Search engine error: {0}")]
    Engine(#[from] EngineError),

    /// Tag provider errors
    #[error("Tagging error: {0}")]
    Tagging(#[from] TagError),

    /// Ingestion errors
    #[error("Indexing error: {0}")]
    Indexing(#[from] IndexingError),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Engine(EngineError::Status { status, .. }) if *status == 404 => {
                StatusCode::NOT_FOUND
            }
            AppError::Engine(_) => StatusCode::BAD_GATEWAY,
            AppError::Tagging(TagError::QuotaExceeded { .. }) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Tagging(_) => StatusCode::BAD_GATEWAY,
            AppError::Configuration(_)
            | AppError::Io(_)
            | AppError::Serialization(_)
            | AppError::Indexing(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Engine(_) => "SEARCH_ENGINE_ERROR",
            AppError::Tagging(_) => "TAGGING_ERROR",
            AppError::Indexing(_) => "INDEXING_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
