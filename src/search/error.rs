//! Error types for search operations

use crate::elastic::EngineError;
use crate::error::AppError;

/// Result type for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Errors that can occur while compiling or running a search
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Drilldown text that does not follow `field:v1,v2_field:v3`
    #[error("Invalid drilldown '{entry}': {reason}")]
    InvalidDrilldown { entry: String, reason: String },

    /// A hierarchical chain that skips or mixes levels
    #[error("Invalid hierarchy chain '{0}': {1}")]
    InvalidHierarchy(String, String),

    /// Facet category other than keywords, tags, placename or date
    #[error("Unsupported category: {0}")]
    UnsupportedCategory(String),

    /// Out-of-range paging, radius or date parameter
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    /// Requested output property that does not exist
    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    /// The engine round trip failed
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl SearchError {
    pub fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        SearchError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the caller's input was rejected before any I/O
    pub fn is_compile_error(&self) -> bool {
        !matches!(self, SearchError::Engine(_))
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::Engine(engine) => AppError::Engine(engine),
            other => AppError::Validation(other.to_string()),
        }
    }
}
