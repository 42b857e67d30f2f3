//! Search error types

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the matching engine
#[derive(Debug, Error)]
pub enum SearchError {
    /// Catalog is missing required columns or cannot be parsed
    #[error("catalog load failed: {0}")]
    DataLoad(String),

    /// Embedding provider rejected the input or returned bad output
    #[error("embedding error: {0}")]
    Embedding(String),

    /// A vector with zero (or non-finite) Euclidean norm was normalized
    #[error("degenerate vector: {0}")]
    DegenerateVector(String),

    /// Persisted index is unusable for the current catalog or provider
    #[error("index corrupt: {0}")]
    IndexCorrupt(String),

    /// Query was empty after trimming
    #[error("search query is required")]
    EmptyQuery,

    /// Embedding plus index search exceeded the request budget
    #[error("search timed out after {0:?}")]
    Timeout(Duration),

    #[error("embedding API key is not configured (set EMBEDDING_API_KEY or OPENAI_API_KEY)")]
    ApiKeyMissing,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "openai")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SearchError {
    /// Whether the caller can fix this by changing the query
    pub fn is_client_error(&self) -> bool {
        matches!(self, SearchError::EmptyQuery)
    }
}

pub type SearchResult<T> = Result<T, SearchError>;
