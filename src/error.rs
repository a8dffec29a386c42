//! Error types for the search index, the paper store and the repository.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by a search backend or by the engine layered over it.
#[derive(Error, Debug)]
pub enum SearchError {
    /// The backend is switched off by configuration.
    #[error("search backend is disabled")]
    Disabled,

    /// The backend could not be reached or reported itself unhealthy.
    #[error("search backend unavailable: {0}")]
    Unavailable(String),

    /// A backend call exceeded its time budget.
    #[error("search backend call timed out after {0:?}")]
    Timeout(Duration),

    /// The filter/sort combination is invalid. Never triggers a fallback.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Failed to create or configure the index.
    #[error("index creation error: {0}")]
    IndexCreation(String),

    /// Document not found.
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// The backend rejected or failed a request.
    #[error("request error: {0}")]
    Request(String),

    /// The embedded engine failed.
    #[error("engine error: {0}")]
    Engine(String),

    /// Failed to encode or decode a payload.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl SearchError {
    /// Create an unavailable error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create an invalid query error.
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    /// Create an index creation error.
    pub fn index_creation(msg: impl Into<String>) -> Self {
        Self::IndexCreation(msg.into())
    }

    /// Create a request error.
    pub fn request(msg: impl Into<String>) -> Self {
        Self::Request(msg.into())
    }

    /// Create an engine error.
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Create a document not found error.
    pub fn document_not_found(id: &Uuid) -> Self {
        Self::DocumentNotFound(id.to_string())
    }

    /// True for malformed queries, which must reach the caller.
    pub fn is_invalid_query(&self) -> bool {
        matches!(self, Self::InvalidQuery(_))
    }

    /// True when the backend is off, unreachable or too slow.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Disabled | Self::Unavailable(_) | Self::Timeout(_)
        )
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Unavailable(err.to_string())
        } else if err.is_timeout() {
            Self::Request(format!("timed out: {}", err))
        } else if err.is_decode() {
            Self::Serialization(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

impl From<tantivy::TantivyError> for SearchError {
    fn from(err: tantivy::TantivyError) -> Self {
        Self::Engine(err.to_string())
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors raised by the relational paper store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("paper not found: {0}")]
    NotFound(Uuid),
}

/// Errors surfaced by the paper repository.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Rejected before touching any backend.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RepositoryError {
    /// True when the caller sent a request that can never succeed.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::InvalidQuery(_) => true,
            Self::Search(err) => err.is_invalid_query(),
            Self::Store(_) => false,
        }
    }
}
