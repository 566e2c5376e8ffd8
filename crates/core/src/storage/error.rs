use thiserror::Error;

/// Errors surfaced by a `Repository<T>` backend.
///
/// Decorators pass these through untouched; the caches never produce them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// No entity with this id.
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },
    /// An entity with this id is already stored.
    #[error("{entity_type} already exists: {id}")]
    AlreadyExists {
        entity_type: &'static str,
        id: String,
    },
    /// The backing store could not be reached.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Query failed: {0}")]
    QueryFailed(String),
    /// An entity could not be converted to or from its stored form.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The request itself is malformed, e.g. a patch changing the id.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;
