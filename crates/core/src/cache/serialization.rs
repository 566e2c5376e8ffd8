//! Pure functions for converting repository values to and from cached JSON values.
//!
//! The in-memory caches store `serde_json::Value`, so a single cache instance can
//! hold entities of every collection. Conversion failures are reported as
//! [`SerializationError`] and treated by callers as a cache miss.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::storage::Page;

/// Errors that can occur during cache serialization/deserialization.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SerializationError {
    /// Failed to serialize a value.
    #[error("Failed to serialize: {0}")]
    SerializeFailed(String),
    /// Failed to deserialize a cached value.
    #[error("Failed to deserialize: {0}")]
    DeserializeFailed(String),
}

/// Result type for serialization operations.
pub type Result<T> = std::result::Result<T, SerializationError>;

fn to_value<S: Serialize + ?Sized>(value: &S) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| SerializationError::SerializeFailed(e.to_string()))
}

fn from_value<D: DeserializeOwned>(value: Value) -> Result<D> {
    serde_json::from_value(value).map_err(|e| SerializationError::DeserializeFailed(e.to_string()))
}

/// Serializes a single entity.
pub fn serialize_entity<T: Serialize>(entity: &T) -> Result<Value> {
    to_value(entity)
}

/// Deserializes a single cached entity.
pub fn deserialize_entity<T: DeserializeOwned>(value: Value) -> Result<T> {
    from_value(value)
}

/// Serializes a list of entities.
pub fn serialize_entities<T: Serialize>(entities: &[T]) -> Result<Value> {
    to_value(entities)
}

/// Deserializes a cached list of entities.
pub fn deserialize_entities<T: DeserializeOwned>(value: Value) -> Result<Vec<T>> {
    from_value(value)
}

/// Serializes a paginated result.
pub fn serialize_page<T: Serialize>(page: &Page<T>) -> Result<Value> {
    to_value(page)
}

/// Deserializes a cached paginated result.
pub fn deserialize_page<T: DeserializeOwned>(value: Value) -> Result<Page<T>> {
    from_value(value)
}

/// Serializes a count. A count of zero is a regular cached value.
pub fn serialize_count(count: u64) -> Value {
    Value::from(count)
}

/// Deserializes a cached count.
pub fn deserialize_count(value: Value) -> Result<u64> {
    value.as_u64().ok_or_else(|| {
        SerializationError::DeserializeFailed(format!("expected unsigned count, got {}", value))
    })
}
