use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{BatchUpdate, Page, Patch, QueryOptions, Result};

/// A storable entity.
///
/// The identifier is optional because entities may be built before the store
/// assigns one. Apart from the ID, the entity's shape is opaque to the cache.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Name used in error messages (e.g. `"Flashcard"`).
    const ENTITY_TYPE: &'static str;

    /// Returns the entity's ID, if it has one.
    fn id(&self) -> Option<&str>;

    /// Assigns an ID. Only stores call this.
    fn set_id(&mut self, id: String);
}

/// Generic repository over entities of type `T`.
///
/// Backends own the entity lifecycle: they assign identity on `create` and
/// decide how atomic batch operations are.
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    /// Gets an entity by its ID.
    async fn find_by_id(&self, id: &str) -> Result<Option<T>>;

    /// Gets the first entity matching the options.
    async fn find_one(&self, options: &QueryOptions) -> Result<Option<T>>;

    /// Gets a page of entities matching the options.
    async fn find_many(&self, options: &QueryOptions) -> Result<Page<T>>;

    /// Gets every entity of the collection.
    async fn find_all(&self) -> Result<Vec<T>>;

    /// Counts entities matching the options (all entities when `None`).
    async fn count(&self, options: Option<&QueryOptions>) -> Result<u64>;

    /// Checks whether an entity exists.
    async fn exists(&self, id: &str) -> Result<bool>;

    /// Creates an entity and returns it as stored.
    async fn create(&self, data: T) -> Result<T>;

    /// Creates several entities and returns those that were stored.
    async fn create_batch(&self, data: Vec<T>) -> Result<Vec<T>>;

    /// Applies a partial update and returns the updated entity.
    async fn update(&self, id: &str, patch: &Patch) -> Result<T>;

    /// Applies several partial updates and returns the updated entities.
    async fn update_batch(&self, updates: &[BatchUpdate]) -> Result<Vec<T>>;

    /// Deletes an entity by its ID.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Deletes several entities by ID.
    async fn delete_batch(&self, ids: &[String]) -> Result<()>;
}
