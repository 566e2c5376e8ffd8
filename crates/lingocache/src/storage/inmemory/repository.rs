//! In-memory repository implementation.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use lingocache_core::storage::{
    apply_patch, matches_filters, paginate, sort_entities, BatchUpdate, Entity, Page, Patch,
    QueryOptions, Repository, RepositoryError, Result,
};

/// In-memory storage backend for testing.
///
/// Entities are kept in a `BTreeMap` keyed by id, so unordered queries return them
/// in id order. Data is not persisted and will be lost when the repository is dropped.
///
/// Batch operations validate every item before touching the map: either all of
/// them are applied or none is.
pub struct InMemoryRepository<T: Entity> {
    entities: Arc<RwLock<BTreeMap<String, T>>>,
}

impl<T: Entity> Clone for InMemoryRepository<T> {
    fn clone(&self) -> Self {
        Self {
            entities: self.entities.clone(),
        }
    }
}

impl<T: Entity> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> InMemoryRepository<T> {
    /// Creates a new empty in-memory repository.
    pub fn new() -> Self {
        Self {
            entities: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Creates a repository pre-filled with `entities`. Entities without an id get one.
    pub fn with_entities(entities: impl IntoIterator<Item = T>) -> Self {
        let map = entities
            .into_iter()
            .map(|mut entity| (assign_id(&mut entity), entity))
            .collect();
        Self {
            entities: Arc::new(RwLock::new(map)),
        }
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }

    /// Filtered and ordered entities, before pagination.
    async fn select(&self, options: &QueryOptions) -> Result<Vec<T>> {
        let entities = self.entities.read().await;

        let mut matching = Vec::new();
        for entity in entities.values() {
            let json = to_json(entity)?;
            if matches_filters(&json, &options.filters) {
                matching.push((json, entity.clone()));
            }
        }
        sort_entities(&mut matching, &options.order_by);

        Ok(matching.into_iter().map(|(_, entity)| entity).collect())
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for InMemoryRepository<T> {
    async fn find_by_id(&self, id: &str) -> Result<Option<T>> {
        let entities = self.entities.read().await;
        Ok(entities.get(id).cloned())
    }

    async fn find_one(&self, options: &QueryOptions) -> Result<Option<T>> {
        let offset = options.offset.unwrap_or(0);
        Ok(self.select(options).await?.into_iter().nth(offset))
    }

    async fn find_many(&self, options: &QueryOptions) -> Result<Page<T>> {
        let matching = self.select(options).await?;
        Ok(paginate(matching, options.offset, options.limit))
    }

    async fn find_all(&self) -> Result<Vec<T>> {
        let entities = self.entities.read().await;
        Ok(entities.values().cloned().collect())
    }

    async fn count(&self, options: Option<&QueryOptions>) -> Result<u64> {
        let count = match options {
            Some(options) if !options.filters.is_empty() => self.select(options).await?.len(),
            _ => self.entities.read().await.len(),
        };
        Ok(count as u64)
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let entities = self.entities.read().await;
        Ok(entities.contains_key(id))
    }

    async fn create(&self, mut data: T) -> Result<T> {
        let mut entities = self.entities.write().await;
        let id = assign_id(&mut data);
        if entities.contains_key(&id) {
            return Err(already_exists::<T>(id));
        }
        entities.insert(id, data.clone());
        Ok(data)
    }

    async fn create_batch(&self, data: Vec<T>) -> Result<Vec<T>> {
        let mut entities = self.entities.write().await;

        let mut staged = Vec::with_capacity(data.len());
        let mut seen = HashSet::with_capacity(data.len());
        for mut entity in data {
            let id = assign_id(&mut entity);
            if entities.contains_key(&id) || !seen.insert(id.clone()) {
                return Err(already_exists::<T>(id));
            }
            staged.push((id, entity));
        }

        let mut created = Vec::with_capacity(staged.len());
        for (id, entity) in staged {
            entities.insert(id, entity.clone());
            created.push(entity);
        }
        Ok(created)
    }

    async fn update(&self, id: &str, patch: &Patch) -> Result<T> {
        let mut entities = self.entities.write().await;
        let current = entities.get(id).ok_or_else(|| not_found::<T>(id))?;

        let updated = patched(current, patch)?;
        entities.insert(id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn update_batch(&self, updates: &[BatchUpdate]) -> Result<Vec<T>> {
        let mut entities = self.entities.write().await;

        // Later updates of the same id build on earlier ones.
        let mut staged: BTreeMap<String, T> = BTreeMap::new();
        let mut updated = Vec::with_capacity(updates.len());
        for update in updates {
            let current = staged
                .get(&update.id)
                .or_else(|| entities.get(&update.id))
                .ok_or_else(|| not_found::<T>(&update.id))?;
            let entity = patched(current, &update.patch)?;
            staged.insert(update.id.clone(), entity.clone());
            updated.push(entity);
        }

        entities.extend(staged);
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut entities = self.entities.write().await;
        if entities.remove(id).is_none() {
            return Err(not_found::<T>(id));
        }
        Ok(())
    }

    async fn delete_batch(&self, ids: &[String]) -> Result<()> {
        let mut entities = self.entities.write().await;
        if let Some(missing) = ids.iter().find(|id| !entities.contains_key(id.as_str())) {
            return Err(not_found::<T>(missing));
        }
        for id in ids {
            entities.remove(id);
        }
        Ok(())
    }
}

/// Returns the entity's id, generating a UUID v4 when it has none.
fn assign_id<T: Entity>(entity: &mut T) -> String {
    match entity.id() {
        Some(id) => id.to_string(),
        None => {
            let id = Uuid::new_v4().to_string();
            entity.set_id(id.clone());
            id
        }
    }
}

fn patched<T: Entity>(current: &T, patch: &Patch) -> Result<T> {
    let merged = apply_patch(&to_json(current)?, patch)?;
    serde_json::from_value(merged).map_err(|e| RepositoryError::InvalidData(e.to_string()))
}

fn to_json<T: Entity>(entity: &T) -> Result<Value> {
    Ok(serde_json::to_value(entity)?)
}

fn not_found<T: Entity>(id: &str) -> RepositoryError {
    RepositoryError::NotFound {
        entity_type: T::ENTITY_TYPE,
        id: id.to_string(),
    }
}

fn already_exists<T: Entity>(id: String) -> RepositoryError {
    RepositoryError::AlreadyExists {
        entity_type: T::ENTITY_TYPE,
        id,
    }
}
