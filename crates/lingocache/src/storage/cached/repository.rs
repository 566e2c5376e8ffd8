use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use lingocache_core::cache::{
    collection_pattern, deserialize_count, deserialize_entities, deserialize_entity,
    deserialize_page, id_params, query_key, serialize_count, serialize_entities,
    serialize_entity, serialize_page, TtlPreset,
};
use lingocache_core::storage::{
    BatchUpdate, Entity, Page, Patch, QueryOptions, Repository, Result,
};

use crate::cache::{LruQueryCache, TtlCache};

const FIND_ONE: &str = "findOne";
const FIND_MANY: &str = "findMany";
const FIND_ALL: &str = "findAll";
const COUNT: &str = "count";

/// Write epochs of both caches, read before a repository call.
#[derive(Debug, Clone, Copy)]
struct Epochs {
    entity: u64,
    query: u64,
}

/// Cached repository decorator.
///
/// - `find_by_id` goes through the [`TtlCache`], keyed by `{ "id": id }`
/// - `find_one`, `find_many`, `find_all` and `count` go through the [`LruQueryCache`],
///   keyed by collection, operation and canonical options; `find_many` also seeds
///   the entity cache with every returned item
/// - `exists` answers `true` from the entity cache, otherwise asks the repository
///
/// Errors from the underlying repository are returned unchanged, and a failed
/// write leaves both caches untouched. Cache (de)serialization problems are
/// logged and degrade into misses.
///
/// Every successful write advances the collection's write epoch in both caches.
/// A read snapshots the epochs before calling the repository and only caches
/// what it fetched if they did not move, so a slow read never replaces the
/// result of a write that committed meanwhile.
///
/// # Type Parameters
///
/// * `T` - The entity type
/// * `R` - The underlying repository implementation
pub struct CachedRepository<T, R>
where
    T: Entity,
    R: Repository<T>,
{
    collection: String,
    repository: Arc<R>,
    entity_cache: Arc<TtlCache>,
    query_cache: Arc<LruQueryCache>,
    entity_ttl: Duration,
    query_ttl: Option<Duration>,
    _entity: PhantomData<fn() -> T>,
}

impl<T, R> CachedRepository<T, R>
where
    T: Entity,
    R: Repository<T>,
{
    /// Creates a new cached repository for `collection`.
    ///
    /// # Arguments
    ///
    /// * `collection` - Name used to namespace every cache key
    /// * `repository` - The underlying repository to cache
    /// * `entity_cache` - Cache for single-entity lookups
    /// * `query_cache` - Cache for query results
    pub fn new(
        collection: impl Into<String>,
        repository: Arc<R>,
        entity_cache: Arc<TtlCache>,
        query_cache: Arc<LruQueryCache>,
    ) -> Self {
        Self {
            collection: collection.into(),
            repository,
            entity_cache,
            query_cache,
            entity_ttl: TtlPreset::Medium.duration(),
            query_ttl: None,
            _entity: PhantomData,
        }
    }

    /// Sets the TTL of cached entities (default: [`TtlPreset::Medium`]).
    pub fn with_entity_ttl(mut self, ttl: impl Into<Duration>) -> Self {
        self.entity_ttl = ttl.into();
        self
    }

    /// Overrides the query cache's default TTL for this collection's queries.
    pub fn with_query_ttl(mut self, ttl: impl Into<Duration>) -> Self {
        self.query_ttl = Some(ttl.into());
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn entity_ttl(&self) -> Duration {
        self.entity_ttl
    }

    /// Drops every cached entity and query of this collection.
    pub fn invalidate_collection(&self) {
        self.entity_cache.invalidate(&self.collection);
        self.invalidate_queries();
    }

    fn cached_entity(&self, id: &str) -> Option<T> {
        let params = id_params(id);
        let value = self.entity_cache.get(&self.collection, &params)?;

        match deserialize_entity(value) {
            Ok(entity) => {
                tracing::trace!(collection = %self.collection, %id, "Cache hit for entity");
                Some(entity)
            }
            Err(err) => {
                // Treat as cache miss
                tracing::warn!(collection = %self.collection, %id, error = %err, "Cached entity deserialization failed");
                self.entity_cache.invalidate_key(&self.collection, &params);
                None
            }
        }
    }

    fn epochs(&self) -> Epochs {
        Epochs {
            entity: self.entity_cache.write_epoch(&self.collection),
            query: self.query_cache.write_epoch(&self.collection),
        }
    }

    /// Caches an entity. With `read_at`, only if no write happened since that epoch.
    fn remember(&self, id: &str, entity: &T, read_at: Option<u64>) {
        let value = match serialize_entity(entity) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(collection = %self.collection, %id, error = %err, "Failed to cache entity");
                return;
            }
        };

        let params = id_params(id);
        match read_at {
            Some(epoch) => {
                self.entity_cache.set_if_current(
                    &self.collection,
                    &params,
                    value,
                    self.entity_ttl,
                    epoch,
                );
            }
            None => self
                .entity_cache
                .set(&self.collection, &params, value, self.entity_ttl),
        }
    }

    fn remember_all<'a>(&self, entities: impl IntoIterator<Item = &'a T>, read_at: Option<u64>) {
        for entity in entities {
            if let Some(id) = entity.id() {
                self.remember(id, entity, read_at);
            }
        }
    }

    /// Called after every successful write, before the caches are updated.
    fn mark_written(&self) {
        self.entity_cache.advance_epoch(&self.collection);
    }

    fn forget(&self, id: &str) {
        self.entity_cache
            .invalidate_key(&self.collection, &id_params(id));
    }

    /// Returns the query cache key, or `None` if the options cannot be serialized.
    fn query_key<O: Serialize + ?Sized>(&self, operation: &str, options: &O) -> Option<String> {
        match serde_json::to_value(options) {
            Ok(value) => Some(query_key(&self.collection, operation, &value)),
            Err(err) => {
                tracing::warn!(collection = %self.collection, operation, error = %err, "Query options not cacheable");
                None
            }
        }
    }

    fn cached_query(&self, key: Option<&str>) -> Option<Value> {
        key.and_then(|key| self.query_cache.get(key, self.query_ttl))
    }

    fn store_query(
        &self,
        key: Option<String>,
        value: std::result::Result<Value, impl std::fmt::Display>,
        read_at: u64,
    ) {
        let Some(key) = key else {
            return;
        };
        match value {
            Ok(value) => {
                self.query_cache
                    .set_if_current(&key, value, &self.collection, read_at);
            }
            Err(err) => {
                tracing::warn!(collection = %self.collection, %key, error = %err, "Failed to cache query result")
            }
        }
    }

    fn invalidate_queries(&self) {
        self.query_cache.advance_epoch(&self.collection);
        let pattern = collection_pattern(&self.collection);
        match self.query_cache.invalidate_pattern(&pattern) {
            Ok(removed) => {
                tracing::debug!(collection = %self.collection, removed, "Invalidated cached queries")
            }
            Err(err) => {
                tracing::warn!(collection = %self.collection, error = %err, "Failed to invalidate cached queries")
            }
        }
    }
}

#[async_trait]
impl<T, R> Repository<T> for CachedRepository<T, R>
where
    T: Entity,
    R: Repository<T> + 'static,
{
    async fn find_by_id(&self, id: &str) -> Result<Option<T>> {
        if let Some(entity) = self.cached_entity(id) {
            return Ok(Some(entity));
        }

        // Cache miss - fetch from repository
        tracing::trace!(collection = %self.collection, %id, "Cache miss for entity");
        let epochs = self.epochs();
        let entity = self.repository.find_by_id(id).await?;

        if let Some(ref e) = entity {
            self.remember(id, e, Some(epochs.entity));
        }

        Ok(entity)
    }

    async fn find_one(&self, options: &QueryOptions) -> Result<Option<T>> {
        let key = self.query_key(FIND_ONE, options);

        if let Some(value) = self.cached_query(key.as_deref()) {
            match deserialize_entity(value) {
                Ok(entity) => return Ok(Some(entity)),
                Err(err) => {
                    tracing::warn!(collection = %self.collection, error = %err, "Cached findOne deserialization failed")
                }
            }
        }

        let epochs = self.epochs();
        let entity = self.repository.find_one(options).await?;

        // Only found entities are cached; "no match" is always asked again.
        if let Some(ref e) = entity {
            self.store_query(key, serialize_entity(e), epochs.query);
        }

        Ok(entity)
    }

    async fn find_many(&self, options: &QueryOptions) -> Result<Page<T>> {
        let key = self.query_key(FIND_MANY, options);

        if let Some(value) = self.cached_query(key.as_deref()) {
            match deserialize_page(value) {
                Ok(page) => return Ok(page),
                Err(err) => {
                    tracing::warn!(collection = %self.collection, error = %err, "Cached findMany deserialization failed")
                }
            }
        }

        let epochs = self.epochs();
        let page = self.repository.find_many(options).await?;

        self.remember_all(&page.data, Some(epochs.entity));
        self.store_query(key, serialize_page(&page), epochs.query);

        Ok(page)
    }

    async fn find_all(&self) -> Result<Vec<T>> {
        let key = self.query_key(FIND_ALL, &Value::Null);

        if let Some(value) = self.cached_query(key.as_deref()) {
            match deserialize_entities(value) {
                Ok(entities) => return Ok(entities),
                Err(err) => {
                    tracing::warn!(collection = %self.collection, error = %err, "Cached findAll deserialization failed")
                }
            }
        }

        let epochs = self.epochs();
        let entities = self.repository.find_all().await?;
        self.store_query(key, serialize_entities(&entities), epochs.query);

        Ok(entities)
    }

    async fn count(&self, options: Option<&QueryOptions>) -> Result<u64> {
        let key = self.query_key(COUNT, &options);

        if let Some(value) = self.cached_query(key.as_deref()) {
            match deserialize_count(value) {
                Ok(count) => return Ok(count),
                Err(err) => {
                    tracing::warn!(collection = %self.collection, error = %err, "Cached count deserialization failed")
                }
            }
        }

        let epochs = self.epochs();
        let count = self.repository.count(options).await?;
        self.store_query(
            key,
            Ok::<_, std::convert::Infallible>(serialize_count(count)),
            epochs.query,
        );

        Ok(count)
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        // A cached entity proves existence; absence is never cached.
        if self
            .entity_cache
            .get(&self.collection, &id_params(id))
            .is_some()
        {
            return Ok(true);
        }

        self.repository.exists(id).await
    }

    async fn create(&self, data: T) -> Result<T> {
        // 1. Persist to storage
        let created = self.repository.create(data).await?;

        // 2. Populate cache with the stored entity (read-your-writes)
        self.mark_written();
        self.remember_all([&created], None);

        // 3. Any cached query of the collection may now be stale
        self.invalidate_queries();

        tracing::debug!(collection = %self.collection, id = ?created.id(), "Entity created");
        Ok(created)
    }

    async fn create_batch(&self, data: Vec<T>) -> Result<Vec<T>> {
        let created = self.repository.create_batch(data).await?;

        self.mark_written();
        self.remember_all(&created, None);
        self.invalidate_queries();

        tracing::debug!(collection = %self.collection, count = created.len(), "Entities created");
        Ok(created)
    }

    async fn update(&self, id: &str, patch: &Patch) -> Result<T> {
        // 1. Persist to storage
        let updated = self.repository.update(id, patch).await?;

        // 2. Repopulate cache with the post-write entity
        self.mark_written();
        self.remember(id, &updated, None);

        // 3. Invalidate collection queries
        self.invalidate_queries();

        tracing::debug!(collection = %self.collection, %id, "Entity updated");
        Ok(updated)
    }

    async fn update_batch(&self, updates: &[BatchUpdate]) -> Result<Vec<T>> {
        let updated = self.repository.update_batch(updates).await?;

        self.mark_written();
        self.remember_all(&updated, None);
        self.invalidate_queries();

        tracing::debug!(collection = %self.collection, count = updated.len(), "Entities updated");
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        // 1. Persist deletion to storage
        self.repository.delete(id).await?;

        // 2. Evict the entity and every collection query
        self.mark_written();
        self.forget(id);
        self.invalidate_queries();

        tracing::debug!(collection = %self.collection, %id, "Entity deleted");
        Ok(())
    }

    async fn delete_batch(&self, ids: &[String]) -> Result<()> {
        self.repository.delete_batch(ids).await?;

        self.mark_written();
        for id in ids {
            self.forget(id);
        }
        self.invalidate_queries();

        tracing::debug!(collection = %self.collection, count = ids.len(), "Entities deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::{Notify, RwLock};

    use lingocache_core::storage::{apply_patch, matches_filters, paginate, RepositoryError};
    use serde_json::json;

    use crate::test_support::{init_tracing, Flashcard};

    const COLLECTION: &str = "flashcards";

    fn store_error() -> RepositoryError {
        RepositoryError::ConnectionFailed("store unavailable".to_string())
    }

    // Mock repository that tracks calls, can be told to fail writes, and can park
    // reads after they captured the stored state
    #[derive(Default)]
    struct MockRepository {
        cards: RwLock<HashMap<String, Flashcard>>,
        find_by_id_calls: AtomicUsize,
        find_one_calls: AtomicUsize,
        find_many_calls: AtomicUsize,
        find_all_calls: AtomicUsize,
        count_calls: AtomicUsize,
        exists_calls: AtomicUsize,
        next_id: AtomicUsize,
        fail_writes: AtomicBool,
        gate_reads: AtomicBool,
        read_taken: Notify,
        read_gate: Notify,
    }

    impl MockRepository {
        async fn insert(&self, card: Flashcard) {
            let id = card.id.clone().expect("fixture cards have ids");
            self.cards.write().await.insert(id, card);
        }

        fn calls(counter: &AtomicUsize) -> usize {
            counter.load(Ordering::SeqCst)
        }

        fn check_writable(&self) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                Err(store_error())
            } else {
                Ok(())
            }
        }

        /// While `gate_reads` is set, signals `read_taken` and waits for `read_gate`.
        async fn pause_if_gated(&self) {
            if self.gate_reads.load(Ordering::SeqCst) {
                self.read_taken.notify_one();
                self.read_gate.notified().await;
            }
        }

        async fn sorted(&self) -> Vec<Flashcard> {
            let mut cards: Vec<Flashcard> = self.cards.read().await.values().cloned().collect();
            cards.sort_by(|a, b| a.id.cmp(&b.id));
            cards
        }

        async fn matching(&self, options: &QueryOptions) -> Vec<Flashcard> {
            self.sorted()
                .await
                .into_iter()
                .filter(|card| {
                    matches_filters(&serde_json::to_value(card).unwrap(), &options.filters)
                })
                .collect()
        }
    }

    #[async_trait]
    impl Repository<Flashcard> for MockRepository {
        async fn find_by_id(&self, id: &str) -> Result<Option<Flashcard>> {
            self.find_by_id_calls.fetch_add(1, Ordering::SeqCst);
            let card = self.cards.read().await.get(id).cloned();
            self.pause_if_gated().await;
            Ok(card)
        }

        async fn find_one(&self, options: &QueryOptions) -> Result<Option<Flashcard>> {
            self.find_one_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.matching(options).await.into_iter().next())
        }

        async fn find_many(&self, options: &QueryOptions) -> Result<Page<Flashcard>> {
            self.find_many_calls.fetch_add(1, Ordering::SeqCst);
            Ok(paginate(
                self.matching(options).await,
                options.offset,
                options.limit,
            ))
        }

        async fn find_all(&self) -> Result<Vec<Flashcard>> {
            self.find_all_calls.fetch_add(1, Ordering::SeqCst);
            let cards = self.sorted().await;
            self.pause_if_gated().await;
            Ok(cards)
        }

        async fn count(&self, options: Option<&QueryOptions>) -> Result<u64> {
            self.count_calls.fetch_add(1, Ordering::SeqCst);
            let count = match options {
                Some(options) => self.matching(options).await.len(),
                None => self.cards.read().await.len(),
            };
            Ok(count as u64)
        }

        async fn exists(&self, id: &str) -> Result<bool> {
            self.exists_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.cards.read().await.contains_key(id))
        }

        async fn create(&self, mut data: Flashcard) -> Result<Flashcard> {
            self.check_writable()?;
            let id = format!("gen-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
            data.set_id(id.clone());
            self.cards.write().await.insert(id, data.clone());
            Ok(data)
        }

        async fn create_batch(&self, data: Vec<Flashcard>) -> Result<Vec<Flashcard>> {
            self.check_writable()?;
            let mut created = Vec::with_capacity(data.len());
            for card in data {
                created.push(self.create(card).await?);
            }
            Ok(created)
        }

        async fn update(&self, id: &str, patch: &Patch) -> Result<Flashcard> {
            self.check_writable()?;
            let mut cards = self.cards.write().await;
            let current = cards.get(id).ok_or_else(|| RepositoryError::NotFound {
                entity_type: Flashcard::ENTITY_TYPE,
                id: id.to_string(),
            })?;
            let merged = apply_patch(&serde_json::to_value(current).unwrap(), patch)?;
            let updated: Flashcard = serde_json::from_value(merged).unwrap();
            cards.insert(id.to_string(), updated.clone());
            Ok(updated)
        }

        async fn update_batch(&self, updates: &[BatchUpdate]) -> Result<Vec<Flashcard>> {
            self.check_writable()?;
            let mut updated = Vec::with_capacity(updates.len());
            for update in updates {
                updated.push(self.update(&update.id, &update.patch).await?);
            }
            Ok(updated)
        }

        async fn delete(&self, id: &str) -> Result<()> {
            self.check_writable()?;
            self.cards.write().await.remove(id);
            Ok(())
        }

        async fn delete_batch(&self, ids: &[String]) -> Result<()> {
            self.check_writable()?;
            let mut cards = self.cards.write().await;
            for id in ids {
                cards.remove(id);
            }
            Ok(())
        }
    }

    struct Fixture {
        repo: Arc<MockRepository>,
        entity_cache: Arc<TtlCache>,
        query_cache: Arc<LruQueryCache>,
        cached: CachedRepository<Flashcard, MockRepository>,
    }

    async fn fixture(cards: Vec<Flashcard>) -> Fixture {
        init_tracing();

        let repo = Arc::new(MockRepository::default());
        for card in cards {
            repo.insert(card).await;
        }
        let entity_cache = Arc::new(TtlCache::new(100, Duration::from_secs(300)));
        let query_cache = Arc::new(LruQueryCache::new(100, Duration::from_secs(300)));
        let cached = CachedRepository::new(
            COLLECTION,
            repo.clone(),
            entity_cache.clone(),
            query_cache.clone(),
        );

        Fixture {
            repo,
            entity_cache,
            query_cache,
            cached,
        }
    }

    fn hund() -> Flashcard {
        Flashcard::new("german", "der Hund", "the dog").with_id("42")
    }

    fn katze() -> Flashcard {
        Flashcard::new("german", "die Katze", "the cat").with_id("43")
    }

    fn patch(value: Value) -> Patch {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_find_by_id_cache_miss_then_hit() {
        let f = fixture(vec![hund()]).await;

        // First call - should hit repository
        let first = f.cached.find_by_id("42").await.unwrap();
        assert_eq!(first, Some(hund()));
        assert_eq!(MockRepository::calls(&f.repo.find_by_id_calls), 1);

        // Second call - should hit cache
        let second = f.cached.find_by_id("42").await.unwrap();
        assert_eq!(second, Some(hund()));
        assert_eq!(MockRepository::calls(&f.repo.find_by_id_calls), 1);
    }

    #[tokio::test]
    async fn test_find_by_id_not_found_is_not_cached() {
        let f = fixture(vec![]).await;

        assert_eq!(f.cached.find_by_id("404").await.unwrap(), None);
        assert_eq!(f.cached.find_by_id("404").await.unwrap(), None);

        assert_eq!(MockRepository::calls(&f.repo.find_by_id_calls), 2);
        assert!(f.entity_cache.is_empty());
    }

    #[tokio::test]
    async fn test_update_read_your_writes() {
        let f = fixture(vec![hund()]).await;

        let updated = f
            .cached
            .update("42", &patch(json!({ "back": "the hound" })))
            .await
            .unwrap();
        assert_eq!(updated.back, "the hound");

        let read = f.cached.find_by_id("42").await.unwrap().unwrap();
        assert_eq!(read.back, "the hound");
        assert_eq!(read.front, "der Hund");
        assert_eq!(MockRepository::calls(&f.repo.find_by_id_calls), 0);
    }

    #[tokio::test]
    async fn test_failed_update_leaves_cache_untouched() {
        let f = fixture(vec![hund()]).await;
        f.cached.find_by_id("42").await.unwrap();
        f.cached.find_all().await.unwrap();

        f.repo.fail_writes.store(true, Ordering::SeqCst);
        let err = f
            .cached
            .update("42", &patch(json!({ "back": "the hound" })))
            .await
            .unwrap_err();

        // Error is propagated unchanged
        assert_eq!(err, store_error());

        // Entity and query caches still serve the pre-update values
        let read = f.cached.find_by_id("42").await.unwrap().unwrap();
        assert_eq!(read.back, "the dog");
        assert_eq!(MockRepository::calls(&f.repo.find_by_id_calls), 1);

        f.cached.find_all().await.unwrap();
        assert_eq!(MockRepository::calls(&f.repo.find_all_calls), 1);
    }

    /// Caches entity 42, `find_all` and `count`, then makes every write fail.
    async fn failing_fixture() -> Fixture {
        let f = fixture(vec![hund()]).await;
        f.cached.find_by_id("42").await.unwrap();
        f.cached.find_all().await.unwrap();
        f.cached.count(None).await.unwrap();
        f.repo.fail_writes.store(true, Ordering::SeqCst);
        f
    }

    async fn assert_caches_untouched(f: &Fixture) {
        assert_eq!(f.cached.find_all().await.unwrap(), vec![hund()]);
        assert_eq!(f.cached.count(None).await.unwrap(), 1);
        assert_eq!(f.cached.find_by_id("42").await.unwrap(), Some(hund()));

        assert_eq!(MockRepository::calls(&f.repo.find_all_calls), 1);
        assert_eq!(MockRepository::calls(&f.repo.count_calls), 1);
        assert_eq!(MockRepository::calls(&f.repo.find_by_id_calls), 1);
        assert_eq!(f.entity_cache.len(), 1);
        assert_eq!(f.query_cache.size(), 2);
    }

    #[tokio::test]
    async fn test_failed_create_leaves_cache_untouched() {
        let f = failing_fixture().await;

        let err = f
            .cached
            .create(Flashcard::new("german", "das Haus", "the house"))
            .await
            .unwrap_err();

        assert_eq!(err, store_error());
        assert_caches_untouched(&f).await;
    }

    #[tokio::test]
    async fn test_failed_create_batch_leaves_cache_untouched() {
        let f = failing_fixture().await;

        let err = f
            .cached
            .create_batch(vec![
                Flashcard::new("german", "das Haus", "the house"),
                Flashcard::new("german", "der Baum", "the tree"),
            ])
            .await
            .unwrap_err();

        assert_eq!(err, store_error());
        assert_caches_untouched(&f).await;
    }

    #[tokio::test]
    async fn test_failed_update_batch_leaves_cache_untouched() {
        let f = failing_fixture().await;

        let err = f
            .cached
            .update_batch(&[BatchUpdate::new("42", patch(json!({ "back": "the hound" })))])
            .await
            .unwrap_err();

        assert_eq!(err, store_error());
        assert_caches_untouched(&f).await;
    }

    #[tokio::test]
    async fn test_failed_delete_batch_leaves_cache_untouched() {
        let f = failing_fixture().await;

        let err = f
            .cached
            .delete_batch(&["42".to_string()])
            .await
            .unwrap_err();

        assert_eq!(err, store_error());
        assert_caches_untouched(&f).await;
    }

    #[tokio::test]
    async fn test_failed_delete_leaves_cache_untouched() {
        let f = fixture(vec![hund()]).await;
        f.cached.find_by_id("42").await.unwrap();

        f.repo.fail_writes.store(true, Ordering::SeqCst);
        assert!(f.cached.delete("42").await.is_err());

        assert!(f.cached.find_by_id("42").await.unwrap().is_some());
        assert_eq!(MockRepository::calls(&f.repo.find_by_id_calls), 1);
    }

    #[tokio::test]
    async fn test_create_invalidates_collection_queries() {
        let f = fixture(vec![hund()]).await;

        assert_eq!(f.cached.find_all().await.unwrap().len(), 1);
        assert_eq!(f.cached.count(None).await.unwrap(), 1);
        f.cached.find_all().await.unwrap();
        f.cached.count(None).await.unwrap();
        assert_eq!(MockRepository::calls(&f.repo.find_all_calls), 1);
        assert_eq!(MockRepository::calls(&f.repo.count_calls), 1);

        let created = f
            .cached
            .create(Flashcard::new("german", "das Haus", "the house"))
            .await
            .unwrap();

        assert_eq!(f.cached.find_all().await.unwrap().len(), 2);
        assert_eq!(f.cached.count(None).await.unwrap(), 2);
        assert_eq!(MockRepository::calls(&f.repo.find_all_calls), 2);
        assert_eq!(MockRepository::calls(&f.repo.count_calls), 2);

        // The created entity is readable without a store round trip
        let id = created.id.unwrap();
        assert!(f.cached.find_by_id(&id).await.unwrap().is_some());
        assert_eq!(MockRepository::calls(&f.repo.find_by_id_calls), 0);
    }

    #[tokio::test]
    async fn test_writes_leave_other_collections_alone() {
        let f = fixture(vec![hund()]).await;
        f.query_cache.set(&query_key("decks", FIND_ALL, &Value::Null), json!([]));
        f.query_cache.set(
            &query_key("flashcards_archive", FIND_ALL, &Value::Null),
            json!([]),
        );

        f.cached.delete("42").await.unwrap();

        assert_eq!(f.query_cache.size(), 2);
    }

    #[tokio::test]
    async fn test_writes_spare_collection_named_with_separator() {
        let f = fixture(vec![hund()]).await;
        let archive = CachedRepository::<Flashcard, _>::new(
            "flashcards:archive",
            f.repo.clone(),
            f.entity_cache.clone(),
            f.query_cache.clone(),
        );
        archive.find_by_id("42").await.unwrap();
        archive.find_all().await.unwrap();

        f.cached
            .create(Flashcard::new("german", "das Haus", "the house"))
            .await
            .unwrap();
        f.cached.invalidate_collection();

        assert_eq!(archive.find_by_id("42").await.unwrap(), Some(hund()));
        assert_eq!(archive.find_all().await.unwrap(), vec![hund()]);
        assert_eq!(MockRepository::calls(&f.repo.find_by_id_calls), 1);
        assert_eq!(MockRepository::calls(&f.repo.find_all_calls), 1);
    }

    #[tokio::test]
    async fn test_zero_count_is_cached() {
        let f = fixture(vec![]).await;

        assert_eq!(f.cached.count(None).await.unwrap(), 0);
        assert_eq!(f.cached.count(None).await.unwrap(), 0);

        assert_eq!(MockRepository::calls(&f.repo.count_calls), 1);
    }

    #[tokio::test]
    async fn test_count_options_are_part_of_the_key() {
        let f = fixture(vec![hund(), katze().with_level(2)]).await;
        let advanced = QueryOptions::new().filter(lingocache_core::storage::Filter::new(
            "level",
            lingocache_core::storage::FilterOp::Gte,
            2,
        ));

        assert_eq!(f.cached.count(None).await.unwrap(), 2);
        assert_eq!(f.cached.count(Some(&advanced)).await.unwrap(), 1);
        assert_eq!(f.cached.count(Some(&advanced)).await.unwrap(), 1);

        assert_eq!(MockRepository::calls(&f.repo.count_calls), 2);
    }

    #[tokio::test]
    async fn test_find_many_seeds_entity_cache() {
        let f = fixture(vec![hund(), katze()]).await;
        let options = QueryOptions::new().where_eq("deck", "german").limit(10);

        let page = f.cached.find_many(&options).await.unwrap();
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.total, 2);

        assert_eq!(f.cached.find_by_id("43").await.unwrap(), Some(katze()));
        assert_eq!(MockRepository::calls(&f.repo.find_by_id_calls), 0);

        // Same options are served from the query cache
        let again = f.cached.find_many(&options).await.unwrap();
        assert_eq!(again, page);
        assert_eq!(MockRepository::calls(&f.repo.find_many_calls), 1);
    }

    #[tokio::test]
    async fn test_find_one_caches_only_matches() {
        let f = fixture(vec![hund()]).await;
        let dog = QueryOptions::new().where_eq("front", "der Hund");
        let cat = QueryOptions::new().where_eq("front", "die Katze");

        assert_eq!(f.cached.find_one(&dog).await.unwrap(), Some(hund()));
        assert_eq!(f.cached.find_one(&dog).await.unwrap(), Some(hund()));
        assert_eq!(f.cached.find_one(&cat).await.unwrap(), None);
        assert_eq!(f.cached.find_one(&cat).await.unwrap(), None);

        assert_eq!(MockRepository::calls(&f.repo.find_one_calls), 3);
    }

    #[tokio::test]
    async fn test_exists_uses_entity_cache() {
        let f = fixture(vec![hund()]).await;

        // Miss defers to the repository
        assert!(f.cached.exists("42").await.unwrap());
        assert_eq!(MockRepository::calls(&f.repo.exists_calls), 1);

        // Hit answers without the repository
        f.cached.find_by_id("42").await.unwrap();
        assert!(f.cached.exists("42").await.unwrap());
        assert_eq!(MockRepository::calls(&f.repo.exists_calls), 1);

        // Absence is never cached
        assert!(!f.cached.exists("404").await.unwrap());
        assert!(!f.cached.exists("404").await.unwrap());
        assert_eq!(MockRepository::calls(&f.repo.exists_calls), 3);
    }

    #[tokio::test]
    async fn test_delete_evicts_entity() {
        let f = fixture(vec![hund()]).await;
        f.cached.find_by_id("42").await.unwrap();

        f.cached.delete("42").await.unwrap();

        assert_eq!(f.cached.find_by_id("42").await.unwrap(), None);
        assert_eq!(MockRepository::calls(&f.repo.find_by_id_calls), 2);
    }

    #[tokio::test]
    async fn test_batch_writes() {
        let f = fixture(vec![]).await;

        let created = f
            .cached
            .create_batch(vec![
                Flashcard::new("spanish", "el perro", "the dog"),
                Flashcard::new("spanish", "el gato", "the cat"),
            ])
            .await
            .unwrap();
        let ids: Vec<String> = created.iter().filter_map(|c| c.id.clone()).collect();
        assert_eq!(f.entity_cache.len(), 2);

        f.cached.count(None).await.unwrap();
        let updates: Vec<BatchUpdate> = ids
            .iter()
            .map(|id| BatchUpdate::new(id.clone(), patch(json!({ "level": 1 }))))
            .collect();
        f.cached.update_batch(&updates).await.unwrap();

        for id in &ids {
            assert_eq!(f.cached.find_by_id(id).await.unwrap().unwrap().level, 1);
        }
        assert_eq!(MockRepository::calls(&f.repo.find_by_id_calls), 0);
        assert_eq!(f.query_cache.size(), 0);

        f.cached.delete_batch(&ids).await.unwrap();
        assert!(f.entity_cache.is_empty());
        assert_eq!(f.cached.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_collection() {
        let f = fixture(vec![hund()]).await;
        f.cached.find_by_id("42").await.unwrap();
        f.cached.find_all().await.unwrap();

        f.cached.invalidate_collection();

        assert!(f.entity_cache.is_empty());
        assert_eq!(f.query_cache.size(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_cached_entity_is_a_miss() {
        let f = fixture(vec![hund()]).await;
        f.entity_cache.set(
            COLLECTION,
            &id_params("42"),
            json!("not a flashcard"),
            Duration::from_secs(60),
        );

        assert_eq!(f.cached.find_by_id("42").await.unwrap(), Some(hund()));
        assert_eq!(MockRepository::calls(&f.repo.find_by_id_calls), 1);
    }

    #[tokio::test]
    async fn test_read_racing_update_does_not_cache_stale_entity() {
        let f = fixture(vec![hund()]).await;
        let cached = Arc::new(f.cached);
        f.repo.gate_reads.store(true, Ordering::SeqCst);

        let reader = {
            let cached = cached.clone();
            tokio::spawn(async move { cached.find_by_id("42").await })
        };
        // The reader has captured "the dog" and is parked inside the store
        f.repo.read_taken.notified().await;
        f.repo.gate_reads.store(false, Ordering::SeqCst);

        cached
            .update("42", &patch(json!({ "back": "the hound" })))
            .await
            .unwrap();
        f.repo.read_gate.notify_one();

        let raced = reader.await.unwrap().unwrap().unwrap();
        assert_eq!(raced.back, "the dog");

        let read = cached.find_by_id("42").await.unwrap().unwrap();
        assert_eq!(read.back, "the hound");
        assert_eq!(MockRepository::calls(&f.repo.find_by_id_calls), 1);
    }

    #[tokio::test]
    async fn test_read_racing_create_does_not_cache_stale_query() {
        let f = fixture(vec![hund()]).await;
        let cached = Arc::new(f.cached);
        f.repo.gate_reads.store(true, Ordering::SeqCst);

        let reader = {
            let cached = cached.clone();
            tokio::spawn(async move { cached.find_all().await })
        };
        f.repo.read_taken.notified().await;
        f.repo.gate_reads.store(false, Ordering::SeqCst);

        cached
            .create(Flashcard::new("german", "das Haus", "the house"))
            .await
            .unwrap();
        f.repo.read_gate.notify_one();

        assert_eq!(reader.await.unwrap().unwrap().len(), 1);
        assert_eq!(f.query_cache.size(), 0);

        assert_eq!(cached.find_all().await.unwrap().len(), 2);
        assert_eq!(MockRepository::calls(&f.repo.find_all_calls), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reads_share_the_cache() {
        let f = fixture(vec![hund(), katze()]).await;
        let cached = Arc::new(f.cached);
        f.entity_cache.set(
            COLLECTION,
            &id_params("42"),
            serialize_entity(&hund()).unwrap(),
            Duration::from_secs(60),
        );

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cached = cached.clone();
                tokio::spawn(async move { cached.find_by_id("42").await })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), Some(hund()));
        }

        assert_eq!(MockRepository::calls(&f.repo.find_by_id_calls), 0);
    }
}
