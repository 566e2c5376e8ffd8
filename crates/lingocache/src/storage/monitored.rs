//! Timing decorator for repositories.
//!
//! Wraps any `Repository<T>`, cached or not, and records one sample per call in a
//! shared [`PerformanceMonitor`]. Failed calls are recorded too.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use lingocache_core::storage::{
    BatchUpdate, Entity, Page, Patch, QueryOptions, Repository, Result,
};

use crate::monitor::PerformanceMonitor;

/// Repository decorator that times every call of the inner repository.
pub struct MonitoredRepository<T, R>
where
    T: Entity,
    R: Repository<T>,
{
    collection: String,
    repository: Arc<R>,
    monitor: Arc<PerformanceMonitor>,
    _entity: PhantomData<fn() -> T>,
}

impl<T, R> MonitoredRepository<T, R>
where
    T: Entity,
    R: Repository<T>,
{
    pub fn new(
        collection: impl Into<String>,
        repository: Arc<R>,
        monitor: Arc<PerformanceMonitor>,
    ) -> Self {
        Self {
            collection: collection.into(),
            repository,
            monitor,
            _entity: PhantomData,
        }
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    fn options(options: &QueryOptions) -> Option<Value> {
        serde_json::to_value(options).ok()
    }
}

#[async_trait]
impl<T, R> Repository<T> for MonitoredRepository<T, R>
where
    T: Entity,
    R: Repository<T> + 'static,
{
    async fn find_by_id(&self, id: &str) -> Result<Option<T>> {
        self.monitor
            .measure(
                &self.collection,
                "findById",
                Some(json!({ "id": id })),
                self.repository.find_by_id(id),
            )
            .await
    }

    async fn find_one(&self, options: &QueryOptions) -> Result<Option<T>> {
        self.monitor
            .measure(
                &self.collection,
                "findOne",
                Self::options(options),
                self.repository.find_one(options),
            )
            .await
    }

    async fn find_many(&self, options: &QueryOptions) -> Result<Page<T>> {
        self.monitor
            .measure(
                &self.collection,
                "findMany",
                Self::options(options),
                self.repository.find_many(options),
            )
            .await
    }

    async fn find_all(&self) -> Result<Vec<T>> {
        self.monitor
            .measure(&self.collection, "findAll", None, self.repository.find_all())
            .await
    }

    async fn count(&self, options: Option<&QueryOptions>) -> Result<u64> {
        self.monitor
            .measure(
                &self.collection,
                "count",
                options.and_then(Self::options),
                self.repository.count(options),
            )
            .await
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        self.monitor
            .measure(
                &self.collection,
                "exists",
                Some(json!({ "id": id })),
                self.repository.exists(id),
            )
            .await
    }

    async fn create(&self, data: T) -> Result<T> {
        self.monitor
            .measure(&self.collection, "create", None, self.repository.create(data))
            .await
    }

    async fn create_batch(&self, data: Vec<T>) -> Result<Vec<T>> {
        let params = json!({ "count": data.len() });
        self.monitor
            .measure(
                &self.collection,
                "createBatch",
                Some(params),
                self.repository.create_batch(data),
            )
            .await
    }

    async fn update(&self, id: &str, patch: &Patch) -> Result<T> {
        self.monitor
            .measure(
                &self.collection,
                "update",
                Some(json!({ "id": id })),
                self.repository.update(id, patch),
            )
            .await
    }

    async fn update_batch(&self, updates: &[BatchUpdate]) -> Result<Vec<T>> {
        self.monitor
            .measure(
                &self.collection,
                "updateBatch",
                Some(json!({ "count": updates.len() })),
                self.repository.update_batch(updates),
            )
            .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.monitor
            .measure(
                &self.collection,
                "delete",
                Some(json!({ "id": id })),
                self.repository.delete(id),
            )
            .await
    }

    async fn delete_batch(&self, ids: &[String]) -> Result<()> {
        self.monitor
            .measure(
                &self.collection,
                "deleteBatch",
                Some(json!({ "count": ids.len() })),
                self.repository.delete_batch(ids),
            )
            .await
    }
}
