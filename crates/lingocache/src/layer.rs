//! The caches and monitor a host process owns for its whole lifetime.
//!
//! Construct one [`CacheLayer`] at startup, hand clones of it (or of its parts)
//! to whatever needs caching, and call [`CacheLayer::shutdown`] on the way out.

use std::sync::Arc;

use lingocache_core::storage::{Entity, Repository};

use crate::cache::{LruQueryCache, TtlCache};
use crate::config::Config;
use crate::diagnostics::CacheDiagnostics;
use crate::monitor::PerformanceMonitor;
use crate::storage::{CachedRepository, MonitoredRepository};

/// Shared caching state, cheap to clone.
#[derive(Debug, Clone)]
pub struct CacheLayer {
    config: Config,
    entity_cache: Arc<TtlCache>,
    query_cache: Arc<LruQueryCache>,
    monitor: Arc<PerformanceMonitor>,
}

impl CacheLayer {
    pub fn new(config: Config) -> Self {
        let entity_cache = Arc::new(TtlCache::new(
            config.cache_max_size,
            config.cache_default_ttl(),
        ));
        let query_cache = Arc::new(LruQueryCache::new(
            config.query_cache_max_entries,
            config.query_cache_ttl(),
        ));
        let monitor = Arc::new(PerformanceMonitor::new(
            config.slow_query_threshold(),
            config.performance_max_metrics,
        ));

        tracing::debug!(
            cache_max_size = config.cache_max_size,
            query_cache_max_entries = config.query_cache_max_entries,
            slow_query_threshold_ms = config.slow_query_threshold_ms,
            "Cache layer created"
        );

        Self {
            config,
            entity_cache,
            query_cache,
            monitor,
        }
    }

    /// Starts the background sweeper. Must run inside a Tokio runtime.
    pub fn start(&self) {
        let interval = self.config.cache_cleanup_interval();
        self.entity_cache.spawn_sweeper(interval);
        tracing::info!(interval_secs = interval.as_secs(), "Cache layer started");
    }

    /// Stops the sweeper and empties both caches.
    pub fn shutdown(&self) {
        self.entity_cache.destroy();
        self.query_cache.clear();
        tracing::info!("Cache layer shut down");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn entity_cache(&self) -> &Arc<TtlCache> {
        &self.entity_cache
    }

    pub fn query_cache(&self) -> &Arc<LruQueryCache> {
        &self.query_cache
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    /// Wraps `repository` in a [`CachedRepository`] backed by this layer's caches.
    ///
    /// Entities are cached for the configured default TTL.
    pub fn repository<T, R>(
        &self,
        collection: impl Into<String>,
        repository: Arc<R>,
    ) -> CachedRepository<T, R>
    where
        T: Entity,
        R: Repository<T>,
    {
        CachedRepository::new(
            collection,
            repository,
            self.entity_cache.clone(),
            self.query_cache.clone(),
        )
        .with_entity_ttl(self.config.cache_default_ttl())
    }

    /// Wraps `repository` in a [`MonitoredRepository`] recording into this layer's monitor.
    pub fn monitored<T, R>(
        &self,
        collection: impl Into<String>,
        repository: Arc<R>,
    ) -> MonitoredRepository<T, R>
    where
        T: Entity,
        R: Repository<T>,
    {
        MonitoredRepository::new(collection, repository, self.monitor.clone())
    }

    pub fn diagnostics(&self) -> CacheDiagnostics {
        CacheDiagnostics::new(
            self.entity_cache.clone(),
            self.query_cache.clone(),
            self.monitor.clone(),
        )
        .with_thresholds(self.config.health)
    }
}

#[cfg(all(test, feature = "inmemory"))]
mod tests {
    use super::*;
    use std::time::Duration;

    use lingocache_core::cache::id_params;
    use lingocache_core::health::HealthStatus;
    use serde_json::json;

    use crate::storage::InMemoryRepository;
    use crate::test_support::{init_tracing, Flashcard};

    fn layer() -> CacheLayer {
        init_tracing();
        CacheLayer::new(Config {
            cache_max_size: 2,
            cache_cleanup_interval_seconds: 1,
            ..Config::defaults()
        })
    }

    #[tokio::test]
    async fn test_repositories_share_caches() -> anyhow::Result<()> {
        let layer = layer();
        let store = Arc::new(InMemoryRepository::<Flashcard>::new());
        let writer = layer.repository::<Flashcard, _>("flashcards", store.clone());
        let reader = layer.repository::<Flashcard, _>("flashcards", store);

        reader.find_all().await?;
        assert_eq!(layer.query_cache().size(), 1);

        let card = writer
            .create(Flashcard::new("german", "der Hund", "the dog"))
            .await?;

        // The writer's invalidation is visible to the reader
        assert_eq!(layer.query_cache().size(), 0);
        assert_eq!(reader.find_all().await?, vec![card]);

        Ok(())
    }

    #[tokio::test]
    async fn test_monitored_cached_repository() -> anyhow::Result<()> {
        let layer = layer();
        let cached = layer.repository::<Flashcard, _>(
            "flashcards",
            Arc::new(InMemoryRepository::<Flashcard>::new()),
        );
        let repo = layer.monitored::<Flashcard, _>("flashcards", Arc::new(cached));

        repo.count(None).await?;
        repo.count(None).await?;

        assert_eq!(layer.monitor().metrics().total_queries, 2);
        assert_eq!(layer.query_cache().stats().hits, 1);

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_shutdown() {
        let layer = layer();
        layer.start();
        assert!(layer.entity_cache().is_sweeping());

        layer
            .entity_cache()
            .set("flashcards", &json!({ "id": "1" }), json!({}), Duration::from_millis(500));
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert!(layer.entity_cache().is_empty());

        layer.query_cache().set("flashcards:findAll:null", json!([]));
        layer.shutdown();
        tokio::task::yield_now().await;

        assert!(!layer.entity_cache().is_sweeping());
        assert_eq!(layer.query_cache().size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_cleanup_interval_still_sweeps() {
        init_tracing();
        let layer = CacheLayer::new(Config::from_lookup(|key| {
            (key == "CACHE_CLEANUP_INTERVAL_SECONDS").then(|| "0".to_string())
        }));
        layer.start();

        layer
            .entity_cache()
            .set("flashcards", &id_params("1"), json!({}), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(layer.entity_cache().is_sweeping());
        assert!(layer.entity_cache().is_empty());
        layer.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_repository_uses_configured_entity_ttl() -> anyhow::Result<()> {
        init_tracing();
        let layer = CacheLayer::new(Config {
            cache_default_ttl_seconds: 5,
            ..Config::defaults()
        });
        let repo = layer.repository::<Flashcard, _>(
            "flashcards",
            Arc::new(InMemoryRepository::<Flashcard>::new()),
        );
        assert_eq!(repo.entity_ttl(), Duration::from_secs(5));

        let card = repo
            .create(Flashcard::new("german", "der Hund", "the dog"))
            .await?;
        let params = id_params(card.id.as_deref().unwrap_or_default());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(layer.entity_cache().get("flashcards", &params).is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(layer.entity_cache().get("flashcards", &params).is_none());

        Ok(())
    }

    #[test]
    fn test_diagnostics_use_configured_limits() {
        let layer = layer();

        let report = layer.diagnostics().all_stats();

        assert_eq!(report.entity_cache.max_size, 2);
        assert_eq!(report.query_cache.max_entries, 500);
        assert_eq!(
            layer.diagnostics().analyze_cache_health().status,
            HealthStatus::Healthy
        );
    }
}
