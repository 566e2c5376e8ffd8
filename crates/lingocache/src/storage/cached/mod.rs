//! Cached repository decorator.
//!
//! Wraps any `Repository<T>` with the cache-aside pattern:
//!
//! - **Reads**: check the caches first, on miss fetch from the repository and populate
//! - **Writes**: persist to the repository first; only on success update or evict the
//!   entity entry and drop every cached query of the collection
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let entities = Arc::new(TtlCache::new(1_000, Duration::from_secs(300)));
//! let queries = Arc::new(LruQueryCache::new(500, Duration::from_secs(300)));
//! let repo = Arc::new(InMemoryRepository::<Flashcard>::new());
//!
//! let flashcards = CachedRepository::new("flashcards", repo, entities, queries);
//! ```

mod repository;

pub use repository::CachedRepository;
