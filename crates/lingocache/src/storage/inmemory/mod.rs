//! In-memory storage backend for testing.
//!
//! This module provides an in-memory implementation of `Repository<T>` that keeps
//! entities in a `BTreeMap` keyed by id and wrapped in `Arc<RwLock<_>>`. This is
//! useful for tests and local development where persistence is not required.
//!
//! # Example
//!
//! ```rust,ignore
//! use lingocache::storage::inmemory::InMemoryRepository;
//!
//! let repo = InMemoryRepository::<Flashcard>::new();
//! // Use repo for testing...
//! ```

mod repository;

pub use repository::InMemoryRepository;
