//! Pure building blocks for the lingocache caching layer.
//!
//! Everything in this crate is synchronous and free of I/O: key derivation,
//! cache value serialization, the repository contract, metric aggregation and
//! the health rules. The stateful caches, decorators and background tasks live
//! in the `lingocache` crate.

pub mod cache;
pub mod health;
pub mod metrics;
pub mod storage;
