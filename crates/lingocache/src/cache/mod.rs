//! Cache implementations.
//!
//! Both caches are synchronous and in-memory: every operation completes under a
//! single mutex without awaiting, so they can be called from async code without
//! holding a lock across a suspension point.

pub mod memory;

pub use memory::{LruQueryCache, TtlCache, MIN_SWEEP_INTERVAL};
