//! In-memory cache backends.
//!
//! - [`TtlCache`]: `(collection, params)` keyed entities, per-entry TTL,
//!   insertion-order eviction and a periodic sweeper
//! - [`LruQueryCache`]: opaque query keys, cache-wide TTL, least-recently-used
//!   eviction and regex invalidation

mod query;
mod sweeper;
mod ttl;

pub use query::LruQueryCache;
pub use sweeper::MIN_SWEEP_INTERVAL;
pub use ttl::TtlCache;
