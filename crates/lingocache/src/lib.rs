//! In-process caching layer for the dashboard's repositories.
//!
//! - [`cache::memory`]: the key-value [`TtlCache`](cache::memory::TtlCache) and the
//!   [`LruQueryCache`](cache::memory::LruQueryCache)
//! - [`storage::cached`]: [`CachedRepository`](storage::cached::CachedRepository), the
//!   read-through / write-invalidate decorator over any `Repository<T>`
//! - [`monitor`]: opt-in operation timing
//! - [`diagnostics`]: stats and health reporting over all of the above
//! - [`layer`]: the explicitly owned bundle a host process constructs at startup

pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod layer;
pub mod monitor;
pub mod storage;

mod sync;

#[cfg(test)]
pub(crate) mod test_support;
