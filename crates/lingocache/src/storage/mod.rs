//! Repository decorators and backends.
//!
//! - [`cached`]: read-through / write-invalidate caching over any `Repository<T>`
//! - [`monitored`]: opt-in timing of every repository call
//! - `inmemory` (feature `inmemory`, default): a reference backend keeping
//!   entities in memory, used for tests and local development

pub mod cached;
pub mod monitored;

#[cfg(feature = "inmemory")]
pub mod inmemory;

pub use cached::CachedRepository;
pub use monitored::MonitoredRepository;

#[cfg(feature = "inmemory")]
pub use inmemory::InMemoryRepository;
