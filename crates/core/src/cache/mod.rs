mod error;
mod keys;
mod serialization;
mod stats;
mod ttl;

pub use error::{CacheError, Result};
pub use keys::{
    canonical_json, collection_pattern, collection_prefix, entity_key, id_params, query_key,
};
pub use serialization::{
    deserialize_count, deserialize_entities, deserialize_entity, deserialize_page,
    serialize_count, serialize_entities, serialize_entity, serialize_page, SerializationError,
};
pub use stats::{hit_rate, CacheStats, QueryCacheStats};
pub use ttl::TtlPreset;
