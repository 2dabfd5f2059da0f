//! Namespaced cache facade over a network key-value store.
//!
//! Values are bucketed into named categories, each with its own TTL,
//! serialization format, compression flag, and namespace prefix. Every
//! operation on the store is fail-soft: a cache outage degrades
//! performance, never correctness.

pub mod codec;
pub mod config;
pub mod facade;
pub mod memo;

pub use config::{
    CategoryConfig, CategoryRegistry, EvictionIntent, SerializationFormat, DATABASE_QUERY,
    DEFAULT_CATEGORY, ENTITY_SCREENING, EXTERNAL_API_RESPONSE, FEATURE_FLAG, SESSION, TEMPLATE,
};
pub use facade::{CacheStats, CategoryUsage, RedisCache, SharedCache};
pub use memo::CachedOperation;
