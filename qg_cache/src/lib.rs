//! In-memory LRU + TTL cache for provider responses

pub mod cache;
pub mod config;
pub mod error;
pub mod key;

pub use cache::CacheStats;
pub use cache::ResponseCache;
pub use config::CacheConfig;
pub use error::CacheError;
pub use error::Result;
pub use key::CacheKey;
pub use key::DEFAULT_EXCLUDED_FIELDS;
