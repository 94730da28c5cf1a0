use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::error::CacheError;
use crate::error::Result;

/// Capacity and default lifetime of a `ResponseCache`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries kept before the least recently used one is evicted
    pub max_size: usize,

    /// TTL applied by `set_default`
    pub default_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_size: 1_000, default_ttl_seconds: 3_600 }
    }
}

impl CacheConfig {
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self { max_size, default_ttl_seconds: default_ttl.as_secs() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(CacheError::InvalidConfig("max_size must be greater than 0".to_string()));
        }
        if self.default_ttl_seconds == 0 {
            return Err(CacheError::InvalidConfig("default_ttl_seconds must be greater than 0".to_string()));
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }
}
