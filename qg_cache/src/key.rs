use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::error::Result;

/// Fields that differ between otherwise identical requests
pub const DEFAULT_EXCLUDED_FIELDS: &[&str] = &["timestamp", "request_id", "id", "created_at", "nonce"];

/// Identity of a cached response
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Stable key for a set of request parameters
    ///
    /// Object keys are serialized in sorted order and `excluded_fields` are
    /// dropped at every depth, so two requests that differ only in ordering
    /// or in excluded fields share a key.
    pub fn from_params(params: &Value, excluded_fields: &[&str]) -> Result<Self> {
        let normalized = strip_fields(params, excluded_fields);
        let bytes = serde_json::to_vec(&normalized)?;
        Ok(Self(format!("{:016x}", rapidhash::v3::rapidhash_v3(&bytes))))
    }

    /// `from_params` with the default exclusions
    pub fn from_request(params: &Value) -> Result<Self> {
        Self::from_params(params, DEFAULT_EXCLUDED_FIELDS)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn strip_fields(value: &Value, excluded: &[&str]) -> Value {
    match value {
        Value::Object(map) => {
            // Sort here rather than rely on `Map` ordering, which `preserve_order` changes
            let sorted: BTreeMap<&String, Value> = map.iter().filter(|(k, _)| !excluded.contains(&k.as_str())).map(|(k, v)| (k, strip_fields(v, excluded))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| strip_fields(v, excluded)).collect()),
        other => other.clone(),
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
