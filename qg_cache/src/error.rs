use thiserror::Error;

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to serialize request parameters: {0}")]
    KeySerialization(#[from] serde_json::Error),
}
