use qg_cache::CacheError;
use qg_ratelimit::RateLimitError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Unknown preset {tier} for provider {provider}")]
    UnknownPreset { provider: String, tier: String },

    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
