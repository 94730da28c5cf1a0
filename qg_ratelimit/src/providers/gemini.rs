//! Gemini rate limit presets
//!
//! Google enforces requests per minute and requests per day per project.

use qg_types::RequestType;

use crate::config::BackoffConfig;
use crate::config::RateLimiterConfig;

/// Free tier: 15 requests per minute, 1,500 per day
pub fn free_tier() -> RateLimiterConfig {
    RateLimiterConfig {
        name: "gemini/free".to_string(),
        calls_per_minute: 15,
        daily_quota: Some(1_500),
        min_request_interval_seconds: 1.0,
        daily_token_limit: Some(1_000_000),
        default_batch_size: 3,
        ..Default::default()
    }
}

pub fn pay_as_you_go() -> RateLimiterConfig {
    RateLimiterConfig {
        name: "gemini/tier1".to_string(),
        calls_per_minute: 1_000,
        calls_per_hour: Some(30_000),
        backoff: BackoffConfig::aggressive(),
        default_batch_size: 10,
        ..Default::default()
    }
}

/// Free tier limits without vision, leaving headroom for other projects
pub fn conservative() -> RateLimiterConfig {
    RateLimiterConfig {
        name: "gemini/conservative".to_string(),
        calls_per_minute: 10,
        daily_quota: Some(1_000),
        min_request_interval_seconds: 2.0,
        enabled_request_types: vec![RequestType::Text, RequestType::Streaming, RequestType::FunctionCalling],
        daily_token_limit: Some(600_000),
        default_batch_size: 3,
        backoff: BackoffConfig::conservative(),
        ..Default::default()
    }
}
