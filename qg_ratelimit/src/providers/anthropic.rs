//! Anthropic rate limit presets
//!
//! Limits are per build tier and apply per model class. Daily token limits
//! stand in for the monthly spend ceiling.

use qg_types::RequestType;

use crate::config::BackoffConfig;
use crate::config::RateLimiterConfig;

/// Free evaluation access
pub fn free_tier() -> RateLimiterConfig {
    RateLimiterConfig {
        name: "anthropic/free".to_string(),
        calls_per_minute: 5,
        daily_quota: Some(300),
        enabled_request_types: vec![RequestType::Text, RequestType::Streaming],
        daily_token_limit: Some(300_000),
        default_batch_size: 1,
        backoff: BackoffConfig::conservative(),
        ..Default::default()
    }
}

/// Build tier 1
pub fn build_tier1() -> RateLimiterConfig {
    RateLimiterConfig {
        name: "anthropic/tier1".to_string(),
        calls_per_minute: 50,
        calls_per_hour: Some(2_000),
        daily_token_limit: Some(40_000_000),
        ..Default::default()
    }
}

pub fn conservative() -> RateLimiterConfig {
    RateLimiterConfig {
        name: "anthropic/conservative".to_string(),
        calls_per_minute: 30,
        calls_per_hour: Some(1_200),
        min_request_interval_seconds: 0.5,
        daily_token_limit: Some(25_000_000),
        default_batch_size: 3,
        backoff: BackoffConfig::conservative(),
        ..Default::default()
    }
}
