//! OpenAI rate limit presets
//!
//! OpenAI enforces requests and tokens per minute per model, plus a daily
//! request cap on the free tier. Limits here leave headroom below the
//! published numbers.

use qg_types::RequestType;

use crate::config::BackoffConfig;
use crate::config::RateLimiterConfig;

/// Free tier: 3 requests per minute, 200 per day
pub fn free_tier() -> RateLimiterConfig {
    RateLimiterConfig {
        name: "openai/free".to_string(),
        calls_per_minute: 3,
        daily_quota: Some(200),
        min_request_interval_seconds: 20.0,
        enabled_request_types: vec![RequestType::Text, RequestType::Streaming],
        daily_token_limit: Some(200_000),
        default_batch_size: 1,
        backoff: BackoffConfig::conservative(),
        ..Default::default()
    }
}

/// Tier 1 on GPT-4o class models
pub fn tier1() -> RateLimiterConfig {
    RateLimiterConfig {
        name: "openai/tier1".to_string(),
        calls_per_minute: 500,
        calls_per_hour: Some(10_000),
        daily_quota: Some(10_000),
        daily_token_limit: Some(90_000_000),
        default_batch_size: 10,
        ..Default::default()
    }
}

/// Tier 1 at roughly two thirds of the published limits
pub fn conservative() -> RateLimiterConfig {
    RateLimiterConfig {
        name: "openai/conservative".to_string(),
        calls_per_minute: 330,
        calls_per_hour: Some(6_600),
        daily_quota: Some(6_600),
        daily_token_limit: Some(60_000_000),
        backoff: BackoffConfig::conservative(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_tier() {
        let config = free_tier();
        assert!(config.validate().is_ok());
        assert_eq!(config.windows().len(), 2);
        assert!(!config.enabled_request_types.contains(&RequestType::Vision));
        assert_eq!(config.min_request_interval().as_secs(), 20);
    }

    #[test]
    fn test_conservative_below_tier1() {
        assert!(conservative().calls_per_minute < tier1().calls_per_minute);
        assert!(conservative().daily_token_limit < tier1().daily_token_limit);
    }
}
