//! Pre-configured limits for major model providers
//!
//! Each preset returns a `RateLimiterConfig` rather than a limiter so callers
//! can still adjust names, batch sizes or backoff before building.
//!
//! # Supported Providers
//!
//! - **OpenAI**: free and tier 1 limits, vision and tool use on GPT-4o
//! - **Anthropic**: build tiers with tool use, no streaming-only quota
//! - **Gemini**: free and pay-as-you-go limits with a daily request quota

pub mod anthropic;
pub mod gemini;
pub mod openai;

use crate::config::RateLimiterConfig;

/// Look up a preset by provider and tier name
///
/// Unknown combinations return `None`; names are matched case-insensitively.
pub fn preset(provider: &str, tier: &str) -> Option<RateLimiterConfig> {
    let config = match (provider.to_ascii_lowercase().as_str(), tier.to_ascii_lowercase().as_str()) {
        ("openai", "free") => openai::free_tier(),
        ("openai", "tier1" | "standard") => openai::tier1(),
        ("openai", "conservative") => openai::conservative(),
        ("anthropic", "free") => anthropic::free_tier(),
        ("anthropic", "tier1" | "standard") => anthropic::build_tier1(),
        ("anthropic", "conservative") => anthropic::conservative(),
        ("gemini", "free") => gemini::free_tier(),
        ("gemini", "tier1" | "standard") => gemini::pay_as_you_go(),
        ("gemini", "conservative") => gemini::conservative(),
        _ => return None,
    };
    Some(config)
}
