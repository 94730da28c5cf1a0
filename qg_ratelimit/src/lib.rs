//! Client-side admission control for rate-limited model providers
//!
//! A `RateLimiter` combines minute, hour and day sliding windows, a
//! calendar-day token and cost tracker, and an adaptive backoff controller
//! driven by the provider's 429 and quota-exceeded responses.

pub mod backoff;
pub mod config;
pub mod error;
pub mod latency;
pub mod limiter;
pub mod providers;
pub mod quota;
pub mod sliding_window;
pub mod stats;

pub use backoff::BackoffController;
pub use backoff::BackoffState;
pub use backoff::BackoffStats;
pub use config::BackoffConfig;
pub use config::RateLimiterConfig;
pub use config::RateLimiterConfigBuilder;
pub use config::WindowKind;
pub use config::WindowLimit;
pub use error::RateLimitError;
pub use error::Result;
pub use latency::LatencySamples;
pub use latency::LatencyStats;
pub use limiter::Admission;
pub use limiter::RateLimiter;
pub use limiter::RequestUsage;
pub use quota::QuotaSummary;
pub use quota::QuotaTracker;
pub use sliding_window::SlidingWindowCounter;
pub use stats::ComprehensiveStats;
pub use stats::MemoryOptimization;
pub use stats::UsageSummary;
pub use stats::WindowStats;
