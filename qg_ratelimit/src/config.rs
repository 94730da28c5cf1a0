use std::time::Duration;

use qg_types::RequestType;
use serde::Deserialize;
use serde::Serialize;

use crate::error::RateLimitError;
use crate::error::Result;

/// Sliding windows a limiter can enforce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Minute,
    Hour,
    Day,
}

impl WindowKind {
    pub const fn duration(self) -> Duration {
        match self {
            WindowKind::Minute => Duration::from_secs(60),
            WindowKind::Hour => Duration::from_secs(3_600),
            WindowKind::Day => Duration::from_secs(86_400),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            WindowKind::Minute => "minute",
            WindowKind::Hour => "hour",
            WindowKind::Day => "day",
        }
    }
}

/// A window together with the number of calls it admits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimit {
    pub kind: WindowKind,
    pub limit: u32,
}

impl WindowLimit {
    pub const fn duration(&self) -> Duration {
        self.kind.duration()
    }
}

/// Tuning for the adaptive backoff controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Exponential base applied per consecutive 429
    pub base: f64,

    /// Ceiling for the backoff factor
    pub max_factor: f64,

    /// Wait time multiplied by the backoff factor
    pub base_wait_seconds: f64,

    /// Absolute ceiling for any advised wait
    pub max_wait_seconds: f64,

    /// Minimum cooldown after the first quota-exceeded error, doubled per repeat
    pub quota_cooldown_seconds: f64,

    /// Ceiling for the quota cooldown
    pub max_quota_cooldown_seconds: f64,

    /// Consecutive 429s after which the controller reports `Escalated`
    pub escalation_threshold: u32,

    /// Smallest batch size advised while quota errors are outstanding
    pub batch_floor: usize,

    /// Window utilization at which batching collapses to single requests
    pub utilization_threshold: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: 2.0,
            max_factor: 32.0,
            base_wait_seconds: 1.0,
            max_wait_seconds: 120.0,
            quota_cooldown_seconds: 30.0,
            max_quota_cooldown_seconds: 120.0,
            escalation_threshold: 3,
            batch_floor: 3,
            utilization_threshold: 0.8,
        }
    }
}

impl BackoffConfig {
    /// Shorter cooldowns for providers that recover quickly
    pub fn aggressive() -> Self {
        Self { base: 1.5, max_factor: 8.0, base_wait_seconds: 0.5, max_wait_seconds: 30.0, quota_cooldown_seconds: 10.0, max_quota_cooldown_seconds: 60.0, ..Default::default() }
    }

    /// Longer cooldowns for providers with strict abuse detection
    pub fn conservative() -> Self {
        Self { base: 2.0, max_factor: 64.0, base_wait_seconds: 2.0, quota_cooldown_seconds: 60.0, ..Default::default() }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base.is_finite() && self.base >= 1.0) {
            return Err(invalid(format!("backoff base must be >= 1.0, got {}", self.base)));
        }
        if !(self.max_factor.is_finite() && self.max_factor >= 1.0) {
            return Err(invalid(format!("backoff max_factor must be >= 1.0, got {}", self.max_factor)));
        }
        for (name, value) in [
            ("base_wait_seconds", self.base_wait_seconds),
            ("max_wait_seconds", self.max_wait_seconds),
            ("quota_cooldown_seconds", self.quota_cooldown_seconds),
            ("max_quota_cooldown_seconds", self.max_quota_cooldown_seconds),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(format!("backoff {name} must be positive, got {value}")));
            }
        }
        if self.batch_floor == 0 {
            return Err(invalid("backoff batch_floor must be at least 1".to_string()));
        }
        if !(self.utilization_threshold > 0.0 && self.utilization_threshold <= 1.0) {
            return Err(invalid(format!("utilization_threshold must be in (0, 1], got {}", self.utilization_threshold)));
        }
        Ok(())
    }

    pub fn base_wait(&self) -> Duration {
        Duration::try_from_secs_f64(self.base_wait_seconds).unwrap_or(Duration::ZERO)
    }

    /// Saturates at `Duration::MAX` for values too large to represent
    pub fn max_wait(&self) -> Duration {
        if self.max_wait_seconds.is_finite() && self.max_wait_seconds > 0.0 {
            Duration::try_from_secs_f64(self.max_wait_seconds).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        }
    }
}

/// Construction parameters for a provider's `RateLimiter`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Label used in logs and stats, e.g. `openai/gpt-4o`
    pub name: String,

    pub calls_per_minute: u32,

    pub calls_per_hour: Option<u32>,

    /// Calls per rolling 24 hours; also reported as the calendar-day quota
    pub daily_quota: Option<u32>,

    /// Minimum spacing between consecutive calls
    pub min_request_interval_seconds: f64,

    /// Request types the active model serves
    pub enabled_request_types: Vec<RequestType>,

    /// Model-specific token ceiling per calendar day
    pub daily_token_limit: Option<u64>,

    /// Batch size advised when the limiter is healthy
    pub default_batch_size: usize,

    /// Latency samples kept before trimming
    pub max_latency_samples: usize,

    /// Latency samples that survive a trim
    pub retained_latency_samples: usize,

    /// Prune the request log once it exceeds this many times the steady-state size
    pub prune_multiplier: usize,

    /// Hard ceiling on the request log, as a multiple of the steady-state size
    pub hard_cap_multiplier: usize,

    pub backoff: BackoffConfig,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            calls_per_minute: 60,
            calls_per_hour: None,
            daily_quota: None,
            min_request_interval_seconds: 0.0,
            enabled_request_types: RequestType::ALL.to_vec(),
            daily_token_limit: None,
            default_batch_size: 5,
            max_latency_samples: 100,
            retained_latency_samples: 50,
            prune_multiplier: 2,
            hard_cap_multiplier: 4,
            backoff: BackoffConfig::default(),
        }
    }
}

impl RateLimiterConfig {
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::new()
    }

    /// Reject non-positive limits and inconsistent memory bounds
    pub fn validate(&self) -> Result<()> {
        if self.calls_per_minute == 0 {
            return Err(invalid("calls_per_minute must be greater than 0".to_string()));
        }
        if self.calls_per_hour == Some(0) {
            return Err(invalid("calls_per_hour must be greater than 0".to_string()));
        }
        if self.daily_quota == Some(0) {
            return Err(invalid("daily_quota must be greater than 0".to_string()));
        }
        if !(self.min_request_interval_seconds.is_finite() && self.min_request_interval_seconds >= 0.0) {
            return Err(invalid(format!("min_request_interval_seconds must be >= 0, got {}", self.min_request_interval_seconds)));
        }
        if self.enabled_request_types.is_empty() {
            return Err(invalid("at least one request type must be enabled".to_string()));
        }
        if self.daily_token_limit == Some(0) {
            return Err(invalid("daily_token_limit must be greater than 0".to_string()));
        }
        if self.default_batch_size == 0 {
            return Err(invalid("default_batch_size must be greater than 0".to_string()));
        }
        if self.max_latency_samples == 0 || self.retained_latency_samples == 0 || self.retained_latency_samples > self.max_latency_samples {
            return Err(invalid(format!(
                "latency buffer needs 0 < retained ({}) <= max ({})",
                self.retained_latency_samples, self.max_latency_samples
            )));
        }
        if self.prune_multiplier == 0 || self.hard_cap_multiplier < self.prune_multiplier {
            return Err(invalid(format!(
                "log bounds need 0 < prune_multiplier ({}) <= hard_cap_multiplier ({})",
                self.prune_multiplier, self.hard_cap_multiplier
            )));
        }
        self.backoff.validate()
    }

    /// Configured windows, shortest first
    pub fn windows(&self) -> Vec<WindowLimit> {
        let mut windows = vec![WindowLimit { kind: WindowKind::Minute, limit: self.calls_per_minute }];
        if let Some(limit) = self.calls_per_hour {
            windows.push(WindowLimit { kind: WindowKind::Hour, limit });
        }
        if let Some(limit) = self.daily_quota {
            windows.push(WindowLimit { kind: WindowKind::Day, limit });
        }
        windows
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.min_request_interval_seconds).unwrap_or(Duration::ZERO)
    }
}

/// Builder for configuring a rate limiter
pub struct RateLimiterConfigBuilder {
    config: RateLimiterConfig,
}

impl RateLimiterConfigBuilder {
    pub fn new() -> Self {
        Self { config: RateLimiterConfig::default() }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn calls_per_minute(mut self, limit: u32) -> Self {
        self.config.calls_per_minute = limit;
        self
    }

    pub fn calls_per_hour(mut self, limit: u32) -> Self {
        self.config.calls_per_hour = Some(limit);
        self
    }

    pub fn daily_quota(mut self, limit: u32) -> Self {
        self.config.daily_quota = Some(limit);
        self
    }

    pub fn min_request_interval(mut self, interval: Duration) -> Self {
        self.config.min_request_interval_seconds = interval.as_secs_f64();
        self
    }

    pub fn enabled_request_types(mut self, types: &[RequestType]) -> Self {
        self.config.enabled_request_types = types.to_vec();
        self
    }

    pub fn daily_token_limit(mut self, tokens: u64) -> Self {
        self.config.daily_token_limit = Some(tokens);
        self
    }

    pub fn default_batch_size(mut self, size: usize) -> Self {
        self.config.default_batch_size = size;
        self
    }

    pub fn latency_samples(mut self, max: usize, retained: usize) -> Self {
        self.config.max_latency_samples = max;
        self.config.retained_latency_samples = retained;
        self
    }

    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> Result<RateLimiterConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for RateLimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn invalid(msg: String) -> RateLimitError {
    RateLimitError::InvalidConfig(msg)
}
