use std::time::Duration;

use qg_types::clock::secs_f64_to_nanos;
use serde::Serialize;

use crate::config::BackoffConfig;

/// Derived throttling state of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffState {
    /// No cooldown in effect, requests pass through
    Normal,
    /// Cooling down after a provider error
    Throttled,
    /// Cooling down after repeated 429s or a quota error
    Escalated,
}

/// Snapshot of the controller for stats endpoints
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackoffStats {
    pub state: BackoffState,
    pub consecutive_429s: u32,
    pub consecutive_quota_errors: u32,
    pub backoff_factor: f64,
    pub cooldown_remaining_ms: u64,
    pub total_429s: u64,
    pub total_quota_errors: u64,
}

/// Adaptive backoff driven by provider throttling signals
///
/// There is no timer: every answer is a function of `now`, the time of the
/// last error and the consecutive error counts. Cooldowns are always finite,
/// so a throttled provider is eventually probed again.
#[derive(Debug, Clone)]
pub struct BackoffController {
    config: BackoffConfig,
    consecutive_429s: u32,
    consecutive_quota_errors: u32,
    /// Nanoseconds since the Unix epoch
    last_error_time: Option<u64>,
    /// Always >= 1.0
    backoff_factor: f64,
    total_429s: u64,
    total_quota_errors: u64,
}

impl BackoffController {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, consecutive_429s: 0, consecutive_quota_errors: 0, last_error_time: None, backoff_factor: 1.0, total_429s: 0, total_quota_errors: 0 }
    }

    /// Provider answered 429; returns the new factor
    pub fn record_429(&mut self, now: u64) -> f64 {
        self.consecutive_429s = self.consecutive_429s.saturating_add(1);
        self.total_429s += 1;
        self.last_error_time = Some(now);
        self.recompute_factor();
        self.backoff_factor
    }

    /// Provider reported its quota exhausted
    ///
    /// Counts as a 429 as well and imposes the longer quota cooldown.
    pub fn record_quota_exceeded(&mut self, now: u64) -> f64 {
        self.consecutive_quota_errors = self.consecutive_quota_errors.saturating_add(1);
        self.total_quota_errors += 1;
        self.record_429(now)
    }

    /// A call completed; once the cooldown is over each success walks the
    /// counters one step back toward zero. Returns whether anything decayed.
    pub fn record_success(&mut self, now: u64) -> bool {
        if self.consecutive_429s == 0 && self.consecutive_quota_errors == 0 {
            return false;
        }
        if !self.can_proceed(now) {
            return false;
        }

        self.consecutive_429s = self.consecutive_429s.saturating_sub(1);
        self.consecutive_quota_errors = self.consecutive_quota_errors.saturating_sub(1);
        self.recompute_factor();
        true
    }

    pub fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }

    pub fn consecutive_429s(&self) -> u32 {
        self.consecutive_429s
    }

    pub fn consecutive_quota_errors(&self) -> u32 {
        self.consecutive_quota_errors
    }

    /// Cooldown owed after the last error, in nanoseconds
    pub fn required_cooldown(&self) -> u64 {
        if self.consecutive_429s == 0 && self.consecutive_quota_errors == 0 {
            return 0;
        }

        let plain = (self.config.base_wait_seconds * self.backoff_factor).min(self.config.max_wait_seconds);
        let quota = if self.consecutive_quota_errors == 0 {
            0.0
        } else {
            let doublings = (self.consecutive_quota_errors - 1).min(16) as i32;
            (self.config.quota_cooldown_seconds * 2f64.powi(doublings)).min(self.config.max_quota_cooldown_seconds)
        };

        secs_f64_to_nanos(plain.max(quota))
    }

    /// Time left before the next call may be attempted
    pub fn cooldown_remaining(&self, now: u64) -> Duration {
        let Some(last_error) = self.last_error_time else {
            return Duration::ZERO;
        };
        // A clock behind the last error counts as no time having passed
        let elapsed = now.saturating_sub(last_error);
        Duration::from_nanos(self.required_cooldown().saturating_sub(elapsed))
    }

    /// False only while `now < last_error_time + required_cooldown`
    pub fn can_proceed(&self, now: u64) -> bool {
        self.cooldown_remaining(now).is_zero()
    }

    /// Advised wait: `base_wait * backoff_factor`, at least the remaining
    /// cooldown and at most `max_wait`. Zero once the cooldown has passed.
    pub fn wait_time(&self, base_wait: Duration, now: u64) -> Duration {
        let remaining = self.cooldown_remaining(now);
        if remaining.is_zero() {
            return Duration::ZERO;
        }

        // Scale in f64: a large factor would overflow `Duration::mul_f64`
        let max_wait = self.config.max_wait();
        let scaled = (base_wait.as_secs_f64() * self.backoff_factor).min(self.config.max_wait_seconds);
        let scaled = Duration::try_from_secs_f64(scaled).unwrap_or(max_wait);
        scaled.max(remaining).min(max_wait)
    }

    /// Batch size to use given the current window utilization (0.0..=1.0+)
    ///
    /// Outstanding quota errors shrink the batch in steps of a fifth of the
    /// default, never below the configured floor. Without quota errors a hot
    /// window collapses batching to single requests.
    pub fn optimal_batch_size(&self, default_size: usize, utilization: f64) -> usize {
        if self.consecutive_quota_errors > 0 {
            let floor = self.config.batch_floor;
            if default_size <= floor {
                return default_size;
            }
            let step = (default_size / 5).max(1);
            let shrink = step.saturating_mul(self.consecutive_quota_errors as usize);
            return default_size.saturating_sub(shrink).max(floor);
        }

        if utilization >= self.config.utilization_threshold {
            return 1;
        }

        default_size
    }

    pub fn state(&self, now: u64) -> BackoffState {
        if self.can_proceed(now) {
            BackoffState::Normal
        } else if self.consecutive_quota_errors > 0 || self.consecutive_429s >= self.config.escalation_threshold {
            BackoffState::Escalated
        } else {
            BackoffState::Throttled
        }
    }

    pub fn snapshot(&self, now: u64) -> BackoffStats {
        BackoffStats {
            state: self.state(now),
            consecutive_429s: self.consecutive_429s,
            consecutive_quota_errors: self.consecutive_quota_errors,
            backoff_factor: self.backoff_factor,
            cooldown_remaining_ms: self.cooldown_remaining(now).as_millis() as u64,
            total_429s: self.total_429s,
            total_quota_errors: self.total_quota_errors,
        }
    }

    pub fn reset(&mut self) {
        self.consecutive_429s = 0;
        self.consecutive_quota_errors = 0;
        self.last_error_time = None;
        self.backoff_factor = 1.0;
    }

    fn recompute_factor(&mut self) {
        let exponent = self.consecutive_429s.min(64) as i32;
        self.backoff_factor = self.config.base.powi(exponent).min(self.config.max_factor).max(1.0);
    }
}

impl Default for BackoffController {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}
