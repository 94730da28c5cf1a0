use std::mem::size_of;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use qg_types::Clock;
use qg_types::RequestType;
use qg_types::SystemClock;
use qg_types::clock::duration_to_nanos;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::backoff::BackoffController;
use crate::backoff::BackoffState;
use crate::config::RateLimiterConfig;
use crate::config::RateLimiterConfigBuilder;
use crate::config::WindowKind;
use crate::config::WindowLimit;
use crate::error::RateLimitError;
use crate::error::Result;
use crate::latency::LatencySamples;
use crate::quota::QuotaSummary;
use crate::quota::QuotaTracker;
use crate::sliding_window::RequestRecord;
use crate::sliding_window::SlidingWindowCounter;
use crate::stats::ComprehensiveStats;
use crate::stats::MemoryFootprint;
use crate::stats::MemoryOptimization;
use crate::stats::UsageSummary;
use crate::stats::WindowStats;

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// The active model does not serve this request type
    RequestTypeDisabled(RequestType),
    /// A sliding window is at its limit
    WindowFull { window: WindowKind, retry_after: Duration },
    /// Cooling down after provider throttling
    BackingOff { retry_after: Duration },
    /// Too soon after the previous call
    MinInterval { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }

    /// How long until this particular gate opens; zero if allowed or never
    pub fn retry_after(&self) -> Duration {
        match self {
            Admission::WindowFull { retry_after, .. } | Admission::BackingOff { retry_after } | Admission::MinInterval { retry_after } => *retry_after,
            Admission::Allowed | Admission::RequestTypeDisabled(_) => Duration::ZERO,
        }
    }

    /// For callers that prefer `?` over matching
    pub fn into_result(self) -> Result<()> {
        match self {
            Admission::Allowed => Ok(()),
            Admission::RequestTypeDisabled(request_type) => Err(RateLimitError::RequestTypeDisabled(request_type)),
            other => Err(RateLimitError::Exceeded { retry_after: other.retry_after() }),
        }
    }
}

/// What a completed call consumed
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RequestUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub latency_ms: Option<f64>,
}

impl RequestUsage {
    pub fn tokens(input_tokens: u64, output_tokens: u64) -> Self {
        Self { input_tokens, output_tokens, ..Default::default() }
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency_ms = Some(latency.as_nanos() as f64 / 1_000_000.0);
        self
    }
}

struct LimiterState {
    log: SlidingWindowCounter,
    quota: QuotaTracker,
    backoff: BackoffController,
    latency: LatencySamples,
}

/// Admission control for one provider
///
/// Composes a multi-window request log, daily quota bookkeeping and adaptive
/// backoff behind a single lock. Nothing here blocks or fails at runtime:
/// a denial is reported as data and the caller decides whether to wait,
/// queue or give up.
pub struct RateLimiter {
    config: RateLimiterConfig,
    windows: Vec<WindowLimit>,
    enabled: [bool; RequestType::COUNT],
    min_interval: u64,
    clock: Arc<dyn Clock>,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    /// Create a limiter on the system clock
    pub fn new(config: RateLimiterConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a limiter on an injected clock
    pub fn with_clock(config: RateLimiterConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let windows = config.windows();
        let durations: Vec<Duration> = windows.iter().map(|w| w.duration()).collect();
        // No window admits more than its limit, so the largest limit bounds the log
        let steady_state = windows.iter().map(|w| w.limit).max().unwrap_or(config.calls_per_minute) as usize;

        let mut enabled = [false; RequestType::COUNT];
        for request_type in &config.enabled_request_types {
            enabled[request_type.index()] = true;
        }

        let now = clock.now_nanos();
        let state = LimiterState {
            log: SlidingWindowCounter::with_multipliers(&durations, steady_state, config.prune_multiplier, config.hard_cap_multiplier),
            quota: QuotaTracker::new(config.daily_quota, config.daily_token_limit, now),
            backoff: BackoffController::new(config.backoff.clone()),
            latency: LatencySamples::new(config.max_latency_samples, config.retained_latency_samples),
        };

        info!(
            name = %config.name,
            calls_per_minute = config.calls_per_minute,
            calls_per_hour = ?config.calls_per_hour,
            daily_quota = ?config.daily_quota,
            min_interval_s = config.min_request_interval_seconds,
            "Rate limiter created"
        );

        Ok(Self { min_interval: duration_to_nanos(config.min_request_interval()), windows, enabled, clock, config, state: Mutex::new(state) })
    }

    /// Configure a limiter field by field
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::new()
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Decide whether a call of `request_type` may go out now, and if not why
    pub fn check(&self, request_type: RequestType) -> Admission {
        let now = self.clock.now_nanos();
        let state = self.state.lock();
        let admission = self.check_locked(&state, request_type, now);

        if !admission.is_allowed() {
            debug!(name = %self.config.name, request_type = %request_type, ?admission, "Request denied");
        }
        admission
    }

    /// All windows under limit, not backing off, and the type is enabled
    pub fn can_make_request(&self, request_type: RequestType) -> bool {
        self.check(request_type).is_allowed()
    }

    /// Whether `additional_tokens` fit under today's model token ceiling
    pub fn can_afford(&self, additional_tokens: u64) -> bool {
        let now = self.clock.now_nanos();
        self.state.lock().quota.can_afford(additional_tokens, now)
    }

    /// Record one successful call; past the cooldown this also decays the backoff
    pub fn record_request(&self, request_type: RequestType, usage: RequestUsage) {
        let now = self.clock.now_nanos();
        let mut state = self.state.lock();

        Self::record_locked(&mut state, request_type, &usage, now);
        if state.backoff.record_success(now) {
            debug!(
                name = %self.config.name,
                factor = state.backoff.backoff_factor(),
                consecutive_429s = state.backoff.consecutive_429s(),
                "Backoff decayed"
            );
        }
    }

    /// Record a call that reached the provider but failed
    ///
    /// It counts against the windows and the quota like any other call but
    /// leaves the backoff counters alone.
    pub fn record_attempt(&self, request_type: RequestType, usage: RequestUsage) {
        let now = self.clock.now_nanos();
        let mut state = self.state.lock();
        Self::record_locked(&mut state, request_type, &usage, now);
    }

    /// Provider answered with HTTP 429
    pub fn record_429_error(&self) {
        let now = self.clock.now_nanos();
        let mut state = self.state.lock();
        let factor = state.backoff.record_429(now);

        warn!(
            name = %self.config.name,
            consecutive_429s = state.backoff.consecutive_429s(),
            factor,
            cooldown_ms = state.backoff.cooldown_remaining(now).as_millis() as u64,
            "Provider throttled request"
        );
    }

    /// Provider reported its quota exhausted
    pub fn record_quota_exceeded(&self) {
        let now = self.clock.now_nanos();
        let mut state = self.state.lock();
        let factor = state.backoff.record_quota_exceeded(now);

        warn!(
            name = %self.config.name,
            consecutive_quota_errors = state.backoff.consecutive_quota_errors(),
            consecutive_429s = state.backoff.consecutive_429s(),
            factor,
            cooldown_ms = state.backoff.cooldown_remaining(now).as_millis() as u64,
            "Provider quota exceeded"
        );
    }

    /// How long to wait before the next call has a chance of being admitted
    pub fn get_wait_time(&self) -> Duration {
        let now = self.clock.now_nanos();
        let state = self.state.lock();
        self.wait_time_locked(&state, now)
    }

    /// Batch size for the configured default
    pub fn get_optimal_batch_size(&self) -> usize {
        self.optimal_batch_size_for(self.config.default_batch_size)
    }

    pub fn optimal_batch_size_for(&self, default_size: usize) -> usize {
        let now = self.clock.now_nanos();
        let state = self.state.lock();
        state.backoff.optimal_batch_size(default_size, self.utilization_locked(&state, now))
    }

    /// Highest count/limit ratio across the windows
    pub fn utilization(&self) -> f64 {
        let now = self.clock.now_nanos();
        let state = self.state.lock();
        self.utilization_locked(&state, now)
    }

    /// Calls recorded in the trailing `window`
    ///
    /// Exact unless the request log hit its hard cap of four times the
    /// largest window limit, which only happens when calls are recorded
    /// without being admitted. See `SlidingWindowCounter::count_in_window`.
    pub fn count_in_window(&self, window: Duration) -> usize {
        let now = self.clock.now_nanos();
        self.state.lock().log.count_in_window(window, now)
    }

    pub fn backoff_factor(&self) -> f64 {
        self.state.lock().backoff.backoff_factor()
    }

    pub fn backoff_state(&self) -> BackoffState {
        let now = self.clock.now_nanos();
        self.state.lock().backoff.state(now)
    }

    pub fn latency_sample_count(&self) -> usize {
        self.state.lock().latency.len()
    }

    pub fn get_usage_summary(&self) -> UsageSummary {
        let now = self.clock.now_nanos();
        let state = self.state.lock();
        UsageSummary { name: self.config.name.clone(), windows: self.window_stats_locked(&state, now), quota: state.quota.summary(now) }
    }

    pub fn quota_summary(&self) -> QuotaSummary {
        let now = self.clock.now_nanos();
        self.state.lock().quota.summary(now)
    }

    pub fn get_comprehensive_stats(&self) -> ComprehensiveStats {
        let now = self.clock.now_nanos();
        let state = self.state.lock();

        ComprehensiveStats {
            name: self.config.name.clone(),
            windows: self.window_stats_locked(&state, now),
            utilization: self.utilization_locked(&state, now),
            can_make_request: self.check_locked(&state, self.config.enabled_request_types.first().copied().unwrap_or_default(), now).is_allowed(),
            wait_time_ms: self.wait_time_locked(&state, now).as_millis() as u64,
            optimal_batch_size: state.backoff.optimal_batch_size(self.config.default_batch_size, self.utilization_locked(&state, now)),
            quota: state.quota.summary(now),
            backoff: state.backoff.snapshot(now),
            latency: state.latency.stats(),
            memory: Self::footprint(&state),
        }
    }

    /// Prune the request log and trim latency samples right now
    pub fn optimize_memory(&self) -> MemoryOptimization {
        let now = self.clock.now_nanos();
        let mut state = self.state.lock();

        let memory_before = Self::footprint(&state);
        let requests_cleaned = state.log.prune(now);
        state.log.shrink_to_fit();
        let samples_trimmed = state.latency.trim();
        let memory_after = Self::footprint(&state);

        info!(
            name = %self.config.name,
            requests_cleaned,
            samples_trimmed,
            bytes_before = memory_before.approx_bytes,
            bytes_after = memory_after.approx_bytes,
            "Optimized limiter memory"
        );

        MemoryOptimization { requests_cleaned, samples_trimmed, memory_before, memory_after }
    }

    /// Forget all history, as after a process restart
    pub fn reset(&self) {
        let now = self.clock.now_nanos();
        let mut state = self.state.lock();
        state.log.clear();
        state.quota = QuotaTracker::new(self.config.daily_quota, self.config.daily_token_limit, now);
        state.backoff.reset();
        state.latency.clear();
        info!(name = %self.config.name, "Rate limiter reset");
    }

    fn record_locked(state: &mut LimiterState, request_type: RequestType, usage: &RequestUsage, now: u64) {
        state.log.record(now, request_type);
        state.quota.record(request_type, usage.input_tokens, usage.output_tokens, usage.cost, now);
        if let Some(latency_ms) = usage.latency_ms {
            state.latency.push(latency_ms);
        }
    }

    fn check_locked(&self, state: &LimiterState, request_type: RequestType, now: u64) -> Admission {
        if !self.enabled[request_type.index()] {
            return Admission::RequestTypeDisabled(request_type);
        }

        for window in &self.windows {
            let count = state.log.count_in_window(window.duration(), now);
            if count >= window.limit as usize {
                return Admission::WindowFull { window: window.kind, retry_after: self.window_wait(state, window, count, now) };
            }
        }

        if !state.backoff.can_proceed(now) {
            return Admission::BackingOff { retry_after: state.backoff.wait_time(self.config.backoff.base_wait(), now) };
        }

        let interval_wait = self.interval_wait(state, now);
        if !interval_wait.is_zero() {
            return Admission::MinInterval { retry_after: interval_wait };
        }

        Admission::Allowed
    }

    fn wait_time_locked(&self, state: &LimiterState, now: u64) -> Duration {
        let window_wait = self
            .windows
            .iter()
            .map(|window| {
                let count = state.log.count_in_window(window.duration(), now);
                if count >= window.limit as usize { self.window_wait(state, window, count, now) } else { Duration::ZERO }
            })
            .max()
            .unwrap_or(Duration::ZERO);

        window_wait.max(state.backoff.wait_time(self.config.backoff.base_wait(), now)).max(self.interval_wait(state, now))
    }

    /// Time until enough records expire for `window` to admit one more call
    fn window_wait(&self, state: &LimiterState, window: &WindowLimit, count: usize, now: u64) -> Duration {
        let must_expire = count + 1 - window.limit as usize;
        let now = state.log.effective_now(now);
        match state.log.nth_in_window(window.duration(), now, must_expire - 1) {
            Some(timestamp) => Duration::from_nanos(timestamp.saturating_add(duration_to_nanos(window.duration())).saturating_sub(now)),
            None => Duration::ZERO,
        }
    }

    fn interval_wait(&self, state: &LimiterState, now: u64) -> Duration {
        if self.min_interval == 0 {
            return Duration::ZERO;
        }
        match state.log.last_timestamp() {
            Some(last) => Duration::from_nanos(last.saturating_add(self.min_interval).saturating_sub(now.max(last))),
            None => Duration::ZERO,
        }
    }

    fn utilization_locked(&self, state: &LimiterState, now: u64) -> f64 {
        self.windows.iter().map(|w| state.log.count_in_window(w.duration(), now) as f64 / f64::from(w.limit)).fold(0.0, f64::max)
    }

    fn window_stats_locked(&self, state: &LimiterState, now: u64) -> Vec<WindowStats> {
        self.windows
            .iter()
            .map(|w| {
                let count = state.log.count_in_window(w.duration(), now);
                WindowStats {
                    window: w.kind,
                    limit: w.limit,
                    count,
                    remaining: w.limit.saturating_sub(u32::try_from(count).unwrap_or(u32::MAX)),
                    utilization: count as f64 / f64::from(w.limit),
                }
            })
            .collect()
    }

    fn footprint(state: &LimiterState) -> MemoryFootprint {
        let request_log = state.log.memory_usage();
        let latency_capacity = state.latency.capacity();
        MemoryFootprint {
            request_log,
            request_log_hard_cap: state.log.hard_cap(),
            latency_samples: state.latency.len(),
            latency_capacity,
            approx_bytes: request_log.capacity * size_of::<RequestRecord>() + latency_capacity * size_of::<f64>(),
        }
    }
}

impl RateLimiterConfigBuilder {
    /// Validate and build a limiter on the system clock
    pub fn build_limiter(self) -> Result<RateLimiter> {
        RateLimiter::new(self.build()?)
    }

    /// Validate and build a limiter on an injected clock
    pub fn build_limiter_with_clock(self, clock: Arc<dyn Clock>) -> Result<RateLimiter> {
        RateLimiter::with_clock(self.build()?, clock)
    }
}

#[cfg(test)]
mod tests {
    use qg_types::ManualClock;

    use super::*;
    use crate::config::BackoffConfig;

    const T0: Duration = Duration::from_secs(1_700_000_000);
    const MINUTE: Duration = Duration::from_secs(60);

    fn limiter(config: RateLimiterConfig) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        let limiter = RateLimiter::with_clock(config, clock.clone()).unwrap();
        (limiter, clock)
    }

    fn per_minute(limit: u32) -> RateLimiterConfig {
        RateLimiterConfig { calls_per_minute: limit, ..Default::default() }
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let result = RateLimiter::new(per_minute(0));
        assert!(matches!(result, Err(RateLimitError::InvalidConfig(_))));
    }

    #[test]
    fn test_minute_window_blocks_and_recovers() {
        let (limiter, clock) = limiter(per_minute(60));

        for _ in 0..60 {
            assert!(limiter.can_make_request(RequestType::Text));
            limiter.record_request(RequestType::Text, RequestUsage::default());
            clock.advance(Duration::from_millis(100));
        }

        assert!(!limiter.can_make_request(RequestType::Text));
        let wait = limiter.get_wait_time();
        assert!(wait > Duration::ZERO && wait <= MINUTE, "wait = {wait:?}");
        assert!(matches!(limiter.check(RequestType::Text), Admission::WindowFull { window: WindowKind::Minute, .. }));

        clock.advance(wait);
        assert!(limiter.can_make_request(RequestType::Text));

        clock.advance(MINUTE);
        assert!(limiter.can_make_request(RequestType::Text));
        assert_eq!(limiter.get_wait_time(), Duration::ZERO);
    }

    #[test]
    fn test_burst_at_one_instant_waits_exactly_one_window() {
        let (limiter, clock) = limiter(per_minute(10));
        for _ in 0..10 {
            limiter.record_request(RequestType::Text, RequestUsage::default());
        }

        assert_eq!(limiter.get_wait_time(), MINUTE);
        clock.advance(MINUTE);
        assert!(limiter.can_make_request(RequestType::Text));
    }

    #[test]
    fn test_hour_window() {
        let config = RateLimiterConfig { calls_per_minute: 100, calls_per_hour: Some(5), ..Default::default() };
        let (limiter, clock) = limiter(config);

        for _ in 0..5 {
            limiter.record_request(RequestType::Text, RequestUsage::default());
            clock.advance(Duration::from_secs(60));
        }

        assert!(matches!(limiter.check(RequestType::Text), Admission::WindowFull { window: WindowKind::Hour, .. }));
        // Oldest record was made 5 minutes ago
        assert_eq!(limiter.get_wait_time(), Duration::from_secs(55 * 60));
    }

    #[test]
    fn test_disabled_request_type() {
        let config = RateLimiterConfig { enabled_request_types: vec![RequestType::Text], ..Default::default() };
        let (limiter, _clock) = limiter(config);

        assert!(limiter.can_make_request(RequestType::Text));
        assert_eq!(limiter.check(RequestType::Vision), Admission::RequestTypeDisabled(RequestType::Vision));
        assert_eq!(limiter.check(RequestType::Vision).into_result(), Err(RateLimitError::RequestTypeDisabled(RequestType::Vision)));
    }

    #[test]
    fn test_min_request_interval() {
        let config = RateLimiterConfig { min_request_interval_seconds: 2.0, ..Default::default() };
        let (limiter, clock) = limiter(config);

        assert!(limiter.can_make_request(RequestType::Text));
        limiter.record_request(RequestType::Text, RequestUsage::default());

        clock.advance(Duration::from_millis(500));
        assert_eq!(limiter.check(RequestType::Text), Admission::MinInterval { retry_after: Duration::from_millis(1_500) });
        assert_eq!(limiter.get_wait_time(), Duration::from_millis(1_500));

        clock.advance(Duration::from_millis(1_500));
        assert!(limiter.can_make_request(RequestType::Text));
    }

    #[test]
    fn test_429_blocks_until_cooldown() {
        let (limiter, clock) = limiter(per_minute(60));
        limiter.record_429_error();

        assert_eq!(limiter.backoff_factor(), 2.0);
        assert_eq!(limiter.backoff_state(), BackoffState::Throttled);
        assert!(matches!(limiter.check(RequestType::Text), Admission::BackingOff { .. }));
        assert_eq!(limiter.get_wait_time(), Duration::from_secs(2));

        clock.advance(Duration::from_secs(2));
        assert!(limiter.can_make_request(RequestType::Text));
        assert_eq!(limiter.get_wait_time(), Duration::ZERO);
    }

    #[test]
    fn test_backoff_decays_with_successes() {
        let (limiter, clock) = limiter(per_minute(1_000));
        for _ in 0..3 {
            limiter.record_429_error();
        }
        assert_eq!(limiter.backoff_factor(), 8.0);

        clock.advance(Duration::from_secs(8));
        for _ in 0..3 {
            limiter.record_request(RequestType::Text, RequestUsage::default());
        }
        assert_eq!(limiter.backoff_factor(), 1.0);
        assert_eq!(limiter.backoff_state(), BackoffState::Normal);
    }

    #[test]
    fn test_failed_attempts_do_not_decay_backoff() {
        let (limiter, clock) = limiter(per_minute(1_000));
        for _ in 0..3 {
            limiter.record_429_error();
        }
        clock.advance(Duration::from_secs(8));

        for _ in 0..3 {
            limiter.record_attempt(RequestType::Text, RequestUsage::default());
        }
        assert_eq!(limiter.backoff_factor(), 8.0);
        assert_eq!(limiter.count_in_window(MINUTE), 3);
        assert_eq!(limiter.quota_summary().total_requests, 3);

        limiter.record_request(RequestType::Text, RequestUsage::default());
        assert_eq!(limiter.backoff_factor(), 4.0);
    }

    #[test]
    fn test_wait_time_with_huge_max_factor() {
        let config = RateLimiterConfig { backoff: BackoffConfig { max_factor: 1e30, ..Default::default() }, ..per_minute(60) };
        let (limiter, _clock) = limiter(config);
        for _ in 0..70 {
            limiter.record_429_error();
        }

        assert_eq!(limiter.get_wait_time(), Duration::from_secs(120));
        assert!(matches!(limiter.check(RequestType::Text), Admission::BackingOff { retry_after } if retry_after == Duration::from_secs(120)));
    }

    #[test]
    fn test_scenario_quota_exceeded_batch_size() {
        let (limiter, _clock) = limiter(per_minute(60));
        for _ in 0..60 {
            limiter.record_request(RequestType::Text, RequestUsage::default());
        }
        assert!(!limiter.can_make_request(RequestType::Text));
        assert_eq!(limiter.get_optimal_batch_size(), 1);

        limiter.record_quota_exceeded();
        let batch = limiter.get_optimal_batch_size();
        assert!((3..5).contains(&batch), "batch = {batch}");
    }

    #[test]
    fn test_batch_size_tracks_utilization() {
        let (limiter, _clock) = limiter(per_minute(10));
        assert_eq!(limiter.get_optimal_batch_size(), 5);

        for _ in 0..7 {
            limiter.record_request(RequestType::Text, RequestUsage::default());
        }
        assert_eq!(limiter.get_optimal_batch_size(), 5);

        limiter.record_request(RequestType::Text, RequestUsage::default());
        assert_eq!(limiter.utilization(), 0.8);
        assert_eq!(limiter.get_optimal_batch_size(), 1);
    }

    #[test]
    fn test_latency_buffer_bounded() {
        let (limiter, _clock) = limiter(per_minute(10_000));
        for i in 0..250 {
            limiter.record_request(RequestType::Streaming, RequestUsage::default().with_latency(Duration::from_millis(i)));
            assert!(limiter.latency_sample_count() <= 100);
        }

        let stats = limiter.get_comprehensive_stats();
        assert!(stats.latency.sample_count >= 50);
        assert_eq!(stats.latency.max_ms, Some(249.0));
    }

    #[test]
    fn test_tokens_and_cost_flow_into_quota() {
        let config = RateLimiterConfig { daily_token_limit: Some(1_000), daily_quota: Some(100), ..Default::default() };
        let (limiter, _clock) = limiter(config);

        limiter.record_request(RequestType::FunctionCalling, RequestUsage::tokens(300, 200).with_cost(0.02));
        assert!(limiter.can_afford(500));
        assert!(!limiter.can_afford(501));

        let summary = limiter.get_usage_summary();
        assert_eq!(summary.quota.total_tokens, 500);
        assert_eq!(summary.quota.remaining_daily_requests, Some(99));
        assert_eq!(summary.windows.len(), 2);
        assert_eq!(summary.windows[1].window, WindowKind::Day);
        assert_eq!(summary.windows[1].remaining, 99);
    }

    #[test]
    fn test_comprehensive_stats() {
        let config = RateLimiterConfig { name: "test/model".to_string(), calls_per_minute: 10, calls_per_hour: Some(100), ..Default::default() };
        let (limiter, _clock) = limiter(config);
        limiter.record_request(RequestType::Text, RequestUsage::tokens(10, 10).with_latency(Duration::from_millis(120)));
        limiter.record_429_error();

        let stats = limiter.get_comprehensive_stats();
        assert_eq!(stats.name, "test/model");
        assert_eq!(stats.windows.len(), 2);
        assert_eq!(stats.windows[0].count, 1);
        assert!(!stats.can_make_request);
        assert_eq!(stats.wait_time_ms, 2_000);
        assert_eq!(stats.backoff.consecutive_429s, 1);
        assert_eq!(stats.latency.sample_count, 1);
        assert_eq!(stats.memory.request_log.length, 1);
        assert_eq!(stats.memory.request_log.windows_tracked, 2);
        assert_eq!(stats.quota.per_type_breakdown[&RequestType::Text], 1);
    }

    #[test]
    fn test_optimize_memory() {
        let (limiter, clock) = limiter(per_minute(1_000));
        for _ in 0..500 {
            limiter.record_request(RequestType::Text, RequestUsage::default());
        }
        clock.advance(Duration::from_secs(120));
        limiter.record_request(RequestType::Text, RequestUsage::default().with_latency(Duration::from_millis(5)));

        let result = limiter.optimize_memory();
        assert_eq!(result.requests_cleaned, 500);
        assert_eq!(result.memory_before.request_log.length, 501);
        assert_eq!(result.memory_after.request_log.length, 1);
        assert_eq!(result.samples_trimmed, 0);
        assert!(result.memory_after.approx_bytes <= result.memory_before.approx_bytes);
    }

    #[test]
    fn test_clock_skew_never_panics() {
        let (limiter, clock) = limiter(per_minute(5));
        for _ in 0..5 {
            limiter.record_request(RequestType::Text, RequestUsage::default());
        }

        clock.rewind(Duration::from_secs(3_600));
        assert!(!limiter.can_make_request(RequestType::Text));
        let wait = limiter.get_wait_time();
        assert!(wait <= MINUTE);
        assert_eq!(limiter.count_in_window(MINUTE), 5);
    }

    #[test]
    fn test_reset() {
        let (limiter, _clock) = limiter(per_minute(1));
        limiter.record_request(RequestType::Text, RequestUsage::default());
        limiter.record_quota_exceeded();
        assert!(!limiter.can_make_request(RequestType::Text));

        limiter.reset();
        assert!(limiter.can_make_request(RequestType::Text));
        assert_eq!(limiter.backoff_factor(), 1.0);
        assert_eq!(limiter.quota_summary().total_requests, 0);
    }

    #[test]
    fn test_builder() {
        let clock = Arc::new(ManualClock::new(T0));
        let limiter = RateLimiter::builder()
            .name("builder")
            .calls_per_minute(30)
            .calls_per_hour(600)
            .daily_quota(5_000)
            .backoff(BackoffConfig::aggressive())
            .build_limiter_with_clock(clock)
            .unwrap();

        assert_eq!(limiter.name(), "builder");
        assert_eq!(limiter.config().windows().len(), 3);
        assert!(RateLimiter::builder().calls_per_minute(0).build_limiter().is_err());
    }

    #[test]
    fn test_concurrent_record_request() {
        let (limiter, _clock) = limiter(per_minute(10_000));
        let limiter = Arc::new(limiter);
        let mut handles = vec![];

        for t in 0..8 {
            let limiter_clone = Arc::clone(&limiter);
            handles.push(std::thread::spawn(move || {
                for _ in 0..250 {
                    limiter_clone.record_request(RequestType::ALL[t % RequestType::COUNT], RequestUsage::tokens(1, 1));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(limiter.count_in_window(MINUTE), 2_000);
        let summary = limiter.quota_summary();
        assert_eq!(summary.total_requests, 2_000);
        assert_eq!(summary.total_tokens, 4_000);
        assert_eq!(summary.per_type_breakdown[&RequestType::Vision], 500);
    }
}
