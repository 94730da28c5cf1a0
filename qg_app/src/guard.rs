use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use qg_cache::CacheKey;
use qg_cache::CacheStats;
use qg_cache::ResponseCache;
use qg_ratelimit::Admission;
use qg_ratelimit::ComprehensiveStats;
use qg_ratelimit::RateLimiter;
use qg_ratelimit::RequestUsage;
use qg_types::Clock;
use qg_types::RequestType;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;
use tracing::warn;

use crate::config_loader::GuardConfigFile;
use crate::error::Result;

/// Shortest pause between admission checks
const MIN_POLL: Duration = Duration::from_millis(1);

/// What the provider said, as classified by the adapter
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutcome<V> {
    Success { value: V, usage: RequestUsage },
    /// HTTP 429 or equivalent
    RateLimited,
    /// Provider reports the account or model quota exhausted
    QuotaExceeded,
    /// Any other failure; the call still counts against the limits
    Failed(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GuardError {
    #[error("Provider throttled the request, retry after {retry_after:?}")]
    Throttled { retry_after: Duration },

    #[error("Provider quota exceeded, retry after {retry_after:?}")]
    QuotaExceeded { retry_after: Duration },

    #[error("Not admitted within {waited:?}, next slot in {retry_after:?}")]
    AdmissionTimeout { waited: Duration, retry_after: Duration },

    #[error("Request type {0} is not enabled")]
    RequestTypeDisabled(RequestType),

    #[error("Provider call failed: {0}")]
    Provider(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardStats {
    pub limiter: ComprehensiveStats,
    pub cache: CacheStats,
}

/// One provider's limiter and response cache behind a single call path
///
/// Cache hits never touch the limiter. Misses wait for admission (up to
/// `max_wait`), make the call, and feed the outcome back into the limiter.
pub struct ProviderGuard<V> {
    limiter: Arc<RateLimiter>,
    cache: Arc<ResponseCache<V>>,
    max_wait: Duration,
}

impl<V: Clone> ProviderGuard<V> {
    pub fn new(limiter: Arc<RateLimiter>, cache: Arc<ResponseCache<V>>, max_wait: Duration) -> Self {
        Self { limiter, cache, max_wait }
    }

    /// Build limiter and cache from a config file, sharing `clock`
    pub fn from_config(config: &GuardConfigFile, clock: Arc<dyn Clock>) -> Result<Self> {
        let limiter = RateLimiter::with_clock(config.limiter_config()?, clock.clone())?;
        let cache = ResponseCache::with_clock(config.cache.clone(), clock)?;
        Ok(Self::new(Arc::new(limiter), Arc::new(cache), config.max_wait()))
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn cache(&self) -> &Arc<ResponseCache<V>> {
        &self.cache
    }

    /// Serve from cache or make `call` once admitted
    ///
    /// Without a `key` the response is never cached. `ttl` of `None` uses the
    /// cache's default.
    pub async fn call<F, Fut>(&self, request_type: RequestType, key: Option<CacheKey>, ttl: Option<Duration>, call: F) -> std::result::Result<V, GuardError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ProviderOutcome<V>>,
    {
        if let Some(key) = &key {
            if let Some(value) = self.cache.get(key) {
                debug!(key = %key, "Served from cache");
                return Ok(value);
            }
        }

        self.wait_for_admission(request_type).await?;

        let started = Instant::now();
        match call().await {
            ProviderOutcome::Success { value, usage } => {
                let usage = if usage.latency_ms.is_none() { usage.with_latency(started.elapsed()) } else { usage };
                self.limiter.record_request(request_type, usage);
                if let Some(key) = key {
                    match ttl {
                        Some(ttl) => self.cache.set(key, value.clone(), ttl),
                        None => self.cache.set_default(key, value.clone()),
                    }
                }
                Ok(value)
            }
            ProviderOutcome::RateLimited => {
                self.limiter.record_429_error();
                Err(GuardError::Throttled { retry_after: self.limiter.get_wait_time() })
            }
            ProviderOutcome::QuotaExceeded => {
                self.limiter.record_quota_exceeded();
                Err(GuardError::QuotaExceeded { retry_after: self.limiter.get_wait_time() })
            }
            ProviderOutcome::Failed(reason) => {
                self.limiter.record_attempt(request_type, RequestUsage::default().with_latency(started.elapsed()));
                warn!(limiter = %self.limiter.name(), request_type = %request_type, %reason, "Provider call failed");
                Err(GuardError::Provider(reason))
            }
        }
    }

    /// Sleep until the limiter admits `request_type` or the budget runs out
    pub async fn wait_for_admission(&self, request_type: RequestType) -> std::result::Result<(), GuardError> {
        let started = Instant::now();
        loop {
            match self.limiter.check(request_type) {
                Admission::Allowed => return Ok(()),
                Admission::RequestTypeDisabled(request_type) => return Err(GuardError::RequestTypeDisabled(request_type)),
                denied => {
                    let retry_after = self.limiter.get_wait_time().max(denied.retry_after()).max(MIN_POLL);
                    let waited = started.elapsed();
                    if waited + retry_after > self.max_wait {
                        return Err(GuardError::AdmissionTimeout { waited, retry_after });
                    }
                    debug!(limiter = %self.limiter.name(), ?denied, wait_ms = retry_after.as_millis() as u64, "Waiting for admission");
                    tokio::time::sleep(retry_after).await;
                }
            }
        }
    }

    pub fn stats(&self) -> GuardStats {
        GuardStats { limiter: self.limiter.get_comprehensive_stats(), cache: self.cache.get_stats() }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use qg_cache::CacheConfig;
    use qg_ratelimit::RateLimiterConfig;

    use super::*;
    use crate::clock::TokioClock;

    const T0: u64 = 1_710_504_000_000_000_000;

    fn guard(limiter: RateLimiterConfig, max_wait: Duration) -> ProviderGuard<String> {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::starting_at(T0));
        let limiter = RateLimiter::with_clock(limiter, clock.clone()).unwrap();
        let cache = ResponseCache::with_clock(CacheConfig::new(100, Duration::from_secs(600)), clock).unwrap();
        ProviderGuard::new(Arc::new(limiter), Arc::new(cache), max_wait)
    }

    fn ok(value: &str) -> ProviderOutcome<String> {
        ProviderOutcome::Success { value: value.to_string(), usage: RequestUsage::tokens(10, 20) }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_skips_provider() {
        let guard = guard(RateLimiterConfig::default(), Duration::from_secs(30));
        let calls = AtomicUsize::new(0);
        let key = CacheKey::from("prompt-1");

        for _ in 0..3 {
            let value = guard
                .call(RequestType::Text, Some(key.clone()), None, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    ok("answer")
                })
                .await
                .unwrap();
            assert_eq!(value, "answer");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = guard.stats();
        assert_eq!(stats.cache.hits, 2);
        assert_eq!(stats.limiter.quota.total_requests, 1);
        assert_eq!(stats.limiter.quota.total_tokens, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_window_then_proceeds() {
        let config = RateLimiterConfig { calls_per_minute: 2, ..Default::default() };
        let guard = guard(config, Duration::from_secs(120));
        let started = Instant::now();

        for i in 0..3 {
            guard.call(RequestType::Text, None, None, || async move { ok(&format!("r{i}")) }).await.unwrap();
        }

        // Third call waited for the first to leave the minute window
        assert!(started.elapsed() >= Duration::from_secs(60));
        assert_eq!(guard.limiter().quota_summary().total_requests, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_timeout() {
        let config = RateLimiterConfig { calls_per_minute: 1, ..Default::default() };
        let guard = guard(config, Duration::from_secs(5));

        guard.call(RequestType::Text, None, None, || async { ok("first") }).await.unwrap();
        let err = guard.call(RequestType::Text, None, None, || async { ok("second") }).await.unwrap_err();

        match err {
            GuardError::AdmissionTimeout { waited, retry_after } => {
                assert_eq!(waited, Duration::ZERO);
                assert_eq!(retry_after, Duration::from_secs(60));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_feeds_backoff() {
        let guard = guard(RateLimiterConfig::default(), Duration::from_secs(30));

        let err = guard.call(RequestType::Text, None, None, || async { ProviderOutcome::<String>::RateLimited }).await.unwrap_err();
        assert_eq!(err, GuardError::Throttled { retry_after: Duration::from_secs(2) });
        assert_eq!(guard.limiter().backoff_factor(), 2.0);

        // Next call sleeps out the cooldown, then succeeds
        let started = Instant::now();
        guard.call(RequestType::Text, None, None, || async { ok("after") }).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_exceeded_mapping() {
        let guard = guard(RateLimiterConfig::default(), Duration::from_secs(10));

        let err = guard.call(RequestType::Text, None, None, || async { ProviderOutcome::<String>::QuotaExceeded }).await.unwrap_err();
        assert_eq!(err, GuardError::QuotaExceeded { retry_after: Duration::from_secs(30) });
        assert_eq!(guard.limiter().get_optimal_batch_size(), 4);

        // 30s quota cooldown exceeds the 10s budget
        let err = guard.call(RequestType::Text, None, None, || async { ok("x") }).await.unwrap_err();
        assert!(matches!(err, GuardError::AdmissionTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_type_and_provider_failure() {
        let config = RateLimiterConfig { enabled_request_types: vec![RequestType::Text], ..Default::default() };
        let guard = guard(config, Duration::from_secs(10));

        let err = guard.call(RequestType::Vision, None, None, || async { ok("x") }).await.unwrap_err();
        assert_eq!(err, GuardError::RequestTypeDisabled(RequestType::Vision));

        let key = CacheKey::from("k");
        let err = guard
            .call(RequestType::Text, Some(key.clone()), None, || async { ProviderOutcome::<String>::Failed("bad gateway".to_string()) })
            .await
            .unwrap_err();
        assert_eq!(err, GuardError::Provider("bad gateway".to_string()));
        assert!(!guard.cache().contains(&key));
        assert_eq!(guard.limiter().quota_summary().total_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_failure_keeps_backoff() {
        let guard = guard(RateLimiterConfig::default(), Duration::from_secs(30));
        guard.call(RequestType::Text, None, None, || async { ProviderOutcome::<String>::RateLimited }).await.unwrap_err();
        assert_eq!(guard.limiter().backoff_factor(), 2.0);

        // Admitted after the cooldown, but a 5xx is no sign of recovery
        let err = guard.call(RequestType::Text, None, None, || async { ProviderOutcome::<String>::Failed("502".to_string()) }).await.unwrap_err();
        assert_eq!(err, GuardError::Provider("502".to_string()));
        assert_eq!(guard.limiter().backoff_factor(), 2.0);

        guard.call(RequestType::Text, None, None, || async { ok("recovered") }).await.unwrap();
        assert_eq!(guard.limiter().backoff_factor(), 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_tasks_share_guard() {
        let config = RateLimiterConfig { calls_per_minute: 10, ..Default::default() };
        let guard = Arc::new(guard(config, Duration::from_secs(600)));
        let mut handles = vec![];

        for i in 0..20 {
            let guard = Arc::clone(&guard);
            handles.push(tokio::spawn(async move { guard.call(RequestType::Text, Some(CacheKey::from(format!("p{i}"))), None, || async move { ok(&format!("v{i}")) }).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        let stats = guard.stats();
        assert_eq!(stats.limiter.quota.total_requests, 20);
        assert_eq!(stats.cache.current_size, 20);
        assert!(stats.limiter.windows[0].count <= 10);
    }
}
