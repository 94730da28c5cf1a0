use std::path::Path;
use std::time::Duration;

use config::Config;
use config::File;
use config::FileFormat;
use qg_cache::CacheConfig;
use qg_ratelimit::BackoffConfig;
use qg_ratelimit::RateLimiterConfig;
use qg_ratelimit::providers;
use serde::Deserialize;
use serde::Serialize;

use crate::error::AppError;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub dir: String,
    /// Default level when `RUST_LOG` is unset
    pub level: String,
    pub stdout: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { dir: "./logs".to_string(), level: "info".to_string(), stdout: true }
    }
}

/// Knobs for the simulated provider driven by `qg_simulator`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub requests: u64,
    pub seed: u64,
    /// Chance a call comes back 429
    pub throttle_probability: f64,
    /// Chance a call comes back quota-exceeded
    pub quota_probability: f64,
    /// Distinct prompts; repeats are served from the cache
    pub prompt_pool: u64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    /// Log stats every this many requests
    pub report_every: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            requests: 2_000,
            seed: 42,
            throttle_probability: 0.03,
            quota_probability: 0.005,
            prompt_pool: 400,
            min_latency_ms: 150,
            max_latency_ms: 900,
            report_every: 250,
        }
    }
}

/// Everything needed to guard one provider
///
/// The limiter comes from an explicit `[limiter]` table if present,
/// otherwise from the named `preset` for `provider`, otherwise from defaults.
/// A `[backoff]` table overrides whichever was chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfigFile {
    pub provider: String,
    pub preset: Option<String>,
    /// Longest a call may wait for admission before giving up
    pub max_wait_seconds: f64,
    pub limiter: Option<RateLimiterConfig>,
    pub backoff: Option<BackoffConfig>,
    pub cache: CacheConfig,
    pub logging: LogConfig,
    pub simulation: SimulationConfig,
}

impl Default for GuardConfigFile {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            preset: Some("tier1".to_string()),
            max_wait_seconds: 30.0,
            limiter: None,
            backoff: None,
            cache: CacheConfig::default(),
            logging: LogConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl GuardConfigFile {
    /// Resolve and validate the limiter configuration
    pub fn limiter_config(&self) -> Result<RateLimiterConfig> {
        let mut limiter = match (&self.limiter, &self.preset) {
            (Some(limiter), _) => limiter.clone(),
            (None, Some(tier)) => providers::preset(&self.provider, tier)
                .ok_or_else(|| AppError::UnknownPreset { provider: self.provider.clone(), tier: tier.clone() })?,
            (None, None) => RateLimiterConfig { name: self.provider.clone(), ..Default::default() },
        };
        if let Some(backoff) = &self.backoff {
            limiter.backoff = backoff.clone();
        }
        limiter.validate()?;
        Ok(limiter)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_wait_seconds).unwrap_or(Duration::ZERO)
    }

    pub fn validate(&self) -> Result<()> {
        self.limiter_config()?;
        self.cache.validate()?;
        Ok(())
    }

    /// Render as TOML, e.g. to seed a new config file
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

pub fn load_guard_config<P: AsRef<Path>>(path: P) -> Result<GuardConfigFile> {
    let config = Config::builder().add_source(File::from(path.as_ref())).build()?;
    let file: GuardConfigFile = config.try_deserialize()?;
    file.validate()?;
    Ok(file)
}

pub fn load_guard_config_from_str(contents: &str) -> Result<GuardConfigFile> {
    let config = Config::builder().add_source(File::from_str(contents, FileFormat::Toml)).build()?;
    let file: GuardConfigFile = config.try_deserialize()?;
    file.validate()?;
    Ok(file)
}

/// Load guard config with fallback to default
pub fn load_guard_config_or_default(path: &str) -> GuardConfigFile {
    match load_guard_config(path) {
        Ok(config) => {
            tracing::info!("Loaded guard config from {path}");
            config
        }
        Err(err) => {
            tracing::warn!("Failed to load guard config from {}: {}. Using defaults.", path, err);
            GuardConfigFile::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use qg_types::RequestType;

    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GuardConfigFile::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.limiter_config().unwrap().name, "openai/tier1");
        assert_eq!(config.max_wait(), Duration::from_secs(30));
    }

    #[test]
    fn test_preset_with_backoff_override() {
        let config = load_guard_config_from_str(
            r#"
            provider = "anthropic"
            preset = "conservative"

            [backoff]
            max_wait_seconds = 60.0

            [cache]
            max_size = 50
            "#,
        )
        .unwrap();

        let limiter = config.limiter_config().unwrap();
        assert_eq!(limiter.name, "anthropic/conservative");
        assert_eq!(limiter.backoff.max_wait_seconds, 60.0);
        assert_eq!(limiter.backoff.base, 2.0);
        assert_eq!(config.cache.max_size, 50);
        assert_eq!(config.cache.default_ttl_seconds, 3_600);
    }

    #[test]
    fn test_explicit_limiter_table() {
        let config = load_guard_config_from_str(
            r#"
            provider = "internal"

            [limiter]
            name = "internal/llm"
            calls_per_minute = 20
            daily_quota = 500
            enabled_request_types = ["text", "streaming"]
            "#,
        )
        .unwrap();

        let limiter = config.limiter_config().unwrap();
        assert_eq!(limiter.calls_per_minute, 20);
        assert_eq!(limiter.daily_quota, Some(500));
        assert_eq!(limiter.enabled_request_types, vec![RequestType::Text, RequestType::Streaming]);
    }

    #[test]
    fn test_invalid_values_rejected_on_load() {
        let err = load_guard_config_from_str("[limiter]\ncalls_per_minute = 0\n");
        assert!(matches!(err, Err(AppError::RateLimit(_))));

        let err = load_guard_config_from_str("[cache]\nmax_size = 0\n");
        assert!(matches!(err, Err(AppError::Cache(_))));

        let err = load_guard_config_from_str("provider = \"openai\"\npreset = \"platinum\"\n");
        assert!(matches!(err, Err(AppError::UnknownPreset { .. })));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = load_guard_config_or_default("does/not/exist.toml");
        assert_eq!(config, GuardConfigFile::default());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = GuardConfigFile::default();
        let rendered = config.to_toml().unwrap();
        assert_eq!(load_guard_config_from_str(&rendered).unwrap(), config);
    }
}
