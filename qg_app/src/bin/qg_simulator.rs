use std::sync::Arc;
use std::time::Duration;

use qg_app::GuardError;
use qg_app::ProviderGuard;
use qg_app::ProviderOutcome;
use qg_app::cli;
use qg_app::config_loader;
use qg_app::config_loader::GuardConfigFile;
use qg_app::config_loader::SimulationConfig;
use qg_app::tracing_setup;
use qg_cache::CacheKey;
use qg_ratelimit::RequestUsage;
use qg_types::Clock;
use qg_types::ManualClock;
use qg_types::SystemClock;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;
use tracing::debug;
use tracing::info;
use tracing::warn;

const CONFIG_PATH: &str = "config/simulator.toml";

/// Attempts per request before it is counted as dropped
const MAX_ATTEMPTS: u32 = 50;

#[derive(Debug, Default)]
struct Tally {
    served: u64,
    provider_calls: u64,
    throttled: u64,
    quota_exceeded: u64,
    waits: u64,
    dropped: u64,
}

/// Inclusive range that tolerates `high < low` in the config
fn between(rng: &mut StdRng, low: u64, high: u64) -> u64 {
    rng.gen_range(low..=high.max(low))
}

fn simulate_outcome(rng: &mut StdRng, sim: &SimulationConfig, prompt: u64) -> ProviderOutcome<String> {
    let roll: f64 = rng.gen();
    if roll < sim.throttle_probability {
        return ProviderOutcome::RateLimited;
    }
    if roll < sim.throttle_probability + sim.quota_probability {
        return ProviderOutcome::QuotaExceeded;
    }

    let latency = Duration::from_millis(between(rng, sim.min_latency_ms, sim.max_latency_ms));
    let input_tokens = between(rng, 50, 2_000);
    let output_tokens = between(rng, 20, 800);
    let usage = RequestUsage::tokens(input_tokens, output_tokens).with_cost((input_tokens + 3 * output_tokens) as f64 * 1e-6).with_latency(latency);
    ProviderOutcome::Success { value: format!("completion for prompt {prompt}"), usage }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if cli::has_flag("dump-config") {
        print!("{}", GuardConfigFile::default().to_toml()?);
        return Ok(());
    }

    let loaded = config_loader::load_guard_config(CONFIG_PATH);
    let logging = loaded.as_ref().map(|config| config.logging.clone()).unwrap_or_default();
    let _guard = tracing_setup::init_from_config("qg_simulator", &logging);

    let mut config = match loaded {
        Ok(config) => {
            info!("Loaded guard config from {CONFIG_PATH}");
            config
        }
        Err(err) => {
            warn!("Failed to load guard config from {}: {}. Using defaults.", CONFIG_PATH, err);
            GuardConfigFile::default()
        }
    };

    let provider = cli::get_provider(&config.provider);
    if provider != config.provider {
        config.provider = provider;
        config.limiter = None;
        config.preset.get_or_insert_with(|| "tier1".to_string());
    }

    // Simulated time only moves when this loop advances it, so the guard must never sleep
    config.max_wait_seconds = 0.0;

    let limiter_config = config.limiter_config()?;
    let sim = config.simulation.clone();
    info!(
        provider = %config.provider,
        limiter = %limiter_config.name,
        calls_per_minute = limiter_config.calls_per_minute,
        requests = sim.requests,
        seed = sim.seed,
        "Starting provider simulation"
    );

    let clock = Arc::new(ManualClock::from_nanos(SystemClock.now_nanos()));
    let guard: ProviderGuard<String> = ProviderGuard::from_config(&config, clock.clone())?;
    let request_types = limiter_config.enabled_request_types.clone();

    let mut rng = StdRng::seed_from_u64(sim.seed);
    let mut tally = Tally::default();
    let started = clock.now();

    for n in 0..sim.requests {
        let request_type = request_types[(n as usize) % request_types.len()];
        let prompt = rng.gen_range(0..sim.prompt_pool.max(1));
        let key = CacheKey::from_request(&json!({"model": limiter_config.name, "prompt": prompt, "request_id": n}))?;

        let mut attempts = 0;
        loop {
            attempts += 1;
            if attempts > MAX_ATTEMPTS {
                tally.dropped += 1;
                warn!(request = n, "Dropping request after {MAX_ATTEMPTS} attempts");
                break;
            }

            let calls_before = guard.limiter().quota_summary().total_requests;
            let outcome = simulate_outcome(&mut rng, &sim, prompt);
            let latency = match &outcome {
                ProviderOutcome::Success { usage, .. } => usage.latency_ms.map_or(Duration::ZERO, |ms| Duration::from_micros((ms * 1_000.0) as u64)),
                _ => Duration::from_millis(sim.min_latency_ms),
            };

            match guard.call(request_type, Some(key.clone()), None, move || async move { outcome }).await {
                Ok(_) => {
                    tally.served += 1;
                    if guard.limiter().quota_summary().total_requests > calls_before {
                        tally.provider_calls += 1;
                        clock.advance(latency);
                    }
                    break;
                }
                Err(GuardError::AdmissionTimeout { retry_after, .. }) => {
                    tally.waits += 1;
                    debug!(request = n, wait_ms = retry_after.as_millis() as u64, "Waiting for admission");
                    clock.advance(retry_after);
                }
                Err(GuardError::Throttled { retry_after }) => {
                    tally.throttled += 1;
                    clock.advance(latency + retry_after);
                }
                Err(GuardError::QuotaExceeded { retry_after }) => {
                    tally.quota_exceeded += 1;
                    clock.advance(latency + retry_after);
                }
                Err(err) => {
                    tally.dropped += 1;
                    warn!(request = n, %err, "Request failed");
                    break;
                }
            }
        }

        if (n + 1) % sim.report_every.max(1) == 0 {
            let cleaned = guard.limiter().optimize_memory();
            let expired = guard.cache().cleanup_expired();
            info!(
                request = n + 1,
                simulated_s = (clock.now() - started).as_secs(),
                requests_cleaned = cleaned.requests_cleaned,
                cache_expired = expired,
                stats = %serde_json::to_string(&guard.stats())?,
                "Progress"
            );
        }
    }

    let stats = guard.stats();
    info!(
        served = tally.served,
        provider_calls = tally.provider_calls,
        cache_hit_rate = stats.cache.hit_rate(),
        throttled = tally.throttled,
        quota_exceeded = tally.quota_exceeded,
        admission_waits = tally.waits,
        dropped = tally.dropped,
        simulated_s = (clock.now() - started).as_secs(),
        "Simulation finished"
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
