use qg_types::Clock;
use qg_types::SystemClock;
use qg_types::clock::duration_to_nanos;
use tokio::time::Instant;

/// Wall-clock anchored at creation, advanced by tokio's monotonic clock
///
/// Immune to wall-clock steps after start-up, and follows tokio's paused
/// virtual time in tests so limiter cooldowns elapse as sleeps complete.
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin_nanos: u64,
    start: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::starting_at(SystemClock.now_nanos())
    }

    /// Anchor at an explicit wall-clock time
    pub fn starting_at(origin_nanos: u64) -> Self {
        Self { origin_nanos, start: Instant::now() }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_nanos(&self) -> u64 {
        self.origin_nanos.saturating_add(duration_to_nanos(self.start.elapsed()))
    }
}
