use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use time::Date;
use time::OffsetDateTime;

pub const NANOS_PER_SEC: u64 = 1_000_000_000;
pub const NANOS_PER_DAY: u64 = 86_400 * NANOS_PER_SEC;

/// Wall-clock time source
///
/// Timestamps are nanoseconds since the Unix epoch. Implementations may step
/// backwards (NTP corrections, manual clocks); consumers compute elapsed time
/// with saturating arithmetic.
pub trait Clock: Send + Sync {
    /// Current time in nanoseconds since the Unix epoch
    fn now_nanos(&self) -> u64;

    /// Current time as a `Duration` since the Unix epoch
    fn now(&self) -> Duration {
        Duration::from_nanos(self.now_nanos())
    }
}

/// Clock backed by `SystemTime`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now_nanos(&self) -> u64 {
        // A system clock set before 1970 reads as the epoch
        SystemTime::now().duration_since(UNIX_EPOCH).map(duration_to_nanos).unwrap_or(0)
    }
}

/// Manually driven clock for tests and simulations
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    /// Create a clock frozen at `start` since the Unix epoch
    pub fn new(start: Duration) -> Self {
        Self { nanos: AtomicU64::new(duration_to_nanos(start)) }
    }

    /// Create a clock frozen at the given nanosecond timestamp
    pub fn from_nanos(nanos: u64) -> Self {
        Self { nanos: AtomicU64::new(nanos) }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(duration_to_nanos(by), Ordering::AcqRel);
    }

    /// Move the clock backward, saturating at the epoch
    pub fn rewind(&self, by: Duration) {
        let by = duration_to_nanos(by);
        let _ = self.nanos.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(by)));
    }

    /// Jump to an absolute timestamp
    pub fn set(&self, nanos: u64) {
        self.nanos.store(nanos, Ordering::Release);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_nanos(&self) -> u64 {
        self.nanos.load(Ordering::Acquire)
    }
}

/// Convert seconds to nanoseconds
#[inline(always)]
pub const fn secs_to_nanos(secs: u64) -> u64 {
    secs * NANOS_PER_SEC
}

/// Convert fractional seconds to nanoseconds, clamping negatives to zero
#[inline]
pub fn secs_f64_to_nanos(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 { (secs * NANOS_PER_SEC as f64) as u64 } else { 0 }
}

/// Convert duration to nanoseconds, saturating at `u64::MAX`
#[inline(always)]
pub fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// UTC day number (days since the Unix epoch) of a timestamp
#[inline(always)]
pub const fn utc_day(nanos: u64) -> u64 {
    nanos / NANOS_PER_DAY
}

/// UTC calendar date of a timestamp
pub fn utc_date(nanos: u64) -> Date {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos)).map(|dt| dt.date()).unwrap_or(Date::MIN)
}
