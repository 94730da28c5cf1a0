use std::collections::VecDeque;
use std::time::Duration;

use qg_types::RequestType;
use qg_types::clock::duration_to_nanos;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

/// A single admitted call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestRecord {
    /// Nanoseconds since the Unix epoch
    pub timestamp: u64,
    pub request_type: RequestType,
}

/// Diagnostic view of the request log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowMemory {
    pub length: usize,
    pub capacity: usize,
    pub windows_tracked: usize,
    /// Records dropped because the log hit its hard cap
    pub evicted_over_cap: u64,
}

/// Multi-window request log with bounded memory
///
/// Records are kept in timestamp order so every window count is two binary
/// searches away. A record is only needed while it is inside the longest
/// window; older ones are pruned in batches once the log grows past
/// `prune_multiplier` times the steady-state size, and the log is never
/// allowed past `hard_cap_multiplier` times that size.
#[derive(Debug)]
pub struct SlidingWindowCounter {
    records: VecDeque<RequestRecord>,

    /// Tracked window lengths in nanoseconds
    windows: Vec<u64>,

    /// Longest tracked window in nanoseconds
    longest: u64,

    /// Length at which pruning kicks in
    prune_threshold: usize,

    /// Absolute ceiling on `records.len()`
    hard_cap: usize,

    /// Highest timestamp seen, survives pruning
    last_timestamp: Option<u64>,

    evicted_over_cap: u64,
}

impl SlidingWindowCounter {
    pub const DEFAULT_PRUNE_MULTIPLIER: usize = 2;
    pub const DEFAULT_HARD_CAP_MULTIPLIER: usize = 4;

    /// Create a counter for `windows`, expecting about `steady_state` records
    /// inside the longest one
    pub fn new(windows: &[Duration], steady_state: usize) -> Self {
        Self::with_multipliers(windows, steady_state, Self::DEFAULT_PRUNE_MULTIPLIER, Self::DEFAULT_HARD_CAP_MULTIPLIER)
    }

    pub fn with_multipliers(windows: &[Duration], steady_state: usize, prune_multiplier: usize, hard_cap_multiplier: usize) -> Self {
        let windows: Vec<u64> = windows.iter().map(|w| duration_to_nanos(*w)).collect();
        let longest = windows.iter().copied().max().unwrap_or(0);
        let steady_state = steady_state.max(1);
        let prune_threshold = steady_state.saturating_mul(prune_multiplier.max(1));
        let hard_cap = steady_state.saturating_mul(hard_cap_multiplier.max(1)).max(prune_threshold);

        Self {
            records: VecDeque::with_capacity(steady_state.min(4_096)),
            windows,
            longest,
            prune_threshold,
            hard_cap,
            last_timestamp: None,
            evicted_over_cap: 0,
        }
    }

    /// Append an event
    ///
    /// A timestamp earlier than the last recorded one (clock stepped back) is
    /// recorded at the last timestamp so the log stays ordered.
    pub fn record(&mut self, timestamp: u64, request_type: RequestType) {
        let timestamp = self.last_timestamp.map_or(timestamp, |last| timestamp.max(last));
        self.last_timestamp = Some(timestamp);
        self.records.push_back(RequestRecord { timestamp, request_type });

        if self.records.len() > self.prune_threshold {
            let removed = self.prune(timestamp);
            debug!(removed, remaining = self.records.len(), "Pruned request log");
        }

        if self.records.len() > self.hard_cap {
            let excess = self.records.len() - self.hard_cap;
            self.records.drain(..excess);
            self.evicted_over_cap += excess as u64;
            warn!(excess, hard_cap = self.hard_cap, "Request log at hard cap, dropped oldest records");
        }
    }

    /// Drop every record outside the longest window, returning how many went
    pub fn prune(&mut self, now: u64) -> usize {
        let cutoff = self.effective_now(now).saturating_sub(self.longest);
        let keep_from = self.records.partition_point(|r| r.timestamp <= cutoff);
        self.records.drain(..keep_from);
        keep_from
    }

    /// Number of records with timestamp in `(now - window, now]`
    ///
    /// A record stops counting exactly `window` after it was made. The count
    /// is exact while the log stays under its hard cap. Once callers record
    /// past the cap the oldest records are dropped even if still inside the
    /// window, so the count saturates at `hard_cap()`; the shortfall is
    /// reported in `memory_usage().evicted_over_cap`.
    pub fn count_in_window(&self, window: Duration, now: u64) -> usize {
        self.records.len() - self.window_start(window, now)
    }

    /// Like `count_in_window`, restricted to one request type
    pub fn count_type_in_window(&self, request_type: RequestType, window: Duration, now: u64) -> usize {
        let start = self.window_start(window, now);
        self.records.range(start..).filter(|r| r.request_type == request_type).count()
    }

    /// Timestamp of the `n`-th oldest record (0-based) inside the window
    pub fn nth_in_window(&self, window: Duration, now: u64, n: usize) -> Option<u64> {
        let start = self.window_start(window, now);
        self.records.get(start.checked_add(n)?).map(|r| r.timestamp)
    }

    /// Treat a `now` earlier than the newest record as no time having passed
    #[inline]
    pub fn effective_now(&self, now: u64) -> u64 {
        self.last_timestamp.map_or(now, |last| now.max(last))
    }

    pub fn last_timestamp(&self) -> Option<u64> {
        self.last_timestamp
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn hard_cap(&self) -> usize {
        self.hard_cap
    }

    /// Release spare capacity left behind by pruning
    pub fn shrink_to_fit(&mut self) {
        self.records.shrink_to_fit();
    }

    pub fn memory_usage(&self) -> WindowMemory {
        WindowMemory {
            length: self.records.len(),
            capacity: self.records.capacity(),
            windows_tracked: self.windows.len(),
            evicted_over_cap: self.evicted_over_cap,
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.last_timestamp = None;
    }

    /// Index of the first record inside the window
    #[inline]
    fn window_start(&self, window: Duration, now: u64) -> usize {
        let cutoff = self.effective_now(now).saturating_sub(duration_to_nanos(window));
        self.records.partition_point(|r| r.timestamp <= cutoff)
    }
}
