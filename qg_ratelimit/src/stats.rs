use serde::Serialize;

use crate::backoff::BackoffStats;
use crate::config::WindowKind;
use crate::latency::LatencyStats;
use crate::quota::QuotaSummary;
use crate::sliding_window::WindowMemory;

/// Usage of one sliding window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowStats {
    pub window: WindowKind,
    pub limit: u32,
    pub count: usize,
    pub remaining: u32,
    pub utilization: f64,
}

/// Memory held by the limiter's bounded buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryFootprint {
    pub request_log: WindowMemory,
    pub request_log_hard_cap: usize,
    pub latency_samples: usize,
    pub latency_capacity: usize,
    /// Rough heap bytes of both buffers
    pub approx_bytes: usize,
}

/// Result of an on-demand `optimize_memory`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryOptimization {
    pub requests_cleaned: usize,
    pub samples_trimmed: usize,
    pub memory_before: MemoryFootprint,
    pub memory_after: MemoryFootprint,
}

/// Everything a health or observability endpoint may want
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComprehensiveStats {
    pub name: String,
    pub windows: Vec<WindowStats>,
    pub utilization: f64,
    pub can_make_request: bool,
    pub wait_time_ms: u64,
    pub optimal_batch_size: usize,
    pub quota: QuotaSummary,
    pub backoff: BackoffStats,
    pub latency: LatencyStats,
    pub memory: MemoryFootprint,
}

/// Lighter summary for usage dashboards
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSummary {
    pub name: String,
    pub windows: Vec<WindowStats>,
    pub quota: QuotaSummary,
}
