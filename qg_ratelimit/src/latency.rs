use std::collections::VecDeque;

use serde::Serialize;

/// Latency distribution over the retained samples
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub sample_count: usize,
    pub mean_ms: Option<f64>,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub max_ms: Option<f64>,
    pub trims: u64,
}

/// Recent call latencies with an explicit memory bound
///
/// Holds at most `max_samples`. When full, the oldest samples are dropped so
/// that `retained` remain, including the one being pushed.
#[derive(Debug, Clone)]
pub struct LatencySamples {
    samples: VecDeque<f64>,
    max_samples: usize,
    retained: usize,
    trims: u64,
}

impl LatencySamples {
    pub fn new(max_samples: usize, retained: usize) -> Self {
        let max_samples = max_samples.max(1);
        let retained = retained.clamp(1, max_samples);
        Self { samples: VecDeque::with_capacity(max_samples), max_samples, retained, trims: 0 }
    }

    pub fn push(&mut self, latency_ms: f64) {
        if !latency_ms.is_finite() || latency_ms < 0.0 {
            return;
        }

        if self.samples.len() >= self.max_samples {
            let drop = self.samples.len() + 1 - self.retained;
            self.samples.drain(..drop);
            self.trims += 1;
        }
        self.samples.push_back(latency_ms);
    }

    /// Trim down to the retained size now; returns how many were dropped
    pub fn trim(&mut self) -> usize {
        let drop = self.samples.len().saturating_sub(self.retained);
        if drop > 0 {
            self.samples.drain(..drop);
            self.trims += 1;
        }
        drop
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn stats(&self) -> LatencyStats {
        if self.samples.is_empty() {
            return LatencyStats { trims: self.trims, ..Default::default() };
        }

        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_unstable_by(f64::total_cmp);

        let percentile = |p: f64| {
            let index = ((sorted.len() as f64 * p / 100.0) as usize).min(sorted.len() - 1);
            sorted[index]
        };

        LatencyStats {
            sample_count: sorted.len(),
            mean_ms: Some(sorted.iter().sum::<f64>() / sorted.len() as f64),
            p50_ms: Some(percentile(50.0)),
            p95_ms: Some(percentile(95.0)),
            max_ms: sorted.last().copied(),
            trims: self.trims,
        }
    }
}
