use std::collections::BTreeMap;

use qg_types::RequestType;
use qg_types::clock::NANOS_PER_DAY;
use qg_types::clock::utc_date;
use qg_types::clock::utc_day;
use serde::Serialize;
use time::Date;
use tracing::info;

/// Token, cost and per-type bookkeeping for one calendar day (UTC)
///
/// The day rolls over lazily: the first `record` on a later day zeroes the
/// counters. Read-only queries on a later day report the zeroed view without
/// mutating anything.
#[derive(Debug, Clone)]
pub struct QuotaTracker {
    input_tokens_used: u64,
    output_tokens_used: u64,
    total_tokens_used: u64,
    total_cost: f64,
    total_requests: u64,
    per_type_counts: [u64; RequestType::COUNT],
    daily_quota_limit: Option<u32>,
    daily_token_limit: Option<u64>,
    /// UTC day number the counters belong to
    current_day: u64,
    rollovers: u64,
}

/// Usage summary for a single calendar day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaSummary {
    pub day: Date,
    pub total_requests: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub avg_tokens_per_request: f64,
    pub total_cost: f64,
    pub per_type_breakdown: BTreeMap<RequestType, u64>,
    pub daily_quota_limit: Option<u32>,
    pub remaining_daily_requests: Option<u64>,
    pub daily_token_limit: Option<u64>,
}

impl QuotaTracker {
    pub fn new(daily_quota_limit: Option<u32>, daily_token_limit: Option<u64>, now: u64) -> Self {
        Self {
            input_tokens_used: 0,
            output_tokens_used: 0,
            total_tokens_used: 0,
            total_cost: 0.0,
            total_requests: 0,
            per_type_counts: [0; RequestType::COUNT],
            daily_quota_limit,
            daily_token_limit,
            current_day: utc_day(now),
            rollovers: 0,
        }
    }

    /// Account for one completed call
    pub fn record(&mut self, request_type: RequestType, input_tokens: u64, output_tokens: u64, cost: f64, now: u64) {
        self.roll_over_if_needed(now);

        self.input_tokens_used = self.input_tokens_used.saturating_add(input_tokens);
        self.output_tokens_used = self.output_tokens_used.saturating_add(output_tokens);
        self.total_tokens_used = self.total_tokens_used.saturating_add(input_tokens.saturating_add(output_tokens));
        // Counters only move forward within a day
        if cost.is_finite() && cost > 0.0 {
            self.total_cost += cost;
        }
        self.total_requests += 1;
        self.per_type_counts[request_type.index()] += 1;
    }

    /// Whether `additional_tokens` more fit under the model's daily ceiling
    pub fn can_afford(&self, additional_tokens: u64, now: u64) -> bool {
        match self.daily_token_limit {
            None => true,
            Some(limit) => {
                let used = if self.is_stale(now) { 0 } else { self.total_tokens_used };
                used.saturating_add(additional_tokens) <= limit
            }
        }
    }

    /// Start a new day if `now` is past the tracked one
    ///
    /// A clock that steps back never rolls the day.
    pub fn roll_over_if_needed(&mut self, now: u64) -> bool {
        if !self.is_stale(now) {
            return false;
        }

        info!(
            previous_day = %utc_date(self.current_day.saturating_mul(NANOS_PER_DAY)),
            requests = self.total_requests,
            tokens = self.total_tokens_used,
            cost = self.total_cost,
            "Daily quota rollover"
        );
        self.reset_daily();
        self.current_day = utc_day(now);
        self.rollovers += 1;
        true
    }

    /// Zero token, cost and per-type counters
    pub fn reset_daily(&mut self) {
        self.input_tokens_used = 0;
        self.output_tokens_used = 0;
        self.total_tokens_used = 0;
        self.total_cost = 0.0;
        self.total_requests = 0;
        self.per_type_counts = [0; RequestType::COUNT];
    }

    pub fn summary(&self, now: u64) -> QuotaSummary {
        let (day, view) = if self.is_stale(now) {
            let mut fresh = self.clone();
            fresh.reset_daily();
            (utc_day(now), fresh)
        } else {
            (self.current_day, self.clone())
        };

        let avg_tokens_per_request = if view.total_requests == 0 { 0.0 } else { view.total_tokens_used as f64 / view.total_requests as f64 };
        let per_type_breakdown = RequestType::ALL.iter().map(|rt| (*rt, view.per_type_counts[rt.index()])).collect();

        QuotaSummary {
            day: utc_date(day.saturating_mul(NANOS_PER_DAY)),
            total_requests: view.total_requests,
            input_tokens: view.input_tokens_used,
            output_tokens: view.output_tokens_used,
            total_tokens: view.total_tokens_used,
            avg_tokens_per_request,
            total_cost: view.total_cost,
            per_type_breakdown,
            daily_quota_limit: self.daily_quota_limit,
            remaining_daily_requests: self.daily_quota_limit.map(|limit| u64::from(limit).saturating_sub(view.total_requests)),
            daily_token_limit: self.daily_token_limit,
        }
    }

    pub fn total_tokens_used(&self) -> u64 {
        self.total_tokens_used
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests
    }

    pub fn count_for(&self, request_type: RequestType) -> u64 {
        self.per_type_counts[request_type.index()]
    }

    pub fn rollovers(&self) -> u64 {
        self.rollovers
    }

    #[inline]
    fn is_stale(&self, now: u64) -> bool {
        utc_day(now) > self.current_day
    }
}
