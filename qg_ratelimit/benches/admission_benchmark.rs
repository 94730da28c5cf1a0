use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use qg_ratelimit::RateLimiter;
use qg_ratelimit::RateLimiterConfig;
use qg_ratelimit::RequestUsage;
use qg_ratelimit::SlidingWindowCounter;
use qg_types::ManualClock;
use qg_types::RequestType;

const T0: Duration = Duration::from_secs(1_700_000_000);

fn full_limiter() -> (RateLimiter, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(T0));
    let config = RateLimiterConfig { calls_per_minute: 10_000, calls_per_hour: Some(100_000), daily_quota: Some(1_000_000), ..Default::default() };
    let limiter = RateLimiter::with_clock(config, clock.clone()).unwrap();
    for _ in 0..5_000 {
        limiter.record_request(RequestType::Text, RequestUsage::tokens(100, 50));
        clock.advance(Duration::from_millis(10));
    }
    (limiter, clock)
}

fn bench_can_make_request(c: &mut Criterion) {
    let (limiter, _clock) = full_limiter();

    c.bench_function("can_make_request_three_windows", |b| {
        b.iter(|| black_box(limiter.can_make_request(black_box(RequestType::Text))));
    });
}

fn bench_record_request(c: &mut Criterion) {
    let (limiter, clock) = full_limiter();

    c.bench_function("record_request", |b| {
        b.iter(|| {
            limiter.record_request(black_box(RequestType::Text), black_box(RequestUsage::tokens(100, 50)));
            clock.advance(Duration::from_millis(1));
        });
    });
}

fn bench_get_wait_time(c: &mut Criterion) {
    let (limiter, _clock) = full_limiter();

    c.bench_function("get_wait_time", |b| {
        b.iter(|| black_box(limiter.get_wait_time()));
    });
}

fn bench_count_in_window(c: &mut Criterion) {
    let windows = [Duration::from_secs(60), Duration::from_secs(3_600)];
    let mut counter = SlidingWindowCounter::new(&windows, 100_000);
    let base = 1_700_000_000_000_000_000u64;
    for i in 0..100_000u64 {
        counter.record(base + i * 10_000_000, RequestType::Text);
    }
    let now = base + 100_000 * 10_000_000;

    c.bench_function("count_in_window_100k", |b| {
        b.iter(|| black_box(counter.count_in_window(black_box(windows[0]), now)));
    });
}

criterion_group!(benches, bench_can_make_request, bench_record_request, bench_get_wait_time, bench_count_in_window);
criterion_main!(benches);
