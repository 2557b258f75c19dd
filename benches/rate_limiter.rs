//! # Gate Benchmarks
//!
//! Hot paths of a submission: the per-axis window check, the dual-axis
//! admission, and input validation.
//!
//! Run with: `cargo bench`

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use waitlist_gate::{
    validate_email, validate_survey, Axis, DualAxisLimiter, KeyedLimiter, ManualClock,
    RateLimitPolicy, SurveyRules, SystemClock, WindowConfig,
};

fn keyed(max_attempts: u32, max_keys: usize) -> KeyedLimiter {
    KeyedLimiter::new(
        Axis::Ip,
        WindowConfig::per_day(max_attempts),
        max_keys,
        Arc::new(SystemClock),
    )
}

/// Repeated checks against one key: admitted, then denied
fn bench_single_key(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_key");
    group.throughput(Throughput::Elements(1));

    group.bench_function("admitted", |b| {
        let limiter = keyed(u32::MAX, 1000);
        b.iter(|| std::hint::black_box(limiter.check("203.0.113.7")));
    });

    group.bench_function("denied", |b| {
        let limiter = keyed(3, 1000);
        for _ in 0..3 {
            limiter.check("203.0.113.7");
        }
        b.iter(|| std::hint::black_box(limiter.check("203.0.113.7")));
    });

    group.finish();
}

/// First sight of a key: entry creation dominates
fn bench_new_keys(c: &mut Criterion) {
    let mut group = c.benchmark_group("new_keys");

    for count in [100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let keys: Vec<String> = (0..count).map(|i| format!("10.0.{}.{}", i / 256, i % 256)).collect();
            b.iter_batched(
                || keyed(3, count * 2),
                |limiter| {
                    for key in &keys {
                        std::hint::black_box(limiter.check(key));
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

/// IP axis then email axis
fn bench_dual_axis(c: &mut Criterion) {
    let mut group = c.benchmark_group("dual_axis");
    group.throughput(Throughput::Elements(1));

    group.bench_function("both_admit", |b| {
        let policy = RateLimitPolicy::unlimited()
            .with_ip(Some(WindowConfig::per_day(u32::MAX)))
            .with_email(Some(WindowConfig::per_hour(u32::MAX)));
        let limiter = DualAxisLimiter::new(&policy, Arc::new(SystemClock)).unwrap();
        b.iter(|| std::hint::black_box(limiter.check("203.0.113.7", "Someone@Example.com")));
    });

    group.bench_function("email_denied_with_release", |b| {
        let policy = RateLimitPolicy::unlimited()
            .with_ip(Some(WindowConfig::per_day(u32::MAX)))
            .with_email(Some(WindowConfig::per_hour(1)));
        let limiter = DualAxisLimiter::new(&policy, Arc::new(SystemClock)).unwrap();
        let _ = limiter.check("203.0.113.7", "someone@example.com");
        b.iter(|| std::hint::black_box(limiter.check("203.0.113.7", "someone@example.com")));
    });

    group.finish();
}

/// Many threads hammering a handful of keys
fn bench_concurrent_checks(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_checks");

    for num_threads in [2usize, 4, 8, 16] {
        group.throughput(Throughput::Elements(num_threads as u64 * 1000));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{num_threads}_threads")),
            &num_threads,
            |b, &num_threads| {
                b.iter_custom(|iters| {
                    let mut total = Duration::ZERO;

                    for _ in 0..iters {
                        let limiter = Arc::new(keyed(u32::MAX, 1000));
                        let start = std::time::Instant::now();

                        let handles: Vec<_> = (0..num_threads)
                            .map(|t| {
                                let limiter = limiter.clone();
                                thread::spawn(move || {
                                    let key = format!("10.0.0.{}", t % 4);
                                    for _ in 0..1000 {
                                        limiter.check(&key);
                                    }
                                })
                            })
                            .collect();

                        for handle in handles {
                            handle.join().unwrap();
                        }
                        total += start.elapsed();
                    }

                    total
                });
            },
        );
    }

    group.finish();
}

/// Sweeping a table of expired windows
fn bench_cleanup(c: &mut Criterion) {
    let mut group = c.benchmark_group("cleanup");

    for count in [1_000usize, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let clock = Arc::new(ManualClock::new(0));
                    let limiter =
                        KeyedLimiter::new(Axis::Email, WindowConfig::new(3, 1000), count * 2, clock.clone());
                    for i in 0..count {
                        limiter.check(&format!("user{i}@example.com"));
                    }
                    clock.advance_ms(1001);
                    limiter
                },
                |limiter| std::hint::black_box(limiter.cleanup()),
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

/// Email pattern and survey checks
fn bench_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("validation");

    group.bench_function("valid_email", |b| {
        b.iter(|| std::hint::black_box(validate_email(" First.Last+tag@Sub.Example.co.in ")))
    });

    group.bench_function("malformed_email", |b| {
        b.iter(|| std::hint::black_box(validate_email("first.last@localhost")))
    });

    let survey = json!({
        "age": "18-24",
        "findMethod": "Facebook/WhatsApp group",
        "frustration": "x".repeat(400),
        "payForSchedule": "Maybe",
        "payForVerification": "Yes",
        "feedback": "Please launch soon"
    });
    let rules = SurveyRules::default();
    group.bench_function("survey", |b| {
        b.iter(|| std::hint::black_box(validate_survey(&survey, &rules)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_single_key,
    bench_new_keys,
    bench_dual_axis,
    bench_concurrent_checks,
    bench_cleanup,
    bench_validation,
);

criterion_main!(benches);
