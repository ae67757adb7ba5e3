//! Benchmarks for the manual-reset and auto-reset signals

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use waitables::sync::{AutoResetSignal, ManualResetSignal, WaitEngine};

use std::sync::Arc;
use std::time::Duration;

const ITERATIONS: usize = 1000;
const WAITERS: usize = 10;

fn manual_reset_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("manual_reset_signal");

    group.bench_function("wait_set", |b| {
        let signal = ManualResetSignal::new(true);
        b.iter(|| black_box(signal.wait()))
    });

    group.bench_function("set_reset", |b| {
        let signal = ManualResetSignal::new(false);
        b.iter(|| {
            signal.set();
            signal.reset();
        })
    });

    group.bench_function("broadcast", |b| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        b.iter(|| {
            rt.block_on(async {
                let signal = Arc::new(ManualResetSignal::new(false));
                let waiters: Vec<_> = (0..WAITERS)
                    .map(|_| {
                        let signal = signal.clone();
                        tokio::spawn(async move { signal.wait_async().await })
                    })
                    .collect();
                signal.set();
                for waiter in waiters {
                    waiter.await.unwrap();
                }
            })
        })
    });

    group.finish();
}

fn auto_reset_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("auto_reset_signal");

    group.bench_function("set_wait", |b| {
        let signal = AutoResetSignal::new(false);
        b.iter(|| {
            signal.set();
            black_box(signal.wait())
        })
    });

    group.bench_function("ping_pong", |b| {
        let rt = tokio::runtime::Runtime::new().unwrap();
        b.iter(|| {
            rt.block_on(async {
                let ping = Arc::new(AutoResetSignal::new(false));
                let pong = Arc::new(AutoResetSignal::new(false));
                let responder = {
                    let ping = ping.clone();
                    let pong = pong.clone();
                    tokio::spawn(async move {
                        for _ in 0..ITERATIONS {
                            ping.wait_async().await;
                            pong.set();
                        }
                    })
                };
                for _ in 0..ITERATIONS {
                    ping.set();
                    pong.wait_async().await;
                }
                responder.await.unwrap();
            })
        })
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(10));
    targets = manual_reset_benchmarks, auto_reset_benchmarks
}
criterion_main!(benches);
