use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use criterion::Criterion;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;

use surge_limit::FactoryError;
use surge_limit::LimiterStore;
use surge_limit::TokenBucket;

fn bench_token_bucket(c: &mut Criterion) {
    let mut group = c.benchmark_group("token_bucket");

    let bucket = Arc::new(TokenBucket::new(1_000_000.0, 1_000_000));
    group.bench_function("single-threaded", |b| {
        b.iter(|| {
            let _ = black_box(bucket.as_ref()).try_acquire();
        })
    });

    group.bench_function("contended-8-threads", |b| {
        b.iter_custom(|iters| {
            let bucket = Arc::new(TokenBucket::new(1_000_000.0, 1_000_000));
            let barrier = Arc::new(Barrier::new(8));
            let per_thread = iters / 8 + 1;

            let start = Instant::now();
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let bucket = Arc::clone(&bucket);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        for _ in 0..per_thread {
                            let _ = black_box(bucket.as_ref()).try_acquire();
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
            start.elapsed()
        })
    });

    group.finish();
}

fn bench_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("limiter_store");

    let factory = |_key: &str| -> Result<TokenBucket, FactoryError> {
        Ok(TokenBucket::new(100.0, 100))
    };
    let store = LimiterStore::new(NonZeroUsize::new(256).unwrap(), factory);
    store.get_or_create("10.0.0.1:443").unwrap();

    group.bench_function("hit", |b| {
        b.iter(|| {
            let _ = black_box(&store).get_or_create("10.0.0.1:443").unwrap();
        })
    });

    group.finish();
}

fn config() -> Criterion {
    Criterion::default().measurement_time(Duration::from_secs(5))
}

criterion_group! {
    name = benches;
    config = config();
    targets = bench_token_bucket, bench_store
}
criterion_main!(benches);
