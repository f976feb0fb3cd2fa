use core::{hint::black_box, time::Duration};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use persons_core::{
    bulk::BulkCreator,
    store::{MemoryStore, SharedStore},
    strategy::{Strategies, StrategyConfig, StrategyKind},
};
use std::{sync::Arc, time::Instant};
use tokio::runtime::Builder;

// Persons created per benchmark iteration.
const COUNT: usize = 2_000;

/// Benchmarks bulk creation of `COUNT` persons under each strategy.
fn bench_bulk_create(c: &mut Criterion) {
    let rt = Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .build()
        .unwrap();
    let strategies = Strategies::start(&StrategyConfig {
        num_workers: 2,
        queue_depth: 16,
        shutdown_timeout: Duration::from_secs(1),
    })
    .unwrap();

    let mut group = c.benchmark_group("bulk_create");
    group.throughput(Throughput::Elements(COUNT as u64));

    for kind in StrategyKind::ALL {
        let strategy = strategies.get(kind);
        group.bench_function(format!("{kind}/elems/{COUNT}"), |b| {
            b.to_async(&rt).iter_custom(|iters| async move {
                let start = Instant::now();

                for _ in 0..iters {
                    let store: SharedStore = Arc::new(MemoryStore::new());
                    let outcome = BulkCreator::new(store)
                        .create_bulk(COUNT as i64, strategy)
                        .await
                        .unwrap();
                    black_box(outcome);
                }

                start.elapsed()
            });
        });
    }

    group.finish();
    rt.block_on(strategies.shutdown()).unwrap();
}

criterion_group!(benches, bench_bulk_create);
criterion_main!(benches);
