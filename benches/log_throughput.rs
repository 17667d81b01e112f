use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};

use pipewright::logging::{LogConfig, LoggingCore};

fn emit_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("runtime");

    c.bench_function("emit_10k_records", |b| {
        b.iter(|| {
            rt.block_on(async {
                let core = LoggingCore::new(LogConfig::default());
                let logger = core.logger("bench");
                for _ in 0..10_000 {
                    logger.info("benchmark record");
                }
                core.shutdown(Duration::from_secs(5)).await;
            });
        });
    });

    c.bench_function("emit_10k_records_small_pool", |b| {
        b.iter(|| {
            rt.block_on(async {
                let core = LoggingCore::new(LogConfig {
                    queue_capacity: 1024,
                    pool_capacity: 64,
                    batch_size: 32,
                });
                let logger = core.logger("bench");
                for _ in 0..10_000 {
                    logger.info("benchmark record");
                }
                core.shutdown(Duration::from_secs(5)).await;
            });
        });
    });
}

criterion_group!(benches, emit_throughput);
criterion_main!(benches);
