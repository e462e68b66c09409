use std::time::Duration;

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tts_benchmarks::monitoring::{Sample, SessionStats};

fn samples(count: usize) -> Vec<Sample> {
    (0..count)
        .map(|i| {
            let wave = (i as f64 * 0.37).sin().abs();
            Sample {
                timestamp: Utc::now(),
                cpu_percent: wave * 100.0,
                memory_percent: 40.0 + wave * 20.0,
                memory_used_gb: 6.0 + wave * 2.0,
                memory_total_gb: 16.0,
                gpu_util: wave * 90.0,
                gpu_memory_mb: 2048.0 + wave * 1024.0,
                gpu_temp_c: 55.0 + wave * 20.0,
            }
        })
        .collect()
}

fn bench_session_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_aggregation");

    // a 2s interval over 10 minutes, 1 hour and 6 hours
    for count in [300usize, 1_800, 10_800] {
        let input = samples(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &input, |b, input| {
            b.iter(|| SessionStats::from_samples(black_box(input), Duration::from_secs(2), true))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_session_aggregation);
criterion_main!(benches);
