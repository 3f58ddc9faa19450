//! Benchmarks for block reduction and conditioning

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sigclass::acquisition::BlockAssembler;
use sigclass::config::{AcquisitionConfig, Coupling};
use sigclass::{rms, SignalReducer};

fn generate_signal(sample_rate: u32, samples: usize, amplitude: f32) -> Vec<f32> {
    (0..samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            amplitude * (2.0 * std::f32::consts::PI * 1000.0 * t).sin()
        })
        .collect()
}

fn bench_rms(c: &mut Criterion) {
    let mut group = c.benchmark_group("rms");
    let sample_rate = 48000;

    for block_size in [240, 960, 4800] {
        let block = generate_signal(sample_rate, block_size, 0.1);
        group.bench_with_input(
            BenchmarkId::new("block", block_size),
            &block,
            |b, block| b.iter(|| black_box(rms(block))),
        );
    }

    group.finish();
}

fn bench_reducer(c: &mut Criterion) {
    let mut group = c.benchmark_group("signal_reducer");
    let block = generate_signal(48000, 960, 0.1);

    // full histories: every push evicts and averages the window
    group.bench_function("process_960_full_history", |b| {
        let mut reducer = SignalReducer::with_window(30, 100);
        for _ in 0..200 {
            reducer.process(&block);
        }
        b.iter(|| black_box(reducer.process(black_box(&block))))
    });

    group.finish();
}

fn bench_assembler(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_assembler");
    let sample_rate = 48000;
    let block_size = 960;

    // 100 ms of interleaved stereo
    let mono = generate_signal(sample_rate, 4800, 0.3);
    let interleaved: Vec<f32> = mono.iter().flat_map(|&s| [s, -s]).collect();

    for coupling in [Coupling::Dc, Coupling::Ac] {
        let mut config = AcquisitionConfig::default();
        config.channel_a.coupling = coupling;
        config.channel_b.coupling = coupling;

        group.bench_with_input(
            BenchmarkId::new("triggered_100ms", format!("{:?}", coupling)),
            &interleaved,
            |b, data| {
                b.iter_with_setup(
                    || BlockAssembler::new(&config, sample_rate, block_size).unwrap(),
                    |mut assembler| {
                        assembler.push_interleaved(data, 2);
                        while let Some(block) = assembler.try_block() {
                            black_box(block);
                        }
                    },
                )
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_rms, bench_reducer, bench_assembler);
criterion_main!(benches);
