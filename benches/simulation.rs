//! Harness performance benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use matmul_sim::{MatrixMultiplier, SimulationConfig, Simulator};
use matmul_verify::{expected_product, Sequencer, StimulusGenerator, TbConfig};

fn benchmark_expected_product(c: &mut Criterion) {
    let mut group = c.benchmark_group("expected_product");

    let shapes = vec![
        ("4x4_u8", TbConfig::new(8, 4, 4, 4)),
        ("8x8_u16", TbConfig::new(16, 8, 8, 8)),
        ("4x4_u128", TbConfig::new(128, 4, 4, 4)),
    ];

    for (name, config) in shapes {
        let pairs = StimulusGenerator::new(&config, 1).pairs(64).unwrap();
        group.throughput(Throughput::Elements(pairs.len() as u64));
        group.bench_with_input(BenchmarkId::new("reference", name), &pairs, |b, pairs| {
            b.iter(|| {
                for (a, m) in pairs {
                    black_box(expected_product(a, m, config.data_width).unwrap());
                }
            });
        });
    }

    group.finish();
}

fn benchmark_scenario(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenario");
    group.sample_size(10);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    for (backend, samples) in [("verilator", 500), ("icarus", 500)] {
        let mut config = TbConfig::new(8, 4, 4, 4);
        config.num_samples = samples;
        config.seed = Some(42);

        group.throughput(Throughput::Elements(samples as u64));
        group.bench_with_input(BenchmarkId::new(backend, samples), &config, |b, config| {
            b.iter(|| {
                runtime.block_on(async {
                    let dut = MatrixMultiplier::new(config.multiplier_params()).unwrap();
                    let mut sim =
                        Simulator::new(SimulationConfig::for_simulator(backend), Box::new(dut))
                            .unwrap();
                    let sequencer = Sequencer::new(config.clone()).unwrap();
                    let report = sequencer.run_random(&mut sim).await.unwrap();
                    black_box(report.passed())
                })
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_expected_product, benchmark_scenario);
criterion_main!(benches);
