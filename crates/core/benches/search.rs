//! Benchmarks for brute-force vs HNSW search
//!
//! Builds both methods over the same random points and measures knn latency
//! across dataset sizes, plus HNSW build time and edit distance on strings.
//!
//! Set `RUST_LOG=simdex_core=debug` to see build progress.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use simdex_core::vector::edit::levenshtein;
use simdex_core::{create_method, create_space, Params, Point, PointData, PointRef};

const DIM: usize = 64;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn random_points(rng: &mut StdRng, n: usize, dim: usize) -> Vec<Point> {
    (0..n)
        .map(|i| {
            let values = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
            Point::new(i as i32, PointData::Real(values))
        })
        .collect()
}

fn bench_knn(c: &mut Criterion) {
    init_logging();
    let mut group = c.benchmark_group("knn_l2");
    let space = create_space::<f32>("l2", &Params::new()).unwrap();
    let build_params = Params::parse(["seed=42"]).unwrap();

    for size in [1_000, 10_000] {
        let mut rng = StdRng::seed_from_u64(size as u64);
        let points = random_points(&mut rng, size, DIM);
        let query: Vec<f32> = (0..DIM).map(|_| rng.gen_range(-1.0..1.0)).collect();

        group.throughput(Throughput::Elements(size as u64));

        for method_name in ["brute_force", "hnsw"] {
            let mut method = create_method::<f32>(method_name).unwrap();
            method
                .create_index(space.as_ref(), &points, &build_params, false)
                .unwrap();

            group.bench_with_input(BenchmarkId::new(method_name, size), &size, |bench, _| {
                bench.iter(|| {
                    let result = method
                        .knn(space.as_ref(), &points, PointRef::Real(black_box(&query)), 10)
                        .unwrap();
                    black_box(result);
                });
            });
        }
    }

    group.finish();
}

fn bench_hnsw_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("hnsw_build");
    group.sample_size(10);
    let space = create_space::<f32>("l2", &Params::new()).unwrap();

    for m in [8, 16, 32] {
        let mut rng = StdRng::seed_from_u64(7);
        let points = random_points(&mut rng, 2_000, DIM);
        let params = Params::parse([format!("M={}", m), "seed=7".to_string()]).unwrap();

        group.bench_with_input(BenchmarkId::new("M", m), &m, |bench, _| {
            bench.iter(|| {
                let mut method = create_method::<f32>("hnsw").unwrap();
                method
                    .create_index(space.as_ref(), black_box(&points), &params, false)
                    .unwrap();
                black_box(method.indexed_count());
            });
        });
    }

    group.finish();
}

fn bench_levenshtein(c: &mut Criterion) {
    let mut group = c.benchmark_group("levenshtein");

    for len in [8, 32, 128] {
        let a: Vec<u8> = (0..len).map(|i| b'a' + (i % 26) as u8).collect();
        let b: Vec<u8> = (0..len).map(|i| b'a' + ((i * 7) % 26) as u8).collect();

        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |bench, _| {
            bench.iter(|| black_box(levenshtein(black_box(&a), black_box(&b))));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_knn, bench_hnsw_build, bench_levenshtein);
criterion_main!(benches);
