use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::hint::black_box;
use std::time::Duration;
use strided_dispatch::{
    assign_with, binary_with, nullary_with, unary_with, Config, DType, NdarrayView,
    NdarrayViewMut, Order, Payload, Strategy,
};

const STRATEGIES: [Strategy; 3] = [Strategy::Auto, Strategy::Unblocked, Strategy::Blocked];

fn scale(x: f64) -> f64 {
    x * 1.5
}

fn add(x: f64, y: f64) -> f64 {
    x + y
}

fn one() -> f64 {
    1.0
}

fn random_matrix(rng: &mut StdRng, size: usize) -> Vec<f64> {
    (0..size * size).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn config_for(strategy: Strategy) -> Config {
    Config::new().with_strategy(strategy)
}

/// Row-major input copied into a column-major output.
fn bench_unary_transposed(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0);
    let mut group = c.benchmark_group("unary_transposed");
    for size in [64usize, 256, 1024] {
        group.throughput(Throughput::Elements((size * size) as u64));
        let x = random_matrix(&mut rng, size);
        let mut out = vec![0.0f64; size * size];
        let xv = NdarrayView::from_slice(&x, &[size, size], Order::RowMajor).unwrap();
        let mut ov =
            NdarrayViewMut::from_slice_mut(&mut out, &[size, size], Order::ColumnMajor).unwrap();
        let payload = Payload::unary(scale);

        for strategy in STRATEGIES {
            let config = config_for(strategy);
            group.bench_with_input(
                BenchmarkId::new(format!("{strategy:?}"), size),
                &size,
                |b, _| b.iter(|| unary_with(black_box(&xv), &mut ov, &payload, &config).unwrap()),
            );
        }
    }
    group.finish();
}

/// Both inputs and the output share one order; `Auto` flattens them.
fn bench_binary_contiguous(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(1);
    let mut group = c.benchmark_group("binary_contiguous");
    for size in [64usize, 256, 1024] {
        group.throughput(Throughput::Elements((size * size) as u64));
        let x = random_matrix(&mut rng, size);
        let y = random_matrix(&mut rng, size);
        let mut out = vec![0.0f64; size * size];
        let xv = NdarrayView::from_slice(&x, &[size, size], Order::RowMajor).unwrap();
        let yv = NdarrayView::from_slice(&y, &[size, size], Order::RowMajor).unwrap();
        let mut ov =
            NdarrayViewMut::from_slice_mut(&mut out, &[size, size], Order::RowMajor).unwrap();
        let payload = Payload::binary(add);

        for strategy in STRATEGIES {
            let config = config_for(strategy);
            group.bench_with_input(
                BenchmarkId::new(format!("{strategy:?}"), size),
                &size,
                |b, _| {
                    b.iter(|| {
                        binary_with(black_box(&xv), black_box(&yv), &mut ov, &payload, &config)
                            .unwrap()
                    })
                },
            );
        }
    }
    group.finish();
}

/// Every other element of a rank-4 buffer, read with a reversed leading axis.
fn bench_assign_rank4_strided(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(2);
    let mut group = c.benchmark_group("assign_rank4_strided");
    for n in [8usize, 16, 24] {
        let shape = [n, n, n, n];
        let len = n * n * n * n;
        group.throughput(Throughput::Elements(len as u64));

        let x: Vec<f64> = (0..2 * len).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let bytes: &[u8] = bytemuck::cast_slice(&x);
        let s = |k: usize| (2 * 8 * n.pow(k as u32)) as isize;
        let strides = [-s(3), s(2), s(1), s(0)];
        let offset = s(3) * (n as isize - 1);
        let xv = NdarrayView::new(bytes, DType::Float64, &shape, &strides, offset, Order::RowMajor)
            .unwrap();
        let mut out = vec![0.0f32; len];
        let mut ov = NdarrayViewMut::from_slice_mut(&mut out, &shape, Order::RowMajor).unwrap();

        for strategy in STRATEGIES {
            let config = config_for(strategy);
            group.bench_with_input(
                BenchmarkId::new(format!("{strategy:?}"), n),
                &n,
                |b, _| b.iter(|| assign_with(black_box(&xv), &mut ov, &config).unwrap()),
            );
        }
    }
    group.finish();
}

/// Rank 12 goes through the generic kernel.
fn bench_nullary_generic(c: &mut Criterion) {
    let mut group = c.benchmark_group("nullary_generic");
    let shape = [2usize; 12];
    let len = 1 << 12;
    group.throughput(Throughput::Elements(len as u64));
    let mut out = vec![0.0f64; len];
    let mut ov = NdarrayViewMut::from_slice_mut(&mut out, &shape, Order::ColumnMajor).unwrap();
    let payload = Payload::nullary(one);
    let config = config_for(Strategy::Unblocked);
    group.bench_function("rank12", |b| {
        b.iter(|| nullary_with(&mut ov, &payload, &config).unwrap())
    });
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(500))
        .measurement_time(Duration::from_secs(2));
    targets = bench_unary_transposed, bench_binary_contiguous, bench_assign_rank4_strided,
        bench_nullary_generic
}
criterion_main!(benches);
