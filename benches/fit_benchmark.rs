use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ndarray::{Array1, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use refsurf::{FitContext, FitOptions, PolyBasis, SampleSet};

fn percentile_spread(values: ArrayView1<f64>) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let quantile = |p: f64| {
        let idx = (sorted.len() - 1) as f64 * p;
        let lo = idx.floor() as usize;
        let hi = idx.ceil() as usize;
        if lo == hi {
            sorted[lo]
        } else {
            sorted[lo] + (idx - lo as f64) * (sorted[hi] - sorted[lo])
        }
    };
    (quantile(0.84) - quantile(0.16)) / 2.0
}

/// A noisy quadratic surface with 2% gross outliers, the shape of a typical
/// repeat-track neighborhood.
fn noisy_samples(n: usize) -> SampleSet {
    let mut rng = StdRng::seed_from_u64(0x5EED + n as u64);
    let noise = Normal::new(0.0, 0.1).unwrap();

    let x = Array1::from_shape_fn(n, |_| rng.gen_range(-100.0..100.0));
    let y = Array1::from_shape_fn(n, |_| rng.gen_range(-100.0..100.0));
    let mut z = Array1::from_shape_fn(n, |i| {
        0.5 + 1e-3 * x[i] - 2e-3 * y[i] + 1e-5 * x[i] * x[i] + noise.sample(&mut rng)
    });
    for i in (0..n).step_by(50) {
        z[i] += 25.0;
    }
    let sigma = Array1::from_elem(n, 0.1);
    SampleSet::new(x, y, z, sigma).unwrap()
}

fn benchmark_fit(c: &mut Criterion) {
    let sizes = [64_usize, 256, 1024];
    let cases: Vec<_> = sizes.iter().map(|&n| (n, noisy_samples(n))).collect();
    let options = FitOptions {
        max_iterations: 5,
        ..FitOptions::default()
    };

    let mut group = c.benchmark_group("robust_surface_fit");
    for (n, samples) in cases.iter() {
        group.throughput(Throughput::Elements(*n as u64));

        group.bench_with_input(BenchmarkId::new("degree_2", n), samples, |b, input| {
            let basis = PolyBasis::from_degrees(2, 2, (0.0, 0.0), 100.0, false).unwrap();
            let ctx = FitContext::new(basis, input).unwrap();
            b.iter(|| {
                let result = ctx
                    .fit(black_box(input), &options, percentile_spread)
                    .unwrap();
                black_box(result);
            });
        });

        group.bench_with_input(BenchmarkId::new("degree_3", n), samples, |b, input| {
            let basis = PolyBasis::from_degrees(3, 3, (0.0, 0.0), 100.0, false).unwrap();
            let ctx = FitContext::new(basis, input).unwrap();
            b.iter(|| {
                let result = ctx
                    .fit(black_box(input), &options, percentile_spread)
                    .unwrap();
                black_box(result);
            });
        });
    }
    group.finish();
}

criterion_group!(robust_surface_fit, benchmark_fit);
criterion_main!(robust_surface_fit);
