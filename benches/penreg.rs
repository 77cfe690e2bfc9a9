use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use linfa::prelude::*;
use linfa_penreg::PenalizedRegression;
use ndarray::{Array1, Array2, Ix1};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;

fn sparse_dataset(
    rng: &mut Xoshiro256Plus,
    n_samples: usize,
    n_features: usize,
) -> Dataset<f64, f64, Ix1> {
    let x = Array2::random_using((n_samples, n_features), Uniform::new(-1., 1.), rng);
    let mut beta = Array1::zeros(n_features);
    for i in (0..n_features).step_by(n_features / 10) {
        beta[i] = 2.0;
    }
    let noise = Array1::random_using(n_samples, Uniform::new(-0.1, 0.1), rng);
    let y = x.dot(&beta) + noise;

    Dataset::new(x, y)
}

fn penreg_bench(c: &mut Criterion) {
    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let mut group = c.benchmark_group("penreg");
    group.sample_size(10);

    for n_features in [200, 1000, 2000] {
        let dataset = sparse_dataset(&mut rng, 100, n_features);

        let lasso = PenalizedRegression::lasso().lambda1(1.0);
        group.bench_with_input(
            BenchmarkId::new("lasso", n_features),
            &dataset,
            |b, ds| b.iter(|| lasso.fit(black_box(ds)).unwrap()),
        );

        let fused = PenalizedRegression::fused_lasso().lambda1(1.0).lambda2(1.0);
        group.bench_with_input(
            BenchmarkId::new("fused_lasso", n_features),
            &dataset,
            |b, ds| b.iter(|| fused.fit(black_box(ds)).unwrap()),
        );
    }

    group.finish();
}

criterion_group!(benches, penreg_bench);
criterion_main!(benches);
