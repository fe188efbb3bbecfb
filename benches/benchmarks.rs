use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::Array2;
use pca_select::{
    default_preprocessors, ComponentSelection, PcaController, PcaSettings, Table, PCA,
};
use rand::distributions::Uniform;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Generates random data of shape (n_samples x n_features) with values 0, 1, or 2 (as f64), seeded for reproducibility.
fn generate_random_data(n_samples: usize, n_features: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let distribution = Uniform::new_inclusive(0, 2);
    Array2::from_shape_fn((n_samples, n_features), |_| rng.sample(distribution) as f64)
}

fn generate_table(n_samples: usize, n_features: usize, seed: u64) -> Table {
    let names: Vec<String> = (0..n_features).map(|j| format!("f{}", j)).collect();
    Table::from_features(&names, generate_random_data(n_samples, n_features, seed))
        .expect("generated table is well formed")
}

// Covariance path for tall data, Gram path for wide data.
fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("PCA_fit");
    let chain = default_preprocessors();

    for &(n_samples, n_features) in [(100, 50), (500, 100), (100, 200)].iter() {
        let data = generate_table(n_samples, n_features, 42);
        group.throughput(Throughput::Elements((n_samples * n_features) as u64));
        group.bench_with_input(
            BenchmarkId::new("fit", format!("{}x{}", n_samples, n_features)),
            &data,
            |b, data| b.iter(|| PCA::new().fit_model(data, &chain, 100).unwrap()),
        );
    }
    group.finish();
}

// Moving the selection controls after a fit; only slicing and loadings work.
fn bench_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("selection_commit");

    for &(n_samples, n_features) in [(1000, 50), (5000, 100)].iter() {
        let mut controller = PcaController::new(PCA::new(), PcaSettings::default());
        controller
            .set_data(Some(generate_table(n_samples, n_features, 7)))
            .unwrap();

        group.bench_function(
            BenchmarkId::new("count_sweep", format!("{}x{}", n_samples, n_features)),
            |b| {
                b.iter(|| {
                    for n in 1..=n_features {
                        controller
                            .set_component_count(ComponentSelection::from_count(n))
                            .unwrap();
                    }
                })
            },
        );
        group.bench_function(
            BenchmarkId::new("variance_sweep", format!("{}x{}", n_samples, n_features)),
            |b| {
                b.iter(|| {
                    for p in 1..=100u8 {
                        controller.set_variance_covered(p).unwrap();
                    }
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_fit, bench_selection);
criterion_main!(benches);
