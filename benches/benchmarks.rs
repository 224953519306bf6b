use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::Array2;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use pace_preprocessing::{
    em_pca, pca, preprocess_data, scale_and_center, EmPcaConfig, ExtractionMethod, GroupedVectors, PaceVector,
    PreprocessConfig, RayonMap, SequentialMap, TimeSlot, Weekday,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Centered (n_dims x n_obs) data with `rank` latent directions plus noise.
fn generate_low_rank_data(n_dims: usize, n_obs: usize, rank: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let basis = Array2::random_using((n_dims, rank), Uniform::new(-1.0, 1.0), &mut rng);
    let coefficients = Array2::random_using((rank, n_obs), Uniform::new(-5.0, 5.0), &mut rng);
    let noise = Array2::random_using((n_dims, n_obs), Uniform::new(-0.1, 0.1), &mut rng);
    let mut data = basis.dot(&coefficients) + noise;
    scale_and_center(&mut data, false).unwrap();
    data
}

fn generate_week(n_dims: usize, vectors_per_slot: usize, seed: u64) -> GroupedVectors<TimeSlot, PaceVector> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut grouped = GroupedVectors::new();
    for weekday in Weekday::ALL {
        for hour in 0..24u8 {
            let vectors = (0..vectors_per_slot)
                .map(|_| {
                    (0..n_dims)
                        .map(|_| if rng.gen::<f64>() < 0.01 { None } else { Some(rng.gen_range(20.0..80.0)) })
                        .collect()
                })
                .collect();
            if let Ok(slot) = TimeSlot::new(weekday, hour) {
                grouped.insert(slot, vectors);
            }
        }
    }
    grouped
}

fn bench_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("extraction");
    let n_pcs = 5;
    for &(n_dims, n_obs) in &[(50usize, 200usize), (200, 500), (1000, 200)] {
        let data = generate_low_rank_data(n_dims, n_obs, 8, 42);
        group.throughput(Throughput::Elements((n_dims * n_obs) as u64));
        let label = format!("{}x{}", n_dims, n_obs);

        group.bench_with_input(BenchmarkId::new("batch", &label), &data, |b, data| {
            b.iter(|| pca(&data.view(), n_pcs).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("em", &label), &data, |b, data| {
            let config = EmPcaConfig::default();
            b.iter(|| {
                let mut rng = ChaCha8Rng::seed_from_u64(7);
                em_pca(&data.view(), n_pcs, &config, &mut rng).unwrap()
            })
        });
    }
    group.finish();
}

fn bench_full_week(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_week");
    group.sample_size(10);
    let grouped = generate_week(64, 40, 3);
    let batch = PreprocessConfig::new(4);
    let em = PreprocessConfig::new(4).with_method(ExtractionMethod::Em(EmPcaConfig::default()));

    group.bench_function("batch_sequential", |b| {
        b.iter(|| preprocess_data(&grouped, &batch, &SequentialMap).unwrap())
    });
    group.bench_function("batch_rayon", |b| {
        b.iter(|| preprocess_data(&grouped, &batch, &RayonMap::new()).unwrap())
    });
    group.bench_function("em_rayon", |b| {
        b.iter(|| preprocess_data(&grouped, &em, &RayonMap::new()).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_extraction, bench_full_week);
criterion_main!(benches);
