// src/pipeline_tests.rs
#![cfg(test)]
use crate::config::{EmPcaConfig, ExtractionMethod, PreprocessConfig};
use crate::data::{pace_vector_from_sentinel, GroupedVectors, PaceVector, TimeSlot, Weekday, MISSING_SENTINEL};
use crate::error::PreprocessError;
use crate::normalize::scale_and_center;
use crate::parallel::{RayonMap, SequentialMap};
use crate::pca::{pca, EmPca};
use crate::pipeline::{preprocess_data, preprocess_data_default, preprocess_group, preprocess_group_with};
use approx::assert_abs_diff_eq;
use ndarray::{Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn slot(weekday: Weekday, hour: u8) -> TimeSlot {
    TimeSlot::new(weekday, hour).unwrap()
}

/// Pace-like vectors (strictly positive) driven by two latent factors.
fn pace_group(rng: &mut ChaCha8Rng, n_vectors: usize, n_dims: usize, missing_rate: f64) -> Vec<PaceVector> {
    let base: Vec<f64> = (0..n_dims).map(|d| 20.0 + d as f64).collect();
    (0..n_vectors)
        .map(|_| {
            let congestion = rng.gen_range(-3.0..3.0);
            let weather = rng.gen_range(-1.0..1.0);
            (0..n_dims)
                .map(|d| {
                    if rng.gen::<f64>() < missing_rate {
                        None
                    } else {
                        let weight = if d % 2 == 0 { 1.0 } else { 0.3 };
                        Some(base[d] + weight * congestion + weather * (d as f64 / n_dims as f64) + rng.gen_range(-0.1..0.1))
                    }
                })
                .collect()
        })
        .collect()
}

fn week_of_groups(seed: u64, n_dims: usize, missing_rate: f64) -> GroupedVectors<TimeSlot, PaceVector> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut grouped = GroupedVectors::new();
    for (i, weekday) in Weekday::ALL.iter().enumerate() {
        for hour in [7u8, 8, 17] {
            let n_vectors = 8 + (i + hour as usize) % 5;
            grouped.insert(slot(*weekday, hour), pace_group(&mut rng, n_vectors, n_dims, missing_rate));
        }
    }
    grouped
}

#[cfg(test)]
mod single_group {
    use super::*;

    #[test]
    fn output_has_one_reduced_vector_per_input_in_order() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let vectors = pace_group(&mut rng, 12, 6, 0.0);
        let reduced = preprocess_group(&vectors, 2, true).unwrap();
        assert_eq!(reduced.len(), 12);
        assert!(reduced.iter().all(|v| v.len() == 2));

        // Same as running the stages by hand.
        let mut dense = Array2::<f64>::zeros((6, 12));
        for (j, v) in vectors.iter().enumerate() {
            for (i, cell) in v.iter().enumerate() {
                dense[[i, j]] = cell.unwrap();
            }
        }
        scale_and_center(&mut dense, true).unwrap();
        let components = pca(&dense.view(), 2).unwrap();
        for (j, vector) in reduced.iter().enumerate() {
            for k in 0..2 {
                assert_abs_diff_eq!(vector[k], components.scores[[k, j]], epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn missing_cells_are_imputed_before_normalizing() {
        let vectors = vec![
            pace_vector_from_sentinel(&[10.0, 5.0, 1.0], MISSING_SENTINEL),
            pace_vector_from_sentinel(&[12.0, 0.0, 2.0], MISSING_SENTINEL),
            pace_vector_from_sentinel(&[14.0, 7.0, 4.0], MISSING_SENTINEL),
            pace_vector_from_sentinel(&[11.0, 9.0, 3.0], MISSING_SENTINEL),
        ];
        let group = preprocess_group_with(&vectors, 2, false, &crate::pca::CovarianceEigenPca, 0).unwrap();
        assert_abs_diff_eq!(group.model.imputed_values[1], 7.0, epsilon = 1e-12);
        assert_abs_diff_eq!(group.model.row_statistics.means[1], 7.0, epsilon = 1e-12);
        assert!(group.vectors.iter().flat_map(|v| v.iter()).all(|x| x.is_finite()));
    }

    #[test]
    fn constant_dimension_fails_when_scaling() {
        let vectors = vec![
            pace_vector_from_sentinel(&[1.0, 3.0], MISSING_SENTINEL),
            pace_vector_from_sentinel(&[2.0, 3.0], MISSING_SENTINEL),
            pace_vector_from_sentinel(&[4.0, 3.0], MISSING_SENTINEL),
        ];
        assert!(matches!(
            preprocess_group(&vectors, 1, true),
            Err(PreprocessError::ZeroVariance { dimension: 1 })
        ));
        assert_eq!(preprocess_group(&vectors, 1, false).unwrap().len(), 3);
    }

    #[test]
    fn em_extractor_reports_convergence() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let vectors = pace_group(&mut rng, 30, 8, 0.0);
        let extractor = EmPca::new(EmPcaConfig::default(), 3);
        let group = preprocess_group_with(&vectors, 2, true, &extractor, 0).unwrap();
        assert_eq!(group.vectors.len(), 30);
        assert!(group.model.convergence.unwrap().converged);
        assert_eq!(group.model.loadings.dim(), (8, 2));
    }
}

#[cfg(test)]
mod grouped {
    use super::*;

    #[test]
    fn keys_sizes_and_order_are_preserved() {
        let grouped = week_of_groups(3, 10, 0.01);
        let config = PreprocessConfig::new(3).with_perc_missing_allowed(0.2);
        let output = preprocess_data_default(&grouped, &config).unwrap();

        assert_eq!(output.groups.len(), grouped.len());
        assert_eq!(output.kept_dimensions, (0..10).collect::<Vec<_>>());
        for (key, vectors) in &grouped {
            let reduced = &output.groups[key];
            assert_eq!(reduced.len(), vectors.len(), "size changed for {}", key);
            assert!(reduced.iter().all(|v| v.len() == 3));
            assert_eq!(output.models[key].loadings.dim(), (10, 3));
        }
    }

    #[test]
    fn each_group_matches_preprocessing_it_alone() {
        let grouped = week_of_groups(4, 6, 0.0);
        let config = PreprocessConfig::new(2).with_perc_missing_allowed(0.1).with_scale(false);
        let output = preprocess_data_default(&grouped, &config).unwrap();
        for (key, vectors) in &grouped {
            let alone = preprocess_group(vectors, 2, false).unwrap();
            for (a, b) in alone.iter().zip(&output.groups[key]) {
                for k in 0..2 {
                    assert_abs_diff_eq!(a[k], b[k], epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn sparse_dimension_is_dropped_from_every_group() {
        let mut grouped = week_of_groups(5, 6, 0.0);
        // Blank out dimension 4 in most vectors of one group only.
        let victim = slot(Weekday::Wednesday, 8);
        if let Some(vectors) = grouped.get_mut(&victim) {
            for v in vectors.iter_mut() {
                v[4] = None;
            }
        }
        let config = PreprocessConfig::new(2).with_perc_missing_allowed(0.01);
        let output = preprocess_data_default(&grouped, &config).unwrap();
        assert_eq!(output.kept_dimensions, vec![0, 1, 2, 3, 5]);
        for model in output.models.values() {
            assert_eq!(model.loadings.nrows(), 5);
        }
    }

    #[test]
    fn too_many_components_after_pruning_is_a_configuration_error() {
        let grouped = week_of_groups(6, 4, 0.0);
        let err = preprocess_data_default(&grouped, &PreprocessConfig::new(5)).unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn failing_group_is_named_in_the_error() {
        let mut grouped = week_of_groups(7, 4, 0.0);
        let broken = slot(Weekday::Saturday, 17);
        if let Some(vectors) = grouped.get_mut(&broken) {
            for v in vectors.iter_mut() {
                v[2] = Some(42.0);
            }
        }
        let err = preprocess_data_default(&grouped, &PreprocessConfig::new(2)).unwrap_err();
        match &err {
            PreprocessError::GroupFailed { group, source } => {
                assert!(group.contains("Saturday"), "group was {}", group);
                assert!(matches!(**source, PreprocessError::ZeroVariance { dimension: 2 }));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(err.is_data_quality_error());
    }

    #[test]
    fn rayon_and_sequential_strategies_agree() {
        let grouped = week_of_groups(8, 9, 0.02);
        for method in [ExtractionMethod::Batch, ExtractionMethod::Em(EmPcaConfig::default())] {
            let config = PreprocessConfig::new(3)
                .with_perc_missing_allowed(0.25)
                .with_method(method);
            let sequential = preprocess_data(&grouped, &config, &SequentialMap).unwrap();
            let parallel = preprocess_data(&grouped, &config, &RayonMap::with_num_threads(3).unwrap()).unwrap();
            assert_eq!(sequential.groups, parallel.groups);
            assert_eq!(sequential.kept_dimensions, parallel.kept_dimensions);
        }
    }

    #[test]
    fn unconverged_groups_are_listed_not_failed() {
        let grouped = week_of_groups(9, 7, 0.0);
        let em_config = EmPcaConfig {
            max_iterations: 1,
            tolerance: 0.0,
            ..EmPcaConfig::default()
        };
        let config = PreprocessConfig::new(2).with_method(ExtractionMethod::Em(em_config));
        let output = preprocess_data_default(&grouped, &config).unwrap();
        assert_eq!(output.unconverged_groups().len(), grouped.len());
    }

    #[test]
    fn scores_are_centered_within_each_group() {
        let grouped = week_of_groups(10, 8, 0.0);
        let output = preprocess_data_default(&grouped, &PreprocessConfig::new(3)).unwrap();
        for vectors in output.groups.values() {
            let views: Vec<_> = vectors.iter().map(|v| v.view()).collect();
            let stacked = ndarray::stack(Axis(1), &views).unwrap();
            for mean in stacked.mean_axis(Axis(1)).unwrap().iter() {
                assert_abs_diff_eq!(*mean, 0.0, epsilon = 1e-10);
            }
        }
    }
}
