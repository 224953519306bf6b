//! Per-group preprocessing and the grouped driver.
//!
//! Dimension pruning runs once over all groups; every group is then stacked,
//! imputed, normalized and reduced independently through the injected
//! [`ParallelMap`], and the results are re-keyed in sorted key order.

use crate::config::{ExtractionMethod, PreprocessConfig};
use crate::data::{split_columns, GroupedVectors, MaskedMatrix, PaceVector, ReducedVector};
use crate::error::{PreprocessError, Result};
use crate::filter::remove_bad_dimensions_grouped;
use crate::impute::impute_missing_data;
use crate::normalize::{scale_and_center, RowStatistics};
use crate::parallel::{ParallelMap, SequentialMap};
use crate::pca::{ComponentExtractor, ConvergenceReport, CovarianceEigenPca, EmPca};
use log::{debug, info, warn};
use ndarray::{Array1, Array2};
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Everything learned while reducing one group, apart from the vectors.
#[derive(Clone, Debug)]
pub struct GroupModel {
    /// Shape: (n_retained_dimensions, n_pcs)
    pub loadings: Array2<f64>,
    /// Means (and standard deviations, if scaled) removed before extraction.
    pub row_statistics: RowStatistics,
    /// Value each dimension's missing cells were filled with.
    pub imputed_values: Array1<f64>,
    pub explained_variance: Option<Array1<f64>>,
    pub convergence: Option<ConvergenceReport>,
}

/// One group after reduction.
#[derive(Clone, Debug)]
pub struct ProcessedGroup {
    /// One reduced vector per input vector, same order.
    pub vectors: Vec<ReducedVector>,
    pub model: GroupModel,
}

/// Result of [`preprocess_data`].
#[derive(Clone, Debug)]
pub struct PreprocessOutput<K: Ord> {
    /// Reduced vectors under the original keys and in the original order.
    pub groups: GroupedVectors<K, ReducedVector>,
    pub models: BTreeMap<K, GroupModel>,
    /// Original dimension indices kept in every group.
    pub kept_dimensions: Vec<usize>,
    /// Missing fraction of every original dimension.
    pub missing_fractions: Array1<f64>,
}

impl<K: Ord> PreprocessOutput<K> {
    /// Groups whose EM run hit its iteration cap.
    pub fn unconverged_groups(&self) -> Vec<&K> {
        self.models
            .iter()
            .filter(|(_, model)| model.convergence.as_ref().map_or(false, |c| !c.converged))
            .map(|(key, _)| key)
            .collect()
    }
}

/// Reduces one group with the batch (covariance eigendecomposition) strategy.
pub fn preprocess_group(vectors: &[PaceVector], n_pcs: usize, scale: bool) -> Result<Vec<ReducedVector>> {
    preprocess_group_with(vectors, n_pcs, scale, &CovarianceEigenPca, 0).map(|group| group.vectors)
}

/// Stacks `vectors` into a matrix, imputes missing cells, centers (and
/// optionally scales) each dimension, extracts `n_pcs` components and splits
/// the scores back into one vector per observation.
pub fn preprocess_group_with<E: ComponentExtractor + ?Sized>(
    vectors: &[PaceVector],
    n_pcs: usize,
    scale: bool,
    extractor: &E,
    task_index: usize,
) -> Result<ProcessedGroup> {
    let mut masked = MaskedMatrix::stack_columns(vectors)?;
    let imputed_values = impute_missing_data(&mut masked)?;
    let mut data_matrix = masked.into_dense()?;
    let row_statistics = scale_and_center(&mut data_matrix, scale)?;

    let components = extractor.extract(&data_matrix.view(), n_pcs, task_index)?;
    let reduced = split_columns(&components.scores);
    debug!(
        "Group task {}: {} observations reduced from {} to {} dimensions.",
        task_index,
        reduced.len(),
        data_matrix.nrows(),
        n_pcs
    );

    Ok(ProcessedGroup {
        vectors: reduced,
        model: GroupModel {
            loadings: components.loadings,
            row_statistics,
            imputed_values,
            explained_variance: components.explained_variance,
            convergence: components.convergence,
        },
    })
}

fn extractor_for(config: &PreprocessConfig) -> Box<dyn ComponentExtractor> {
    match &config.method {
        ExtractionMethod::Batch => Box::new(CovarianceEigenPca),
        ExtractionMethod::Em(em_config) => Box::new(EmPca::new(em_config.clone(), config.random_seed)),
    }
}

/// Preprocesses every group: shared dimension pruning, then per-group
/// imputation, normalization and PCA through `pool`.
///
/// Groups are processed as independent tasks in sorted key order; task `i`
/// gets index `i` (and, for EM-PCA, seed `random_seed + i`). Results are
/// recombined by index, so the output is the same for any strategy.
///
/// # Errors
/// - Configuration errors for invalid parameters, empty input, empty groups,
///   or `n_pcs` larger than the number of dimensions that survive pruning.
/// - `GroupFailed` naming the first group (in key order) whose task failed.
pub fn preprocess_data<K, P>(
    grouped: &GroupedVectors<K, PaceVector>,
    config: &PreprocessConfig,
    pool: &P,
) -> Result<PreprocessOutput<K>>
where
    K: Ord + Clone + Debug + Send + Sync,
    P: ParallelMap,
{
    config.validate()?;
    info!(
        "Preprocessing {} groups ({} vectors): n_pcs={}, perc_missing_allowed={}, scale={}, method={:?}",
        grouped.len(),
        grouped.values().map(Vec::len).sum::<usize>(),
        config.n_pcs,
        config.perc_missing_allowed,
        config.scale,
        config.method
    );
    let start_time = std::time::Instant::now();

    let selection = remove_bad_dimensions_grouped(grouped, config.perc_missing_allowed)?;
    let n_retained = selection.kept_dimensions.len();
    if config.n_pcs > n_retained {
        return Err(PreprocessError::invalid_configuration(format!(
            "n_pcs ({}) exceeds the {} dimensions that survived missing-data pruning",
            config.n_pcs, n_retained
        )));
    }

    let extractor = extractor_for(config);
    let extractor_ref: &dyn ComponentExtractor = extractor.as_ref();
    let n_pcs = config.n_pcs;
    let scale = config.scale;

    let tasks: Vec<(usize, &Vec<PaceVector>)> = selection.groups.values().enumerate().collect();
    let results = pool.map(tasks, |(task_index, vectors)| {
        preprocess_group_with(vectors, n_pcs, scale, extractor_ref, task_index)
    });

    let mut groups = GroupedVectors::new();
    let mut models = BTreeMap::new();
    for (key, result) in selection.groups.keys().zip(results) {
        let processed = result.map_err(|e| PreprocessError::GroupFailed {
            group: format!("{:?}", key),
            source: Box::new(e),
        })?;
        groups.insert(key.clone(), processed.vectors);
        models.insert(key.clone(), processed.model);
    }

    let output = PreprocessOutput {
        groups,
        models,
        kept_dimensions: selection.kept_dimensions,
        missing_fractions: selection.missing_fractions,
    };
    let unconverged = output.unconverged_groups();
    if !unconverged.is_empty() {
        warn!("EM-PCA did not converge for {} groups: {:?}", unconverged.len(), unconverged);
    }
    info!(
        "Preprocessed {} groups to {} components in {:?}.",
        output.groups.len(),
        n_pcs,
        start_time.elapsed()
    );
    Ok(output)
}

/// [`preprocess_data`] with the sequential strategy.
pub fn preprocess_data_default<K>(
    grouped: &GroupedVectors<K, PaceVector>,
    config: &PreprocessConfig,
) -> Result<PreprocessOutput<K>>
where
    K: Ord + Clone + Debug + Send + Sync,
{
    preprocess_data(grouped, config, &SequentialMap)
}
