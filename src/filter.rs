//! Pruning of dimensions with too much missing data.
//!
//! The grouped variant concatenates every group before filtering so the same
//! dimensions are removed from all groups and the reduced feature space stays
//! comparable across time slots.

use crate::data::{GroupedVectors, MaskedMatrix, PaceVector};
use crate::error::{PreprocessError, Result};
use log::{debug, info, warn};
use ndarray::{Array1, Axis};
use std::fmt::Debug;

/// Outcome of pruning a single matrix.
#[derive(Clone, Debug)]
pub struct DimensionSelection {
    /// The matrix restricted to the kept rows.
    pub matrix: MaskedMatrix,
    /// Original row indices of the kept dimensions, ascending.
    pub kept_dimensions: Vec<usize>,
    /// Missing fraction of every original dimension.
    pub missing_fractions: Array1<f64>,
}

/// Outcome of pruning grouped vectors.
#[derive(Clone, Debug)]
pub struct GroupedSelection<K: Ord> {
    pub groups: GroupedVectors<K, PaceVector>,
    /// Original dimension indices retained in every group.
    pub kept_dimensions: Vec<usize>,
    pub missing_fractions: Array1<f64>,
}

pub(crate) fn validate_missing_threshold(perc_missing_allowed: f64) -> Result<()> {
    if !(0.0..1.0).contains(&perc_missing_allowed) {
        return Err(PreprocessError::invalid_configuration(format!(
            "perc_missing_allowed must be in [0, 1), got {}",
            perc_missing_allowed
        )));
    }
    Ok(())
}

/// Fraction of missing cells per dimension, ignoring observations in which
/// every dimension is missing.
///
/// If every observation is entirely missing there is nothing to measure and
/// each dimension reports `1.0`.
pub fn missing_fraction_per_dimension(matrix: &MaskedMatrix) -> Array1<f64> {
    let (n_dims, n_obs) = matrix.dim();
    let observed = matrix.observed();

    let informative_columns: Vec<usize> = observed
        .axis_iter(Axis(1))
        .enumerate()
        .filter(|(_, col)| col.iter().any(|&seen| seen))
        .map(|(j, _)| j)
        .collect();
    let num_all_missing = n_obs - informative_columns.len();
    debug!("Observations where every dimension is missing: {}", num_all_missing);

    if informative_columns.is_empty() {
        return Array1::from_elem(n_dims, 1.0);
    }

    let denominator = informative_columns.len() as f64;
    Array1::from_shape_fn(n_dims, |i| {
        let missing = informative_columns
            .iter()
            .filter(|&&j| !observed[[i, j]])
            .count();
        missing as f64 / denominator
    })
}

/// Removes dimensions (rows) whose missing fraction is not strictly below
/// `perc_missing_allowed`.
///
/// Surviving rows keep their original order. Zero survivors is not an error
/// at this level; the returned matrix simply has no rows.
pub fn remove_bad_dimensions(matrix: &MaskedMatrix, perc_missing_allowed: f64) -> Result<DimensionSelection> {
    validate_missing_threshold(perc_missing_allowed)?;
    let (n_dims, n_obs) = matrix.dim();
    info!("Full data matrix before cutting: {} x {}", n_dims, n_obs);

    let missing_fractions = missing_fraction_per_dimension(matrix);
    debug!("Missing fraction per dimension: {:?}", missing_fractions);

    let kept_dimensions: Vec<usize> = missing_fractions
        .iter()
        .enumerate()
        .filter(|(_, &fraction)| fraction < perc_missing_allowed)
        .map(|(i, _)| i)
        .collect();

    let reduced = matrix.select_rows(&kept_dimensions);
    info!("Full data matrix after cutting: {} x {}", reduced.nrows(), reduced.ncols());
    if kept_dimensions.is_empty() && n_dims > 0 {
        warn!(
            "No dimension has less than {:.1}% missing data; every dimension was removed.",
            perc_missing_allowed * 100.0
        );
    }

    Ok(DimensionSelection {
        matrix: reduced,
        kept_dimensions,
        missing_fractions,
    })
}

/// Removes the same dimensions from every group.
///
/// All vectors are concatenated in sorted-key order (within-group order
/// preserved), filtered once, and split back using the original group sizes.
pub fn remove_bad_dimensions_grouped<K>(
    grouped: &GroupedVectors<K, PaceVector>,
    perc_missing_allowed: f64,
) -> Result<GroupedSelection<K>>
where
    K: Ord + Clone + Debug,
{
    validate_missing_threshold(perc_missing_allowed)?;
    if grouped.is_empty() {
        return Err(PreprocessError::invalid_configuration("no groups to preprocess"));
    }
    if let Some((key, _)) = grouped.iter().find(|(_, vectors)| vectors.is_empty()) {
        return Err(PreprocessError::invalid_configuration(format!(
            "group {:?} has no observation vectors",
            key
        )));
    }

    let all_vectors: Vec<PaceVector> = grouped.values().flatten().cloned().collect();
    let big_matrix = MaskedMatrix::stack_columns(&all_vectors)?;

    let selection = remove_bad_dimensions(&big_matrix, perc_missing_allowed)?;

    let mut groups = GroupedVectors::new();
    let mut start = 0;
    for (key, vectors) in grouped {
        let end = start + vectors.len();
        let group_vectors = (start..end).map(|j| selection.matrix.column(j)).collect();
        groups.insert(key.clone(), group_vectors);
        start = end;
    }

    Ok(GroupedSelection {
        groups,
        kept_dimensions: selection.kept_dimensions,
        missing_fractions: selection.missing_fractions,
    })
}
