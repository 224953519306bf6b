use crate::data::MaskedMatrix;
use crate::error::{PreprocessError, Result};
use log::debug;
use ndarray::Array1;

/// Replaces every missing cell with the mean of the observed cells in its row.
///
/// Works in place; afterwards the mask is fully observed. Returns the fill
/// value used for each row.
///
/// # Errors
/// `UnobservedDimension` if a row has no observed cell. The matrix is left
/// untouched in that case.
pub fn impute_missing_data(matrix: &mut MaskedMatrix) -> Result<Array1<f64>> {
    let (n_dims, n_obs) = matrix.dim();
    let mut row_means = Array1::<f64>::zeros(n_dims);

    for i in 0..n_dims {
        let mut sum = 0.0;
        let mut count = 0usize;
        for j in 0..n_obs {
            if matrix.is_observed(i, j) {
                sum += matrix.values()[[i, j]];
                count += 1;
            }
        }
        if count == 0 {
            return Err(PreprocessError::UnobservedDimension { dimension: i });
        }
        row_means[i] = sum / count as f64;
    }

    let mut filled = 0usize;
    for i in 0..n_dims {
        for j in 0..n_obs {
            if !matrix.is_observed(i, j) {
                matrix.fill(i, j, row_means[i]);
                filled += 1;
            }
        }
    }
    debug!("Imputed {} missing values in a {} x {} matrix.", filled, n_dims, n_obs);

    Ok(row_means)
}
