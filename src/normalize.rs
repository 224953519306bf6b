use crate::error::{PreprocessError, Result};
use ndarray::{Array1, Array2, Axis};

/// A row whose standard deviation is at most this fraction of its largest
/// absolute value is treated as constant when scaling.
pub const ZERO_VARIANCE_TOLERANCE: f64 = 1e-12;

/// Per-row statistics removed by [`scale_and_center`].
#[derive(Clone, Debug, PartialEq)]
pub struct RowStatistics {
    /// Population mean of each row before centering.
    pub means: Array1<f64>,
    /// Population standard deviation of each row, when scaling was requested.
    pub std_devs: Option<Array1<f64>>,
}

/// Centers every row of `data_matrix` on zero and, if `scale` is set, divides
/// it by its population standard deviation (sum of squares over N, not N-1).
///
/// Works in place. Rows are variables, columns observations.
///
/// # Errors
/// - `InsufficientObservations` if the matrix has no columns.
/// - `ZeroVariance` if `scale` is set and a row is constant, i.e. its standard
///   deviation is round-off relative to the row's magnitude. The check runs
///   before any row is divided, but centering has already been applied.
pub fn scale_and_center(data_matrix: &mut Array2<f64>, scale: bool) -> Result<RowStatistics> {
    let n_obs = data_matrix.ncols();
    if n_obs == 0 {
        return Err(PreprocessError::InsufficientObservations { required: 1, actual: 0 });
    }

    // Taken before centering; rounding noise in the std scales with it.
    let magnitudes = data_matrix.map_axis(Axis(1), |row| row.iter().fold(0.0_f64, |m, x| m.max(x.abs())));
    let means = data_matrix
        .mean_axis(Axis(1))
        .ok_or(PreprocessError::InsufficientObservations { required: 1, actual: 0 })?;
    for (mut row, &mean) in data_matrix.axis_iter_mut(Axis(0)).zip(means.iter()) {
        row.mapv_inplace(|x| x - mean);
    }

    if !scale {
        return Ok(RowStatistics { means, std_devs: None });
    }

    // Rows are already centered, so the variance is the mean square.
    let std_devs = data_matrix.map_axis(Axis(1), |row| {
        (row.iter().map(|x| x * x).sum::<f64>() / n_obs as f64).sqrt()
    });
    let is_constant = |(&sd, &magnitude): (&f64, &f64)| sd <= ZERO_VARIANCE_TOLERANCE * magnitude;
    if let Some(dimension) = std_devs.iter().zip(magnitudes.iter()).position(is_constant) {
        return Err(PreprocessError::ZeroVariance { dimension });
    }
    for (mut row, &sd) in data_matrix.axis_iter_mut(Axis(0)).zip(std_devs.iter()) {
        row.mapv_inplace(|x| x / sd);
    }

    Ok(RowStatistics {
        means,
        std_devs: Some(std_devs),
    })
}
