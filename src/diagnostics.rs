// src/diagnostics.rs

use ndarray::{Array2, ArrayView2};

/// Computes the Frobenius norm of a matrix.
pub fn frobenius_norm(matrix: &ArrayView2<f64>) -> f64 {
    if matrix.is_empty() {
        return 0.0;
    }
    matrix.iter().map(|&x| x * x).sum::<f64>().sqrt()
}

/// Total squared reconstruction error `sum((data - loadings * scores)^2)`.
///
/// `data` is variables × observations, `loadings` variables × k and `scores`
/// k × observations.
pub fn squared_reconstruction_error(
    data: &ArrayView2<f64>,
    loadings: &ArrayView2<f64>,
    scores: &ArrayView2<f64>,
) -> f64 {
    let reconstruction = loadings.dot(scores);
    data.iter()
        .zip(reconstruction.iter())
        .map(|(&x, &r)| (x - r) * (x - r))
        .sum()
}

/// Computes `||I - Q^T Q||_F`. Zero for a matrix with orthonormal columns.
pub fn orthogonality_error(q_matrix: &ArrayView2<f64>) -> f64 {
    if q_matrix.ncols() == 0 {
        return 0.0;
    }
    let gram = q_matrix.t().dot(q_matrix);
    let deviation = Array2::<f64>::eye(q_matrix.ncols()) - gram;
    frobenius_norm(&deviation.view())
}
