//! Eigendecompositions with eigenpairs sorted by descending eigenvalue.
//!
//! The sort is stable, so eigenpairs with equal eigenvalues keep the order the
//! backend returned them in. That order is implementation-defined; callers
//! should only rely on quantities that do not depend on it (e.g. the span of
//! the leading eigenvectors).

use crate::error::{PreprocessError, Result};
use crate::linalg_backends::{BackendEig, BackendEigh, NdarrayLinAlgBackend};
use ndarray::{Array1, Array2, Axis};
use ndarray_linalg::c64;
use std::cmp::Ordering;

/// Eigenvalues and their eigenvectors (as columns), jointly sorted descending.
#[derive(Clone, Debug)]
pub struct EigenPair<T> {
    pub eigenvalues: Array1<T>,
    pub eigenvectors: Array2<T>,
}

impl<T: Clone> EigenPair<T> {
    pub fn len(&self) -> usize {
        self.eigenvalues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eigenvalues.is_empty()
    }

    /// The leading `k` eigenpairs.
    pub fn truncate(&self, k: usize) -> Self {
        let k = k.min(self.len());
        let order: Vec<usize> = (0..k).collect();
        Self {
            eigenvalues: self.eigenvalues.select(Axis(0), &order),
            eigenvectors: self.eigenvectors.select(Axis(1), &order),
        }
    }
}

impl EigenPair<c64> {
    /// Drops imaginary parts. Eigenpairs of a slightly asymmetric covariance
    /// estimate carry tiny imaginary components that are numerical noise.
    pub fn real_part(&self) -> EigenPair<f64> {
        EigenPair {
            eigenvalues: self.eigenvalues.mapv(|z| z.re),
            eigenvectors: self.eigenvectors.mapv(|z| z.re),
        }
    }
}

fn descending_order<T, F>(eigenvalues: &Array1<T>, key: F) -> Vec<usize>
where
    F: Fn(&T) -> f64,
{
    let mut order: Vec<usize> = (0..eigenvalues.len()).collect();
    // Vec::sort_by is stable.
    order.sort_by(|&a, &b| {
        key(&eigenvalues[b])
            .partial_cmp(&key(&eigenvalues[a]))
            .unwrap_or(Ordering::Equal)
    });
    order
}

fn require_square(matrix: &Array2<f64>) -> Result<()> {
    if matrix.nrows() != matrix.ncols() {
        return Err(PreprocessError::DimensionMismatch {
            expected: matrix.nrows(),
            actual: matrix.ncols(),
        });
    }
    Ok(())
}

/// General eigendecomposition of a square matrix, sorted descending by the
/// real part of each eigenvalue.
pub fn sorted_eig(matrix: &Array2<f64>) -> Result<EigenPair<c64>> {
    sorted_eig_with(&NdarrayLinAlgBackend, matrix)
}

pub fn sorted_eig_with<B: BackendEig>(backend: &B, matrix: &Array2<f64>) -> Result<EigenPair<c64>> {
    require_square(matrix)?;
    let output = backend
        .eig_general(matrix)
        .map_err(|e| PreprocessError::linear_algebra("general eigendecomposition", e))?;
    let order = descending_order(&output.eigenvalues, |z| z.re);
    Ok(EigenPair {
        eigenvalues: output.eigenvalues.select(Axis(0), &order),
        eigenvectors: output.eigenvectors.select(Axis(1), &order),
    })
}

/// Eigendecomposition of a symmetric matrix (only the upper triangle is read),
/// sorted descending.
pub fn sorted_eigh(matrix: &Array2<f64>) -> Result<EigenPair<f64>> {
    sorted_eigh_with(&NdarrayLinAlgBackend, matrix)
}

pub fn sorted_eigh_with<B: BackendEigh>(backend: &B, matrix: &Array2<f64>) -> Result<EigenPair<f64>> {
    require_square(matrix)?;
    let output = backend
        .eigh_upper(matrix)
        .map_err(|e| PreprocessError::linear_algebra("symmetric eigendecomposition", e))?;
    let order = descending_order(&output.eigenvalues, |v| *v);
    Ok(EigenPair {
        eigenvalues: output.eigenvalues.select(Axis(0), &order),
        eigenvectors: output.eigenvectors.select(Axis(1), &order),
    })
}
