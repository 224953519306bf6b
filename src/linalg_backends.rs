// src/linalg_backends.rs

use ndarray::{Array1, Array2};
use ndarray_linalg::{c64, Eig as NdLinalgEig, Eigh as NdLinalgEigh, Inverse as NdLinalgInverse, QR as NdLinalgQR, ReciprocalConditionNum, UPLO};
use std::error::Error;

/// A thread-safe wrapper for standard dynamic errors,
/// so they implement `Send` and `Sync`.
pub type ThreadSafeStdError = Box<dyn Error + Send + Sync + 'static>;

/// Output of a symmetric eigendecomposition.
#[derive(Debug)]
pub struct EighOutput<F: 'static> {
    /// Eigenvalues, in whatever order the backend produced them (LAPACK: ascending).
    pub eigenvalues: Array1<F>,
    /// Eigenvectors as columns of the matrix.
    /// eigenvectors.column(i) corresponds to eigenvalues[i].
    pub eigenvectors: Array2<F>,
}

/// Output of a general (non-symmetric) eigendecomposition.
/// Eigenpairs of a real matrix may be complex.
#[derive(Debug)]
pub struct EigOutput {
    pub eigenvalues: Array1<c64>,
    pub eigenvectors: Array2<c64>,
}

/// Trait for symmetric eigendecomposition (similar to LAPACK's DSYEVR or DSYEVD).
/// Implementers will typically expect `matrix` to be symmetric.
pub trait BackendEigh {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput<f64>, ThreadSafeStdError>;
}

/// Trait for general eigendecomposition (LAPACK's DGEEV).
pub trait BackendEig {
    fn eig_general(&self, matrix: &Array2<f64>) -> Result<EigOutput, ThreadSafeStdError>;
}

/// Trait for QR decomposition, focusing on retrieving the thin Q factor.
pub trait BackendQR {
    fn qr_q_factor(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, ThreadSafeStdError>;
}

/// Trait for inverting small square matrices (the Gram matrices of EM-PCA).
pub trait BackendInverse {
    /// Reciprocal condition number in the 1-norm. Values near zero mean the
    /// matrix is numerically singular.
    fn rcond(&self, matrix: &Array2<f64>) -> Result<f64, ThreadSafeStdError>;

    fn inverse(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, ThreadSafeStdError>;
}

/// LAPACK-backed implementation through `ndarray-linalg`.
/// The LAPACK provider is chosen by the `backend_*` cargo features.
#[derive(Debug, Default, Copy, Clone)]
pub struct NdarrayLinAlgBackend;

// Helper to convert ndarray-linalg's error to a ThreadSafeStdError
fn to_dyn_error<E: Error + Send + Sync + 'static>(e: E) -> ThreadSafeStdError {
    Box::new(e)
}

fn require_square(matrix: &Array2<f64>, operation: &str) -> Result<(), ThreadSafeStdError> {
    if matrix.nrows() != matrix.ncols() {
        return Err(format!(
            "Matrix must be square for {} (got {}x{}).",
            operation,
            matrix.nrows(),
            matrix.ncols()
        )
        .into());
    }
    Ok(())
}

impl BackendEigh for NdarrayLinAlgBackend {
    fn eigh_upper(&self, matrix: &Array2<f64>) -> Result<EighOutput<f64>, ThreadSafeStdError> {
        require_square(matrix, "symmetric eigendecomposition")?;
        if matrix.is_empty() {
            return Ok(EighOutput { eigenvalues: Array1::zeros(0), eigenvectors: Array2::zeros((0, 0)) });
        }
        let (eigenvalues, eigenvectors) = matrix.eigh(UPLO::Upper).map_err(to_dyn_error)?;
        Ok(EighOutput { eigenvalues, eigenvectors })
    }
}

impl BackendEig for NdarrayLinAlgBackend {
    fn eig_general(&self, matrix: &Array2<f64>) -> Result<EigOutput, ThreadSafeStdError> {
        require_square(matrix, "eigendecomposition")?;
        if matrix.is_empty() {
            return Ok(EigOutput { eigenvalues: Array1::zeros(0), eigenvectors: Array2::zeros((0, 0)) });
        }
        let (eigenvalues, eigenvectors) = matrix.eig().map_err(to_dyn_error)?;
        Ok(EigOutput { eigenvalues, eigenvectors })
    }
}

impl BackendQR for NdarrayLinAlgBackend {
    fn qr_q_factor(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, ThreadSafeStdError> {
        let (q_factor, _r) = matrix.qr().map_err(to_dyn_error)?;
        Ok(q_factor)
    }
}

impl BackendInverse for NdarrayLinAlgBackend {
    fn rcond(&self, matrix: &Array2<f64>) -> Result<f64, ThreadSafeStdError> {
        require_square(matrix, "condition estimation")?;
        if matrix.is_empty() {
            return Ok(0.0);
        }
        matrix.rcond().map_err(to_dyn_error)
    }

    fn inverse(&self, matrix: &Array2<f64>) -> Result<Array2<f64>, ThreadSafeStdError> {
        require_square(matrix, "inversion")?;
        matrix.inv().map_err(to_dyn_error)
    }
}
