// Principal component extraction

use crate::config::EmPcaConfig;
use crate::diagnostics::squared_reconstruction_error;
use crate::eigen::sorted_eigh_with;
use crate::error::{PreprocessError, Result};
use crate::linalg_backends::{BackendEigh, BackendInverse, BackendQR, NdarrayLinAlgBackend};
use log::{debug, trace, warn};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::Uniform;

/// A squared error below this fraction of the data's total sum of squares is
/// round-off; the factorization is exact.
const EXACT_FIT_FRACTION: f64 = 1e-28;

/// Result of a principal component extraction.
#[derive(Clone, Debug)]
pub struct PrincipalComponents {
    /// Basis vectors as columns.
    /// Shape: (n_variables, n_pcs)
    pub loadings: Array2<f64>,
    /// Coordinates of every observation in the reduced basis.
    /// Shape: (n_pcs, n_observations)
    pub scores: Array2<f64>,
    /// Variance captured by each component, descending.
    /// `None` for raw (non-orthonormalized) EM factors.
    pub explained_variance: Option<Array1<f64>>,
    /// Set by the EM strategy only.
    pub convergence: Option<ConvergenceReport>,
}

/// How an EM-PCA run ended.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvergenceReport {
    /// False when `max_iterations` was reached before the tolerance was met.
    pub converged: bool,
    pub iterations: usize,
    /// Squared reconstruction error of the returned factors (before any
    /// orthonormalizing rotation).
    pub squared_error: f64,
    /// Relative improvement achieved by the last iteration.
    pub relative_improvement: f64,
}

fn validate_component_count(n_variables: usize, n_pcs: usize) -> Result<()> {
    if n_pcs == 0 {
        return Err(PreprocessError::invalid_configuration("n_pcs must be greater than 0"));
    }
    if n_pcs > n_variables {
        return Err(PreprocessError::invalid_configuration(format!(
            "n_pcs ({}) exceeds the number of variables ({})",
            n_pcs, n_variables
        )));
    }
    Ok(())
}

/// Scales each column to unit length; near-zero columns become zero.
fn normalize_columns(matrix: &mut Array2<f64>) {
    for mut column in matrix.columns_mut() {
        let norm = column.dot(&column).sqrt();
        if norm > 1e-12 {
            column.mapv_inplace(|x| x / norm);
        } else {
            column.fill(0.0);
        }
    }
}

/// Subtracts each row's mean and divides `X Xᵀ` by `divisor`, then symmetrizes.
fn row_covariance(data: &ArrayView2<f64>, divisor: f64) -> Array2<f64> {
    let mut centered = data.to_owned();
    if let Some(means) = data.mean_axis(Axis(1)) {
        centered -= &means.insert_axis(Axis(1));
    }
    let mut cov = centered.dot(&centered.t());
    cov /= divisor;
    // Round-off leaves cov slightly asymmetric.
    let transposed = cov.t().to_owned();
    (cov + transposed) * 0.5
}

/// Extracts the top `n_pcs` principal components by eigendecomposing the full
/// covariance matrix.
///
/// `data_matrix` is variables × observations and is expected to be centered
/// (and optionally scaled) already. The covariance is formed with the usual
/// N-1 denominator; loadings are its leading unit eigenvectors, and scores are
/// the projection `loadingsᵀ · data_matrix`.
///
/// Cost is dominated by forming the covariance, O(variables² · observations),
/// and by its O(variables³) eigendecomposition.
///
/// # Errors
/// - `InvalidConfiguration` if `n_pcs` is zero or exceeds the variable count.
/// - `InsufficientObservations` with fewer than 2 observations.
pub fn pca(data_matrix: &ArrayView2<f64>, n_pcs: usize) -> Result<PrincipalComponents> {
    pca_with(&NdarrayLinAlgBackend, data_matrix, n_pcs)
}

pub fn pca_with<B: BackendEigh>(
    backend: &B,
    data_matrix: &ArrayView2<f64>,
    n_pcs: usize,
) -> Result<PrincipalComponents> {
    let (n_variables, n_observations) = data_matrix.dim();
    validate_component_count(n_variables, n_pcs)?;
    if n_observations < 2 {
        return Err(PreprocessError::InsufficientObservations {
            required: 2,
            actual: n_observations,
        });
    }

    let cov_matrix = row_covariance(data_matrix, (n_observations - 1) as f64);
    let top = sorted_eigh_with(backend, &cov_matrix)?.truncate(n_pcs);

    let mut loadings = top.eigenvectors;
    normalize_columns(&mut loadings);
    let scores = loadings.t().dot(data_matrix);
    let explained_variance = top.eigenvalues.mapv(|v| v.max(0.0));
    debug!(
        "Batch PCA on {} x {} matrix; leading eigenvalues {:?}",
        n_variables, n_observations, explained_variance
    );

    Ok(PrincipalComponents {
        loadings,
        scores,
        explained_variance: Some(explained_variance),
        convergence: None,
    })
}

fn checked_inverse<B: BackendInverse>(
    backend: &B,
    matrix: &Array2<f64>,
    context: &str,
    min_rcond: f64,
) -> Result<Array2<f64>> {
    let rcond = match backend.rcond(matrix) {
        Ok(r) => r,
        Err(e) => {
            // LAPACK refuses to factorize an exactly singular matrix.
            debug!("Condition estimate failed in {}: {}", context, e);
            0.0
        }
    };
    if !(rcond >= min_rcond) {
        return Err(PreprocessError::SingularMatrix {
            context: context.to_string(),
            rcond,
        });
    }
    backend
        .inverse(matrix)
        .map_err(|e| PreprocessError::linear_algebra(context, e))
}

/// Extracts `n_pcs` components with the EM algorithm of Roweis ("EM Algorithms
/// for PCA and SPCA").
///
/// Loadings start from independent uniform draws of `rng`. Each iteration
/// solves for the scores that best reconstruct the data given the loadings
/// (E-step), then for the loadings given the scores (M-step). The full
/// covariance matrix is never formed; each iteration costs
/// O(variables · n_pcs · observations).
///
/// Iteration stops when the relative improvement of the squared
/// reconstruction error falls below `config.tolerance` or after
/// `config.max_iterations`. The lowest-error factor pair is returned; if the
/// cap was hit the [`ConvergenceReport`] says so and a warning is logged.
///
/// With `config.orthonormalize` the converged subspace is rotated onto its
/// principal axes, so the loadings are orthonormal and ordered like those of
/// [`pca`].
///
/// # Errors
/// - `InvalidConfiguration` for a bad `n_pcs` or `config`.
/// - `InsufficientObservations` if `n_pcs` exceeds the observation count.
/// - `SingularMatrix` if `LᵀL` or `S Sᵀ` cannot be inverted.
pub fn em_pca<R: Rng + ?Sized>(
    data_matrix: &ArrayView2<f64>,
    n_pcs: usize,
    config: &EmPcaConfig,
    rng: &mut R,
) -> Result<PrincipalComponents> {
    em_pca_with(&NdarrayLinAlgBackend, data_matrix, n_pcs, config, rng)
}

pub fn em_pca_with<B, R>(
    backend: &B,
    data_matrix: &ArrayView2<f64>,
    n_pcs: usize,
    config: &EmPcaConfig,
    rng: &mut R,
) -> Result<PrincipalComponents>
where
    B: BackendEigh + BackendQR + BackendInverse,
    R: Rng + ?Sized,
{
    config.validate()?;
    let (n_variables, n_observations) = data_matrix.dim();
    validate_component_count(n_variables, n_pcs)?;
    if n_observations < n_pcs {
        return Err(PreprocessError::InsufficientObservations {
            required: n_pcs,
            actual: n_observations,
        });
    }

    let total_sum_of_squares: f64 = data_matrix.iter().map(|x| x * x).sum();
    let mut loadings: Array2<f64> = Array2::random_using((n_variables, n_pcs), Uniform::new(0.0, 1.0), rng);

    let mut best: Option<(Array2<f64>, Array2<f64>, f64)> = None;
    let mut previous_error: Option<f64> = None;
    let mut relative_improvement = f64::INFINITY;
    let mut converged = false;
    let mut iterations = 0;

    while iterations < config.max_iterations {
        iterations += 1;

        // E-step: scores = (LᵀL)⁻¹ Lᵀ X
        let loadings_gram = loadings.t().dot(&loadings);
        let loadings_gram_inv = checked_inverse(backend, &loadings_gram, "EM-PCA E-step (LᵀL)", config.min_rcond)?;
        let scores = loadings_gram_inv.dot(&loadings.t()).dot(data_matrix);

        // M-step: loadings = X Sᵀ (S Sᵀ)⁻¹
        let scores_gram = scores.dot(&scores.t());
        let scores_gram_inv = checked_inverse(backend, &scores_gram, "EM-PCA M-step (SSᵀ)", config.min_rcond)?;
        loadings = data_matrix.dot(&scores.t()).dot(&scores_gram_inv);

        let error = squared_reconstruction_error(data_matrix, &loadings.view(), &scores.view());
        trace!("EM-PCA iteration {}: squared error {:e}", iterations, error);

        if let Some(previous) = previous_error {
            relative_improvement = if previous > 0.0 {
                (previous - error) / previous
            } else {
                0.0
            };
        }
        let is_best = best.as_ref().map_or(true, |(_, _, best_error)| error <= *best_error);
        if is_best {
            best = Some((loadings.clone(), scores, error));
        }
        previous_error = Some(error);

        if error <= total_sum_of_squares * EXACT_FIT_FRACTION || relative_improvement < config.tolerance {
            converged = true;
            break;
        }
    }

    let (raw_loadings, raw_scores, squared_error) = best.ok_or_else(|| {
        PreprocessError::invalid_configuration("EM-PCA ran no iterations")
    })?;

    if converged {
        debug!(
            "EM-PCA converged after {} iterations (squared error {:e}).",
            iterations, squared_error
        );
    } else {
        warn!(
            "EM-PCA did not converge within {} iterations (last relative improvement {:e}, tolerance {:e}); returning best factors so far.",
            config.max_iterations, relative_improvement, config.tolerance
        );
    }

    let report = ConvergenceReport {
        converged,
        iterations,
        squared_error,
        relative_improvement,
    };

    if !config.orthonormalize {
        return Ok(PrincipalComponents {
            loadings: raw_loadings,
            scores: raw_scores,
            explained_variance: None,
            convergence: Some(report),
        });
    }

    // Rotate the learned subspace onto its principal axes: orthonormal basis
    // Q of span(L), then PCA of the small projected data Qᵀ X.
    let q_basis = backend
        .qr_q_factor(&raw_loadings)
        .map_err(|e| PreprocessError::linear_algebra("EM-PCA orthonormalization (QR)", e))?;
    let projected = q_basis.t().dot(data_matrix);
    let divisor = n_observations.saturating_sub(1).max(1) as f64;
    let small_cov = row_covariance(&projected.view(), divisor);
    let rotation = sorted_eigh_with(backend, &small_cov)?;

    let mut loadings = q_basis.dot(&rotation.eigenvectors);
    normalize_columns(&mut loadings);
    let scores = loadings.t().dot(data_matrix);

    Ok(PrincipalComponents {
        loadings,
        scores,
        explained_variance: Some(rotation.eigenvalues.mapv(|v| v.max(0.0))),
        convergence: Some(report),
    })
}

/// A principal component strategy that can be applied to one group.
///
/// `task_index` identifies the group within a run so that randomized
/// strategies can derive an independent generator per task.
pub trait ComponentExtractor: Sync {
    fn extract(&self, data_matrix: &ArrayView2<f64>, n_pcs: usize, task_index: usize) -> Result<PrincipalComponents>;
}

/// Batch strategy: covariance matrix + eigendecomposition. See [`pca`].
#[derive(Clone, Copy, Debug, Default)]
pub struct CovarianceEigenPca;

impl ComponentExtractor for CovarianceEigenPca {
    fn extract(&self, data_matrix: &ArrayView2<f64>, n_pcs: usize, _task_index: usize) -> Result<PrincipalComponents> {
        pca(data_matrix, n_pcs)
    }
}

/// Iterative strategy. See [`em_pca`].
///
/// Task `i` draws its initial loadings from `ChaCha8Rng::seed_from_u64(seed + i)`,
/// so results are reproducible and independent of how tasks are scheduled.
#[derive(Clone, Debug)]
pub struct EmPca {
    pub config: EmPcaConfig,
    pub seed: u64,
}

impl EmPca {
    pub fn new(config: EmPcaConfig, seed: u64) -> Self {
        Self { config, seed }
    }
}

impl ComponentExtractor for EmPca {
    fn extract(&self, data_matrix: &ArrayView2<f64>, n_pcs: usize, task_index: usize) -> Result<PrincipalComponents> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(task_index as u64));
        em_pca(data_matrix, n_pcs, &self.config, &mut rng)
    }
}
