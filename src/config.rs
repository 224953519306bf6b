use crate::error::{PreprocessError, Result};
use crate::filter::validate_missing_threshold;
use serde::{Deserialize, Serialize};

/// Stopping rule and finishing step for EM-PCA.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmPcaConfig {
    /// Hard cap on EM iterations. Reaching it without meeting `tolerance`
    /// is reported as non-convergence, not as an error.
    pub max_iterations: usize,
    /// Stop once the relative improvement of the squared reconstruction error,
    /// `(previous - current) / previous`, drops below this value.
    pub tolerance: f64,
    /// Rotate the converged subspace onto its principal axes (orthonormal
    /// loadings ordered by explained variance).
    pub orthonormalize: bool,
    /// Gram matrices whose reciprocal condition number falls below this are
    /// treated as singular.
    pub min_rcond: f64,
}

impl Default for EmPcaConfig {
    fn default() -> Self {
        EmPcaConfig {
            max_iterations: 500,
            tolerance: 1e-9,
            orthonormalize: true,
            min_rcond: 1e-12,
        }
    }
}

impl EmPcaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(PreprocessError::invalid_configuration("max_iterations must be greater than 0"));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(PreprocessError::invalid_configuration(format!(
                "tolerance must be finite and non-negative, got {}",
                self.tolerance
            )));
        }
        if !self.min_rcond.is_finite() || self.min_rcond < 0.0 {
            return Err(PreprocessError::invalid_configuration(format!(
                "min_rcond must be finite and non-negative, got {}",
                self.min_rcond
            )));
        }
        Ok(())
    }
}

/// Which principal component algorithm runs on each group.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum ExtractionMethod {
    /// Covariance matrix + full eigendecomposition.
    #[default]
    Batch,
    /// Iterative EM factorization; never forms the covariance matrix.
    Em(EmPcaConfig),
}

/// Parameters for [`crate::pipeline::preprocess_data`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Number of principal components kept per group.
    pub n_pcs: usize,
    /// Dimensions whose missing fraction is not strictly below this are dropped.
    pub perc_missing_allowed: f64,
    /// Divide each dimension by its standard deviation after centering.
    pub scale: bool,
    pub method: ExtractionMethod,
    /// Base seed for randomized initialization. Group `i` (in sorted key order)
    /// uses `seed + i`.
    pub random_seed: u64,
}

impl PreprocessConfig {
    /// Defaults with the given component count.
    pub fn new(n_pcs: usize) -> Self {
        PreprocessConfig {
            n_pcs,
            perc_missing_allowed: 0.05,
            scale: true,
            method: ExtractionMethod::Batch,
            random_seed: 2025,
        }
    }

    pub fn with_perc_missing_allowed(mut self, perc_missing_allowed: f64) -> Self {
        self.perc_missing_allowed = perc_missing_allowed;
        self
    }

    pub fn with_scale(mut self, scale: bool) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_method(mut self, method: ExtractionMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_random_seed(mut self, random_seed: u64) -> Self {
        self.random_seed = random_seed;
        self
    }

    /// Checks everything that can be checked before seeing the data.
    /// The upper bound on `n_pcs` depends on how many dimensions survive
    /// pruning and is checked later.
    pub fn validate(&self) -> Result<()> {
        if self.n_pcs == 0 {
            return Err(PreprocessError::invalid_configuration("n_pcs must be greater than 0"));
        }
        validate_missing_threshold(self.perc_missing_allowed)?;
        if let ExtractionMethod::Em(em_config) = &self.method {
            em_config.validate()?;
        }
        Ok(())
    }
}
