//! Error types for the preprocessing pipeline.
//!
//! Variants fall into two families: configuration problems (bad parameters or
//! inconsistent inputs) and data-quality problems (the data cannot support the
//! requested computation). EM non-convergence is not an error; it is reported
//! through [`crate::pca::ConvergenceReport`].

use crate::linalg_backends::ThreadSafeStdError;
use thiserror::Error;

/// Main error type for preprocessing operations.
#[derive(Error, Debug)]
pub enum PreprocessError {
    /// A parameter is outside its valid range or the input is empty.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Vectors or matrices that must agree in shape do not.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A retained dimension has no observed entries, so its mean is undefined.
    #[error("Dimension {dimension} has no observed values; imputation is undefined")]
    UnobservedDimension { dimension: usize },

    /// A dimension is constant, so it cannot be scaled to unit variance.
    #[error("Dimension {dimension} has zero variance; scaling is undefined")]
    ZeroVariance { dimension: usize },

    /// Too few observations for the requested statistic.
    #[error("Need at least {required} observations, got {actual}")]
    InsufficientObservations { required: usize, actual: usize },

    /// A matrix that must be inverted or decomposed is numerically singular.
    #[error("Singular matrix in {context} (reciprocal condition number {rcond:e})")]
    SingularMatrix { context: String, rcond: f64 },

    /// Missing cells remain where a dense matrix is required.
    #[error("{count} missing values remain; impute before densifying")]
    MissingValuesRemain { count: usize },

    /// The linear-algebra backend failed.
    #[error("Linear algebra failure in {context}: {source}")]
    LinearAlgebra {
        context: String,
        #[source]
        source: ThreadSafeStdError,
    },

    /// Preprocessing a single group failed.
    #[error("Preprocessing group {group} failed: {source}")]
    GroupFailed {
        group: String,
        #[source]
        source: Box<PreprocessError>,
    },
}

/// Result type alias for preprocessing operations.
pub type Result<T> = std::result::Result<T, PreprocessError>;

impl PreprocessError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Wrap a backend error with the operation that produced it.
    #[must_use]
    pub fn linear_algebra(context: impl Into<String>, source: ThreadSafeStdError) -> Self {
        Self::LinearAlgebra {
            context: context.into(),
            source,
        }
    }

    /// True for parameter and shape errors.
    pub fn is_configuration_error(&self) -> bool {
        match self {
            Self::InvalidConfiguration(_) | Self::DimensionMismatch { .. } => true,
            Self::GroupFailed { source, .. } => source.is_configuration_error(),
            _ => false,
        }
    }

    /// True when the data itself cannot support the computation.
    pub fn is_data_quality_error(&self) -> bool {
        match self {
            Self::UnobservedDimension { .. }
            | Self::ZeroVariance { .. }
            | Self::InsufficientObservations { .. }
            | Self::SingularMatrix { .. }
            | Self::MissingValuesRemain { .. } => true,
            Self::GroupFailed { source, .. } => source.is_data_quality_error(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_failure_classifies_by_source() {
        let err = PreprocessError::GroupFailed {
            group: "Monday 08h".to_string(),
            source: Box::new(PreprocessError::ZeroVariance { dimension: 3 }),
        };
        assert!(err.is_data_quality_error());
        assert!(!err.is_configuration_error());
        assert!(err.to_string().contains("Monday 08h"));
    }

    #[test]
    fn configuration_errors() {
        assert!(PreprocessError::invalid_configuration("n_pcs must be positive").is_configuration_error());
        assert!(PreprocessError::DimensionMismatch { expected: 4, actual: 3 }.is_configuration_error());
    }
}
