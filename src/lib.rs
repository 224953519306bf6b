// Preprocessing of grouped pace vectors for outlier detection

#![doc = include_str!("../README.md")]

pub mod config;
pub mod data;
pub mod diagnostics;
pub mod eigen;
pub mod error;
pub mod filter;
pub mod impute;
pub mod linalg_backends;
pub mod normalize;
pub mod parallel;
pub mod pca;
pub mod pipeline;

#[cfg(test)]
mod pipeline_tests;

pub use config::{EmPcaConfig, ExtractionMethod, PreprocessConfig};
pub use data::{
    pace_vector_from_sentinel, GroupedVectors, MaskedMatrix, PaceVector, ReducedVector, TimeSlot, Weekday,
    MISSING_SENTINEL,
};
pub use eigen::{sorted_eig, sorted_eigh, EigenPair};
pub use error::{PreprocessError, Result};
pub use filter::{remove_bad_dimensions, remove_bad_dimensions_grouped, DimensionSelection, GroupedSelection};
pub use impute::impute_missing_data;
pub use normalize::{scale_and_center, RowStatistics};
pub use parallel::{ParallelMap, RayonMap, SequentialMap};
pub use pca::{em_pca, pca, ComponentExtractor, ConvergenceReport, CovarianceEigenPca, EmPca, PrincipalComponents};
pub use pipeline::{
    preprocess_data, preprocess_data_default, preprocess_group, preprocess_group_with, GroupModel, PreprocessOutput,
    ProcessedGroup,
};
