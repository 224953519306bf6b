//! Core data types: observation vectors with explicit missingness, the masked
//! variables × observations matrix they stack into, and time-of-week group keys.

use crate::error::{PreprocessError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Value that legacy producers write for an unobserved measurement.
/// A pace of exactly zero cannot occur, so the sentinel is unambiguous there.
pub const MISSING_SENTINEL: f64 = 0.0;

/// One observation: a value per tracked dimension, `None` where unobserved.
pub type PaceVector = Array1<Option<f64>>;

/// One observation after dimensionality reduction (length `n_pcs`).
pub type ReducedVector = Array1<f64>;

/// Observation vectors keyed by group. Iteration follows sorted key order,
/// which fixes the global ordering used when groups are concatenated.
pub type GroupedVectors<K, V> = BTreeMap<K, Vec<V>>;

/// Converts a legacy sentinel-coded vector into a [`PaceVector`].
pub fn pace_vector_from_sentinel(values: &[f64], sentinel: f64) -> PaceVector {
    values
        .iter()
        .map(|&v| if v == sentinel { None } else { Some(v) })
        .collect()
}

/// Day of week, ordered Monday first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A recurring weekly time slot, e.g. Wednesday 05:00-06:00.
///
/// Always holds an hour in `0..24`, including when deserialized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "TimeSlotFields")]
pub struct TimeSlot {
    weekday: Weekday,
    hour: u8,
}

#[derive(Deserialize)]
struct TimeSlotFields {
    weekday: Weekday,
    hour: u8,
}

impl TryFrom<TimeSlotFields> for TimeSlot {
    type Error = PreprocessError;

    fn try_from(fields: TimeSlotFields) -> Result<Self> {
        TimeSlot::new(fields.weekday, fields.hour)
    }
}

impl TimeSlot {
    pub fn new(weekday: Weekday, hour: u8) -> Result<Self> {
        if hour >= 24 {
            return Err(PreprocessError::invalid_configuration(format!(
                "hour of day must be in 0..24, got {}",
                hour
            )));
        }
        Ok(Self { weekday, hour })
    }

    pub fn weekday(&self) -> Weekday {
        self.weekday
    }

    /// Hour of day, `0..24`.
    pub fn hour(&self) -> u8 {
        self.hour
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:02}h", self.weekday, self.hour)
    }
}

/// A variables × observations matrix with an aligned observed-mask.
///
/// Rows are dimensions and columns are observations. Cells whose mask entry is
/// `false` are missing; their slot in `values` holds `0.0` and must not be read
/// as data.
#[derive(Clone, Debug, PartialEq)]
pub struct MaskedMatrix {
    values: Array2<f64>,
    observed: Array2<bool>,
}

impl MaskedMatrix {
    /// Builds a matrix from values and an observed-mask of the same shape.
    pub fn new(mut values: Array2<f64>, observed: Array2<bool>) -> Result<Self> {
        if values.dim() != observed.dim() {
            return Err(PreprocessError::DimensionMismatch {
                expected: values.len(),
                actual: observed.len(),
            });
        }
        values.zip_mut_with(&observed, |v, &seen| {
            if !seen {
                *v = 0.0;
            }
        });
        Ok(Self { values, observed })
    }

    /// A matrix with every cell observed.
    pub fn fully_observed(values: Array2<f64>) -> Self {
        let observed = Array2::from_elem(values.dim(), true);
        Self { values, observed }
    }

    /// Interprets every cell equal to `sentinel` as missing.
    pub fn from_sentinel(values: Array2<f64>, sentinel: f64) -> Self {
        let observed = values.mapv(|v| v != sentinel);
        let mut values = values;
        values.mapv_inplace(|v| if v == sentinel { 0.0 } else { v });
        Self { values, observed }
    }

    /// Stacks observation vectors as columns, preserving their order.
    pub fn stack_columns(vectors: &[PaceVector]) -> Result<Self> {
        let first = vectors.first().ok_or_else(|| {
            PreprocessError::invalid_configuration("cannot stack an empty list of vectors")
        })?;
        let n_dims = first.len();
        let n_obs = vectors.len();
        let mut values = Array2::<f64>::zeros((n_dims, n_obs));
        let mut observed = Array2::from_elem((n_dims, n_obs), false);

        for (j, vector) in vectors.iter().enumerate() {
            if vector.len() != n_dims {
                return Err(PreprocessError::DimensionMismatch {
                    expected: n_dims,
                    actual: vector.len(),
                });
            }
            for (i, cell) in vector.iter().enumerate() {
                if let Some(v) = cell {
                    values[[i, j]] = *v;
                    observed[[i, j]] = true;
                }
            }
        }
        Ok(Self { values, observed })
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    pub fn dim(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn observed(&self) -> &Array2<bool> {
        &self.observed
    }

    pub fn is_observed(&self, row: usize, col: usize) -> bool {
        self.observed[[row, col]]
    }

    /// Number of missing cells.
    pub fn missing_count(&self) -> usize {
        self.observed.iter().filter(|&&seen| !seen).count()
    }

    /// Observation `col` as a vector with `None` for missing cells.
    pub fn column(&self, col: usize) -> PaceVector {
        self.values
            .column(col)
            .iter()
            .zip(self.observed.column(col).iter())
            .map(|(&v, &seen)| if seen { Some(v) } else { None })
            .collect()
    }

    /// Keeps only the listed rows, in the order given.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            values: self.values.select(Axis(0), rows),
            observed: self.observed.select(Axis(0), rows),
        }
    }

    /// Fills one missing cell and marks it observed.
    pub(crate) fn fill(&mut self, row: usize, col: usize, value: f64) {
        self.values[[row, col]] = value;
        self.observed[[row, col]] = true;
    }

    /// Dense values; fails if any cell is still missing.
    pub fn into_dense(self) -> Result<Array2<f64>> {
        let count = self.missing_count();
        if count > 0 {
            return Err(PreprocessError::MissingValuesRemain { count });
        }
        Ok(self.values)
    }
}

/// Splits a variables × observations matrix into one vector per column.
pub fn split_columns(matrix: &Array2<f64>) -> Vec<ReducedVector> {
    matrix.columns().into_iter().map(|c| c.to_owned()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn sentinel_cells_become_missing() {
        let m = MaskedMatrix::from_sentinel(array![[1.0, 0.0], [0.0, 4.0]], MISSING_SENTINEL);
        assert!(m.is_observed(0, 0));
        assert!(!m.is_observed(0, 1));
        assert!(!m.is_observed(1, 0));
        assert_eq!(m.missing_count(), 2);
        assert_eq!(m.column(1), array![None, Some(4.0)]);
    }

    #[test]
    fn stacking_preserves_column_order() {
        let vectors = vec![
            array![Some(1.0), None, Some(3.0)],
            array![Some(4.0), Some(5.0), Some(6.0)],
        ];
        let m = MaskedMatrix::stack_columns(&vectors).unwrap();
        assert_eq!(m.dim(), (3, 2));
        assert_eq!(m.column(0), vectors[0]);
        assert_eq!(m.column(1), vectors[1]);
    }

    #[test]
    fn stacking_rejects_ragged_vectors() {
        let vectors = vec![array![Some(1.0), Some(2.0)], array![Some(1.0)]];
        match MaskedMatrix::stack_columns(&vectors) {
            Err(PreprocessError::DimensionMismatch { expected: 2, actual: 1 }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn densify_requires_complete_matrix() {
        let m = MaskedMatrix::from_sentinel(array![[1.0, 0.0]], MISSING_SENTINEL);
        assert!(matches!(m.into_dense(), Err(PreprocessError::MissingValuesRemain { count: 1 })));
    }

    #[test]
    fn time_slots_order_by_weekday_then_hour() {
        let a = TimeSlot::new(Weekday::Monday, 23).unwrap();
        let b = TimeSlot::new(Weekday::Tuesday, 0).unwrap();
        assert!(a < b);
        assert!(TimeSlot::new(Weekday::Friday, 24).is_err());
        assert_eq!(b.to_string(), "Tuesday 00h");
    }

    #[test]
    fn deserializing_a_time_slot_checks_the_hour() {
        let slot = TimeSlot::new(Weekday::Sunday, 23).unwrap();
        let text = serde_json::to_string(&slot).unwrap();
        let back: TimeSlot = serde_json::from_str(&text).unwrap();
        assert_eq!(back, slot);
        assert_eq!((back.weekday(), back.hour()), (Weekday::Sunday, 23));

        let bad = serde_json::from_str::<TimeSlot>(r#"{"weekday":"Monday","hour":30}"#);
        let message = bad.unwrap_err().to_string();
        assert!(message.contains("hour of day"), "unexpected error: {}", message);
    }
}
