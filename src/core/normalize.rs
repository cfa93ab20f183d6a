use crate::core::accumulator::FieldAccumulator;
use crate::types::{FieldGrid, GridError, GridResult, INVALID_DATA};
use ndarray::{Array3, Zip};

/// Support thresholds for turning accumulators into field values
#[derive(Debug, Clone)]
pub struct NormalizeParams {
    /// Minimum number of contributing gates for a valid cell
    pub min_contributors: u32,
    /// Value written to cells without enough support
    pub invalid_value: f64,
}

impl Default for NormalizeParams {
    fn default() -> Self {
        Self {
            min_contributors: 3,
            invalid_value: INVALID_DATA,
        }
    }
}

impl NormalizeParams {
    pub fn validate(&self) -> GridResult<()> {
        if self.min_contributors == 0 {
            return Err(GridError::Config(
                "min_contributors must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Computes weighted means from accumulated sums
pub struct Normalizer {
    params: NormalizeParams,
}

impl Normalizer {
    pub fn new(params: NormalizeParams) -> Self {
        Self { params }
    }

    /// Weighted mean per cell, or the invalid value where support is insufficient
    pub fn normalize(&self, acc: &FieldAccumulator) -> FieldGrid {
        let mut field = Array3::from_elem(acc.dims(), self.params.invalid_value);
        let min_contributors = self.params.min_contributors;
        let invalid = self.params.invalid_value;

        let cell = |out: &mut f64, &sum: &f64, &weight: &f64, &count: &u32| {
            *out = if count < min_contributors || weight == 0.0 {
                invalid
            } else {
                sum / weight
            };
        };

        let zip = Zip::from(&mut field).and(&acc.sum).and(&acc.weight).and(&acc.count);
        #[cfg(feature = "parallel")]
        zip.par_for_each(cell);
        #[cfg(not(feature = "parallel"))]
        zip.for_each(cell);

        field
    }

    /// Count of cells holding a valid value
    pub fn valid_cells(&self, field: &FieldGrid) -> usize {
        field.iter().filter(|&&v| v != self.params.invalid_value).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_rules() {
        let mut acc = FieldAccumulator::zeros((3, 1, 1));
        // Enough contributors
        for _ in 0..3 {
            acc.add([0, 0, 0], 20.0, 2.0);
        }
        // Too few contributors
        acc.add([1, 0, 0], 20.0, 2.0);
        acc.add([1, 0, 0], 20.0, 2.0);
        // Zero weight
        acc.count[[2, 0, 0]] = 5;

        let normalizer = Normalizer::new(NormalizeParams::default());
        let field = normalizer.normalize(&acc);

        assert_eq!(field[[0, 0, 0]], 10.0);
        assert_eq!(field[[1, 0, 0]], INVALID_DATA);
        assert_eq!(field[[2, 0, 0]], INVALID_DATA);
        assert_eq!(normalizer.valid_cells(&field), 1);
    }

    #[test]
    fn test_custom_threshold() {
        let mut acc = FieldAccumulator::zeros((1, 1, 1));
        acc.add([0, 0, 0], 6.0, 3.0);

        let normalizer = Normalizer::new(NormalizeParams {
            min_contributors: 1,
            invalid_value: f64::NAN,
        });
        assert_eq!(normalizer.normalize(&acc)[[0, 0, 0]], 2.0);
        assert!(NormalizeParams { min_contributors: 0, ..Default::default() }.validate().is_err());
    }
}
