use crate::types::{CountGrid, FieldGrid};
use ndarray::{Array3, Zip};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Weighted-sum, weight and count grids for one output field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldAccumulator {
    pub sum: FieldGrid,
    pub weight: FieldGrid,
    pub count: CountGrid,
}

impl FieldAccumulator {
    pub fn zeros(dims: (usize, usize, usize)) -> Self {
        Self {
            sum: Array3::zeros(dims),
            weight: Array3::zeros(dims),
            count: Array3::zeros(dims),
        }
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        self.sum.dim()
    }

    #[inline]
    pub fn add(&mut self, cell: [usize; 3], contribution: f64, weight: f64) {
        self.sum[cell] += contribution;
        self.weight[cell] += weight;
        self.count[cell] += 1;
    }

    /// Fold another accumulator of the same shape into this one
    pub fn merge(&mut self, other: &FieldAccumulator) {
        Zip::from(&mut self.sum).and(&other.sum).for_each(|a, &b| *a += b);
        Zip::from(&mut self.weight).and(&other.weight).for_each(|a, &b| *a += b);
        Zip::from(&mut self.count).and(&other.count).for_each(|a, &b| *a += b);
    }

    /// Number of cells with at least one contribution
    pub fn touched_cells(&self) -> usize {
        self.count.iter().filter(|&&c| c > 0).count()
    }
}

/// Lock-free accumulator shared by all scatter workers.
///
/// Floats are stored as their bit patterns and updated with a CAS loop.
#[derive(Debug)]
pub struct AtomicFieldAccumulator {
    dims: (usize, usize, usize),
    sum: Vec<AtomicU64>,
    weight: Vec<AtomicU64>,
    count: Vec<AtomicU32>,
}

impl AtomicFieldAccumulator {
    pub fn zeros(dims: (usize, usize, usize)) -> Self {
        let n = dims.0 * dims.1 * dims.2;
        let zero = 0.0f64.to_bits();
        Self {
            dims,
            sum: (0..n).map(|_| AtomicU64::new(zero)).collect(),
            weight: (0..n).map(|_| AtomicU64::new(zero)).collect(),
            count: (0..n).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    #[inline]
    fn offset(&self, [i, j, k]: [usize; 3]) -> usize {
        (i * self.dims.1 + j) * self.dims.2 + k
    }

    #[inline]
    pub fn add(&self, cell: [usize; 3], contribution: f64, weight: f64) {
        let idx = self.offset(cell);
        atomic_add_f64(&self.sum[idx], contribution);
        atomic_add_f64(&self.weight[idx], weight);
        self.count[idx].fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current totals into a plain accumulator.
    ///
    /// Only meaningful once every writer has finished.
    pub fn snapshot(&self) -> FieldAccumulator {
        let load = |values: &[AtomicU64], cell: [usize; 3]| {
            f64::from_bits(values[self.offset(cell)].load(Ordering::Acquire))
        };

        FieldAccumulator {
            sum: Array3::from_shape_fn(self.dims, |(i, j, k)| load(&self.sum, [i, j, k])),
            weight: Array3::from_shape_fn(self.dims, |(i, j, k)| load(&self.weight, [i, j, k])),
            count: Array3::from_shape_fn(self.dims, |(i, j, k)| {
                self.count[self.offset([i, j, k])].load(Ordering::Acquire)
            }),
        }
    }
}

#[inline]
fn atomic_add_f64(target: &AtomicU64, addend: f64) {
    let mut current = target.load(Ordering::Relaxed);
    loop {
        let next = (f64::from_bits(current) + addend).to_bits();
        match target.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => break,
            Err(actual) => current = actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rayon::prelude::*;

    #[test]
    fn test_merge_adds_all_grids() {
        let mut a = FieldAccumulator::zeros((2, 2, 1));
        let mut b = FieldAccumulator::zeros((2, 2, 1));
        a.add([0, 0, 0], 10.0, 1.0);
        b.add([0, 0, 0], 5.0, 0.5);
        b.add([1, 1, 0], 2.0, 0.25);

        a.merge(&b);
        assert_eq!(a.sum[[0, 0, 0]], 15.0);
        assert_eq!(a.weight[[0, 0, 0]], 1.5);
        assert_eq!(a.count[[0, 0, 0]], 2);
        assert_eq!(a.count[[1, 1, 0]], 1);
        assert_eq!(a.touched_cells(), 2);
    }

    #[test]
    fn test_atomic_accumulation_loses_nothing() {
        let acc = AtomicFieldAccumulator::zeros((3, 2, 2));
        (0..10_000usize).into_par_iter().for_each(|m| {
            acc.add([m % 3, 1, m % 2], 0.5, 0.25);
        });

        let snapshot = acc.snapshot();
        assert_eq!(snapshot.count.iter().map(|&c| c as usize).sum::<usize>(), 10_000);
        assert_eq!(snapshot.count[[0, 0, 0]], 0);
        assert_relative_eq!(snapshot.sum.sum(), 5000.0, max_relative = 1e-12);
        assert_relative_eq!(snapshot.weight.sum(), 2500.0, max_relative = 1e-12);
    }

    #[test]
    fn test_atomic_offset_matches_array_layout() {
        let acc = AtomicFieldAccumulator::zeros((2, 3, 4));
        acc.add([1, 2, 3], 7.0, 1.0);
        acc.add([0, 1, 2], 3.0, 1.0);

        let snapshot = acc.snapshot();
        assert_eq!(snapshot.sum[[1, 2, 3]], 7.0);
        assert_eq!(snapshot.sum[[0, 1, 2]], 3.0);
        assert_eq!(snapshot.dims(), (2, 3, 4));
    }
}
