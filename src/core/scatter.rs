use crate::core::accumulator::{AtomicFieldAccumulator, FieldAccumulator};
use crate::core::geometry_table::GeometryTable;
use crate::io::gate_table::{GateTable, InputGate};
use crate::types::{GridError, GridResult};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Instant;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Base of the angular decay term of the weighting kernel
pub const KERNEL_BASE: f64 = 0.005;

/// Which gate fields are spread onto the grid
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldSelection {
    /// Every requested field
    #[default]
    All,
    /// Only the listed field names
    Names(BTreeSet<String>),
    /// Only fields whose name starts with the prefix
    Prefix(String),
}

impl FieldSelection {
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldSelection::Names(names.into_iter().map(Into::into).collect())
    }

    pub fn accepts(&self, name: &str) -> bool {
        match self {
            FieldSelection::All => true,
            FieldSelection::Names(names) => names.contains(name),
            FieldSelection::Prefix(prefix) => name.starts_with(prefix.as_str()),
        }
    }
}

/// How concurrent gate contributions are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccumulationStrategy {
    /// Per-worker private grids merged by tree reduction
    #[default]
    LocalReduce,
    /// One shared grid updated with per-cell atomics
    Atomic,
}

impl FromStr for AccumulationStrategy {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "local_reduce" | "localreduce" => Ok(AccumulationStrategy::LocalReduce),
            "atomic" => Ok(AccumulationStrategy::Atomic),
            other => Err(GridError::Config(format!(
                "Unknown accumulation strategy: {}",
                other
            ))),
        }
    }
}

/// Gating thresholds and kernel constants for the scatter step
#[derive(Debug, Clone)]
pub struct ScatterParams {
    /// Accepted range mismatch as a multiple of the gate size
    pub gate_size_factor: f64,
    /// Gate elevation (degrees) separating low and high tilts
    pub elevation_split_deg: f64,
    /// Elevation tolerance below the split (degrees)
    pub low_elevation_tolerance_deg: f64,
    /// Elevation tolerance at or above the split (degrees)
    pub high_elevation_tolerance_deg: f64,
    /// Maximum horizontal angle between cell and gate (radians)
    pub max_angular_separation_rad: f64,
    /// Optional window on the cell elevation angle (degrees)
    pub min_cell_elevation_deg: Option<f64>,
    pub max_cell_elevation_deg: Option<f64>,
    /// Floor added to normalized range offset, weights and contributions
    pub epsilon: f64,
    pub strategy: AccumulationStrategy,
    /// Minimum number of gates handled by one parallel task
    pub chunk_size: usize,
    pub field_selection: FieldSelection,
}

impl Default for ScatterParams {
    fn default() -> Self {
        Self {
            gate_size_factor: 2.0,
            elevation_split_deg: 6.0,
            low_elevation_tolerance_deg: 1.0,
            high_elevation_tolerance_deg: 3.0,
            max_angular_separation_rad: 1.0,
            min_cell_elevation_deg: None,
            max_cell_elevation_deg: None,
            epsilon: 1e-8,
            strategy: AccumulationStrategy::LocalReduce,
            chunk_size: 1024,
            field_selection: FieldSelection::All,
        }
    }
}

impl ScatterParams {
    pub fn validate(&self) -> GridResult<()> {
        let positive = [
            ("gate_size_factor", self.gate_size_factor),
            ("low_elevation_tolerance_deg", self.low_elevation_tolerance_deg),
            ("high_elevation_tolerance_deg", self.high_elevation_tolerance_deg),
            ("max_angular_separation_rad", self.max_angular_separation_rad),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(GridError::Config(format!("{} must be positive, got {}", name, value)));
            }
        }
        // A zero floor lets an exact range match divide by zero in the kernel
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(GridError::Config(format!("epsilon must be positive, got {}", self.epsilon)));
        }
        if !self.elevation_split_deg.is_finite() {
            return Err(GridError::Config(format!(
                "elevation_split_deg must be finite, got {}",
                self.elevation_split_deg
            )));
        }
        for (name, bound) in [
            ("min_cell_elevation_deg", self.min_cell_elevation_deg),
            ("max_cell_elevation_deg", self.max_cell_elevation_deg),
        ] {
            if bound.map_or(false, |v| !v.is_finite()) {
                return Err(GridError::Config(format!("{} must be finite, got {:?}", name, bound)));
            }
        }
        if let (Some(min), Some(max)) = (self.min_cell_elevation_deg, self.max_cell_elevation_deg) {
            if min > max {
                return Err(GridError::Config(format!(
                    "Cell elevation window is empty: min {} > max {}",
                    min, max
                )));
            }
        }
        if self.chunk_size == 0 {
            return Err(GridError::Config("chunk_size must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Elevation tolerance for a gate at `elevation_deg`
    #[inline]
    pub fn elevation_tolerance(&self, elevation_deg: f64) -> f64 {
        if elevation_deg < self.elevation_split_deg {
            self.low_elevation_tolerance_deg
        } else {
            self.high_elevation_tolerance_deg
        }
    }
}

/// Weight of a gate/cell pair.
///
/// `e_u_deg` is the combined angular separation in degrees and `gate_diff` the
/// normalized range offset. Decays as `KERNEL_BASE^(e_u^3)` in angle and with the
/// inverse square of the range offset.
#[inline]
pub fn kernel_weight(e_u_deg: f64, gate_diff: f64, epsilon: f64) -> f64 {
    KERNEL_BASE.powf(e_u_deg.powi(3)) / (gate_diff * gate_diff) + epsilon
}

/// Result of scattering a single gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// No usable value for any eligible field
    NoData,
    /// Search box misses the grid or the gate geometry is unusable
    OutsideGrid,
    /// Gate reached `cells` cells, producing `updates` field updates
    Scattered { cells: usize, updates: usize },
}

/// Per-run scatter summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScatterStats {
    pub gates_total: usize,
    pub gates_no_data: usize,
    pub gates_outside_grid: usize,
    /// Gates whose box overlapped the grid but passed no cell test
    pub gates_unmatched: usize,
    pub gates_scattered: usize,
    pub cell_hits: usize,
    pub field_updates: usize,
}

impl ScatterStats {
    pub fn record(&mut self, outcome: GateOutcome) {
        self.gates_total += 1;
        match outcome {
            GateOutcome::NoData => self.gates_no_data += 1,
            GateOutcome::OutsideGrid => self.gates_outside_grid += 1,
            GateOutcome::Scattered { cells: 0, .. } => self.gates_unmatched += 1,
            GateOutcome::Scattered { cells, updates } => {
                self.gates_scattered += 1;
                self.cell_hits += cells;
                self.field_updates += updates;
            }
        }
    }

    pub fn merge(&mut self, other: &ScatterStats) {
        self.gates_total += other.gates_total;
        self.gates_no_data += other.gates_no_data;
        self.gates_outside_grid += other.gates_outside_grid;
        self.gates_unmatched += other.gates_unmatched;
        self.gates_scattered += other.gates_scattered;
        self.cell_hits += other.cell_hits;
        self.field_updates += other.field_updates;
    }
}

/// Private accumulation state of one worker
struct LocalState {
    accumulators: Vec<FieldAccumulator>,
    stats: ScatterStats,
    values: Vec<(usize, f64)>,
}

impl LocalState {
    fn new(n_fields: usize, dims: (usize, usize, usize)) -> Self {
        Self {
            accumulators: (0..n_fields).map(|_| FieldAccumulator::zeros(dims)).collect(),
            stats: ScatterStats::default(),
            values: Vec::with_capacity(n_fields),
        }
    }

    fn merged(mut self, other: LocalState) -> Self {
        for (acc, rhs) in self.accumulators.iter_mut().zip(other.accumulators.iter()) {
            acc.merge(rhs);
        }
        self.stats.merge(&other.stats);
        self
    }
}

/// Inclusive cell range along one axis, `None` if it misses the grid
#[inline]
fn axis_window(pos: f64, min: f64, cell: f64, n: usize, roi: f64) -> Option<(usize, usize)> {
    let center = ((pos - min) / cell).floor();
    let half = (roi / cell).floor() + 1.0;
    let start = (center - half).max(0.0);
    let end = (center + half).min(n as f64 - 1.0);
    if start <= end {
        Some((start as usize, end as usize))
    } else {
        None
    }
}

fn gate_is_usable(gate: &InputGate) -> bool {
    [
        gate.x,
        gate.y,
        gate.z,
        gate.ground_distance,
        gate.elevation_deg,
        gate.range_gate,
    ]
    .iter()
    .all(|v| v.is_finite())
        && gate.gate_size.is_finite()
        && gate.gate_size > 0.0
        && gate.radius_of_influence.is_finite()
        && gate.radius_of_influence >= 0.0
}

/// Spreads gate values over the cells of a geometry table
pub struct ScatterEngine<'a> {
    table: &'a GeometryTable,
    params: &'a ScatterParams,
}

impl<'a> ScatterEngine<'a> {
    pub fn new(table: &'a GeometryTable, params: &'a ScatterParams) -> Self {
        Self { table, params }
    }

    /// Visit every cell accepted for `gate`, passing the cell index and kernel weight.
    ///
    /// Returns `None` when the search box misses the grid, otherwise the number of
    /// accepted cells.
    pub fn visit_gate<F>(&self, gate: &InputGate, mut visit: F) -> Option<usize>
    where
        F: FnMut([usize; 3], f64),
    {
        if !gate_is_usable(gate) {
            return None;
        }

        let geometry = self.table.geometry();
        let roi = gate.radius_of_influence;
        let (i0, i1) = axis_window(gate.x, geometry.min_x, geometry.dx, geometry.nx, roi)?;
        let (j0, j1) = axis_window(gate.y, geometry.min_y, geometry.dy, geometry.ny, roi)?;
        let (k0, k1) = axis_window(gate.z, geometry.min_z, geometry.dz, geometry.nz, roi)?;

        let p = self.params;
        let max_rg_diff = p.gate_size_factor * gate.gate_size;
        let max_el_diff = p.elevation_tolerance(gate.elevation_deg);
        let mut accepted = 0;

        for i in i0..=i1 {
            for j in j0..=j1 {
                for k in k0..=k1 {
                    let cell = self.table.cell(i, j, k);

                    if p.min_cell_elevation_deg.map_or(false, |min| cell.elevation_deg < min)
                        || p.max_cell_elevation_deg.map_or(false, |max| cell.elevation_deg > max)
                    {
                        continue;
                    }

                    let rg_diff = (cell.range_gate - gate.range_gate).abs();
                    if rg_diff > max_rg_diff {
                        continue;
                    }

                    let el_diff = (cell.elevation_deg - gate.elevation_deg).abs();
                    if el_diff > max_el_diff {
                        continue;
                    }

                    // Azimuth is undefined on the sensor column
                    let norm = cell.ground_distance * gate.ground_distance;
                    let dot = if norm > 0.0 {
                        ((cell.x * gate.x + cell.y * gate.y) / norm).clamp(-1.0, 1.0)
                    } else {
                        1.0
                    };
                    if dot.acos() > p.max_angular_separation_rad {
                        continue;
                    }

                    let e_u_deg = (el_diff.to_radians().cos() * dot).acos().to_degrees();
                    let gate_diff = rg_diff / max_rg_diff + p.epsilon;
                    let w = kernel_weight(e_u_deg, gate_diff, p.epsilon);

                    visit([i, j, k], w);
                    accepted += 1;
                }
            }
        }

        Some(accepted)
    }

    fn scatter_gate<F>(
        &self,
        gates: &GateTable,
        columns: &[Option<&[f64]>],
        m: usize,
        values: &mut Vec<(usize, f64)>,
        mut add: F,
    ) -> GateOutcome
    where
        F: FnMut(usize, [usize; 3], f64, f64),
    {
        values.clear();
        for (slot, column) in columns.iter().enumerate() {
            if let Some(column) = column {
                let v = column[m];
                if gates.is_usable(v) {
                    values.push((slot, v));
                }
            }
        }
        if values.is_empty() {
            return GateOutcome::NoData;
        }

        let epsilon = self.params.epsilon;
        let mut updates = 0;
        let cells = self.visit_gate(&gates.gate(m), |cell, w| {
            for &(slot, v) in values.iter() {
                add(slot, cell, v * w + epsilon, w);
            }
            updates += values.len();
        });

        match cells {
            Some(cells) => GateOutcome::Scattered { cells, updates },
            None => GateOutcome::OutsideGrid,
        }
    }

    /// Scatter every gate into fresh accumulators, one per entry of `field_names`.
    ///
    /// Returns once all contributions have landed.
    pub fn scatter(&self, gates: &GateTable, field_names: &[String]) -> (Vec<FieldAccumulator>, ScatterStats) {
        let start = Instant::now();
        let dims = self.table.geometry().dims();
        let columns: Vec<Option<&[f64]>> = field_names
            .iter()
            .map(|name| {
                if !self.params.field_selection.accepts(name) {
                    log::debug!("Field '{}' is not selected for scattering", name);
                    return None;
                }
                let column = gates.field(name);
                if column.is_none() {
                    log::warn!("Requested field '{}' is not present in the gate table", name);
                }
                column
            })
            .collect();

        let (accumulators, stats) = match self.params.strategy {
            AccumulationStrategy::LocalReduce => self.scatter_local(gates, &columns, dims),
            AccumulationStrategy::Atomic => self.scatter_atomic(gates, &columns, dims),
        };

        log::debug!(
            "Scattered {} gates ({} hit, {} outside, {} without data) in {:.3}s",
            stats.gates_total,
            stats.gates_scattered,
            stats.gates_outside_grid,
            stats.gates_no_data,
            start.elapsed().as_secs_f64()
        );

        (accumulators, stats)
    }

    fn scatter_local(
        &self,
        gates: &GateTable,
        columns: &[Option<&[f64]>],
        dims: (usize, usize, usize),
    ) -> (Vec<FieldAccumulator>, ScatterStats) {
        let n_fields = columns.len();
        let step = |mut state: LocalState, m: usize| {
            let LocalState { accumulators, stats, values } = &mut state;
            let outcome = self.scatter_gate(gates, columns, m, values, |slot, cell, c, w| {
                accumulators[slot].add(cell, c, w);
            });
            stats.record(outcome);
            state
        };

        #[cfg(feature = "parallel")]
        let state = (0..gates.len())
            .into_par_iter()
            .with_min_len(self.params.chunk_size)
            .fold(|| LocalState::new(n_fields, dims), step)
            .reduce_with(LocalState::merged);
        #[cfg(not(feature = "parallel"))]
        let state = Some((0..gates.len()).fold(LocalState::new(n_fields, dims), step));

        let state = state.unwrap_or_else(|| LocalState::new(n_fields, dims));
        (state.accumulators, state.stats)
    }

    fn scatter_atomic(
        &self,
        gates: &GateTable,
        columns: &[Option<&[f64]>],
        dims: (usize, usize, usize),
    ) -> (Vec<FieldAccumulator>, ScatterStats) {
        let shared: Vec<AtomicFieldAccumulator> =
            columns.iter().map(|_| AtomicFieldAccumulator::zeros(dims)).collect();
        let step = |mut stats: ScatterStats, m: usize| {
            let mut values = Vec::with_capacity(columns.len());
            let outcome = self.scatter_gate(gates, columns, m, &mut values, |slot, cell, c, w| {
                shared[slot].add(cell, c, w);
            });
            stats.record(outcome);
            stats
        };

        #[cfg(feature = "parallel")]
        let stats = (0..gates.len())
            .into_par_iter()
            .with_min_len(self.params.chunk_size)
            .fold(ScatterStats::default, step)
            .reduce(ScatterStats::default, |mut a, b| {
                a.merge(&b);
                a
            });
        #[cfg(not(feature = "parallel"))]
        let stats = (0..gates.len()).fold(ScatterStats::default(), step);

        (shared.iter().map(AtomicFieldAccumulator::snapshot).collect(), stats)
    }
}
