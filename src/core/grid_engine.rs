use crate::core::accumulator::FieldAccumulator;
use crate::core::geometry_table::GeometryTable;
use crate::core::normalize::{NormalizeParams, Normalizer};
use crate::core::scatter::{ScatterEngine, ScatterParams, ScatterStats};
use crate::io::gate_table::GateTable;
use crate::types::{FieldGrid, GridError, GridGeometry, GridResult};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Parameters for a full scatter + normalize cycle
#[derive(Debug, Clone, Default)]
pub struct GridEngineParams {
    pub scatter: ScatterParams,
    pub normalize: NormalizeParams,
}

impl GridEngineParams {
    pub fn validate(&self) -> GridResult<()> {
        self.scatter.validate()?;
        self.normalize.validate()
    }
}

/// Grids polar gate volumes onto one Cartesian geometry.
///
/// The geometry table is built once per engine (or shared between engines) and
/// each call to [`GridEngine::run_scatter_and_normalize`] replaces the accumulators
/// and final grids of every requested field.
pub struct GridEngine {
    table: Arc<GeometryTable>,
    params: GridEngineParams,
    field_names: Vec<String>,
    accumulators: Vec<FieldAccumulator>,
    final_grids: Vec<FieldGrid>,
    last_stats: Option<ScatterStats>,
}

impl GridEngine {
    /// Create an engine with default parameters
    pub fn new<I, S>(geometry: GridGeometry, sensor_height_agl: f64, field_names: I) -> GridResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_params(geometry, sensor_height_agl, field_names, GridEngineParams::default())
    }

    pub fn with_params<I, S>(
        geometry: GridGeometry,
        sensor_height_agl: f64,
        field_names: I,
        params: GridEngineParams,
    ) -> GridResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        log::info!(
            "Building geometry table for {}x{}x{} grid, sensor height {:.1}m",
            geometry.nx,
            geometry.ny,
            geometry.nz,
            sensor_height_agl
        );
        let table = GeometryTable::build(&geometry, sensor_height_agl)?;
        Self::with_table(Arc::new(table), field_names, params)
    }

    /// Create an engine on an already built, possibly shared, geometry table
    pub fn with_table<I, S>(table: Arc<GeometryTable>, field_names: I, params: GridEngineParams) -> GridResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        params.validate()?;

        let field_names: Vec<String> = field_names.into_iter().map(Into::into).collect();
        let mut seen = HashSet::new();
        for name in &field_names {
            if name.is_empty() {
                return Err(GridError::InvalidInput("Field name must not be empty".to_string()));
            }
            if !seen.insert(name.as_str()) {
                return Err(GridError::InvalidInput(format!("Duplicate field name '{}'", name)));
            }
        }

        let dims = table.geometry().dims();
        let accumulators: Vec<FieldAccumulator> =
            field_names.iter().map(|_| FieldAccumulator::zeros(dims)).collect();
        let normalizer = Normalizer::new(params.normalize.clone());
        let final_grids = accumulators.iter().map(|acc| normalizer.normalize(acc)).collect();

        log::debug!("Allocated accumulators for fields {:?}", field_names);

        Ok(Self {
            table,
            params,
            field_names,
            accumulators,
            final_grids,
            last_stats: None,
        })
    }

    /// Scatter one volume of gates and normalize every requested field
    pub fn run_scatter_and_normalize(&mut self, gates: &GateTable) -> ScatterStats {
        log::info!(
            "Gridding {} gates onto {} field(s)",
            gates.len(),
            self.field_names.len()
        );

        let start = Instant::now();
        let engine = ScatterEngine::new(&self.table, &self.params.scatter);
        let (accumulators, stats) = engine.scatter(gates, &self.field_names);
        self.accumulators = accumulators;
        log::debug!("Scatter: {:.3} sec", start.elapsed().as_secs_f64());

        let start = Instant::now();
        let normalizer = Normalizer::new(self.params.normalize.clone());
        self.final_grids = self
            .accumulators
            .iter()
            .map(|acc| normalizer.normalize(acc))
            .collect();
        log::debug!("Normalize: {:.3} sec", start.elapsed().as_secs_f64());

        for (name, grid) in self.field_names.iter().zip(&self.final_grids) {
            log::info!(
                "Field {}: {} of {} cells valid",
                name,
                normalizer.valid_cells(grid),
                grid.len()
            );
        }

        self.last_stats = Some(stats);
        stats
    }

    fn slot(&self, name: &str) -> Option<usize> {
        self.field_names.iter().position(|n| n == name)
    }

    /// Final grid of `name`; all cells are invalid until the first run
    pub fn final_grid(&self, name: &str) -> Option<&FieldGrid> {
        self.slot(name).map(|slot| &self.final_grids[slot])
    }

    /// Iterate over (field name, final grid) pairs in request order
    pub fn final_grids(&self) -> impl Iterator<Item = (&str, &FieldGrid)> {
        self.field_names.iter().map(|n| n.as_str()).zip(self.final_grids.iter())
    }

    pub fn accumulator(&self, name: &str) -> Option<&FieldAccumulator> {
        self.slot(name).map(|slot| &self.accumulators[slot])
    }

    /// Grid shape as (nx, ny, nz)
    pub fn dimensions(&self) -> (usize, usize, usize) {
        self.table.geometry().dims()
    }

    pub fn geometry(&self) -> &GridGeometry {
        self.table.geometry()
    }

    pub fn geometry_table(&self) -> &Arc<GeometryTable> {
        &self.table
    }

    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    pub fn params(&self) -> &GridEngineParams {
        &self.params
    }

    pub fn last_stats(&self) -> Option<&ScatterStats> {
        self.last_stats.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::INVALID_DATA;

    fn geometry() -> GridGeometry {
        GridGeometry::new((0.0, 0.0, 0.0), (1000.0, 1000.0, 500.0), (2, 2, 1)).unwrap()
    }

    #[test]
    fn test_construction_errors() {
        let mut degenerate = geometry();
        degenerate.nz = 0;
        assert!(matches!(
            GridEngine::new(degenerate, 0.0, ["REF"]),
            Err(GridError::InvalidGeometry(_))
        ));
        assert!(matches!(
            GridEngine::new(geometry(), 0.0, ["REF", "REF"]),
            Err(GridError::InvalidInput(_))
        ));
        assert!(GridEngine::new(geometry(), 0.0, [""]).is_err());

        let mut params = GridEngineParams::default();
        params.scatter.epsilon = 0.0;
        assert!(matches!(
            GridEngine::with_params(geometry(), 0.0, ["REF"], params),
            Err(GridError::Config(_))
        ));
    }

    #[test]
    fn test_accessors_before_first_run() {
        let engine = GridEngine::new(geometry(), 10.0, ["REF", "VEL"]).unwrap();
        assert_eq!(engine.dimensions(), (2, 2, 1));
        assert_eq!(engine.field_names(), &["REF".to_string(), "VEL".to_string()]);
        assert!(engine.final_grid("ZDR").is_none());
        assert!(engine.last_stats().is_none());

        let grid = engine.final_grid("VEL").unwrap();
        assert!(grid.iter().all(|&v| v == INVALID_DATA));
        assert_eq!(engine.accumulator("REF").unwrap().touched_cells(), 0);
    }

    #[test]
    fn test_shared_table() {
        let engine = GridEngine::new(geometry(), 0.0, ["REF"]).unwrap();
        let table = Arc::clone(engine.geometry_table());
        let other = GridEngine::with_table(table, ["VEL"], GridEngineParams::default()).unwrap();
        assert!(Arc::ptr_eq(engine.geometry_table(), other.geometry_table()));
        assert_eq!(other.geometry(), engine.geometry());
    }
}
