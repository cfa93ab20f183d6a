use crate::types::{GridGeometry, GridResult, EFFECTIVE_EARTH_RADIUS_M};
use ndarray::{Array3, Zip};
use std::time::Instant;

/// Precomputed radar-relative geometry of one grid cell
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CellGeometry {
    /// Cell center (meters, sensor at the horizontal origin)
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Ground distance to the sensor (meters)
    pub ground_distance: f64,
    /// Elevation angle seen from the sensor (degrees)
    pub elevation_deg: f64,
    /// Equivalent slant range along the beam (meters)
    pub range_gate: f64,
}

impl CellGeometry {
    /// Compute the beam geometry of a point at ground distance `s` and height `z`
    /// for a sensor mounted `sensor_height` above the grid's height datum.
    pub fn at(x: f64, y: f64, z: f64, sensor_height: f64) -> Self {
        let ir = EFFECTIVE_EARTH_RADIUS_M;
        let s = (x * x + y * y).sqrt();
        let theta = s / ir;
        let radius = ir + z - sensor_height;

        let el = (theta.cos() - ir / radius).atan2(theta.sin());
        let rg = theta.sin() * radius / el.cos();

        Self {
            x,
            y,
            z,
            ground_distance: s,
            elevation_deg: el.to_degrees(),
            range_gate: rg,
        }
    }
}

/// Read-only per-cell lookup table for a grid geometry and sensor height
#[derive(Debug, Clone)]
pub struct GeometryTable {
    geometry: GridGeometry,
    sensor_height: f64,
    cells: Array3<CellGeometry>,
}

impl GeometryTable {
    /// Build the table for every cell of `geometry`
    pub fn build(geometry: &GridGeometry, sensor_height: f64) -> GridResult<Self> {
        geometry.validate()?;
        if !sensor_height.is_finite() {
            return Err(crate::types::GridError::InvalidGeometry(format!(
                "Sensor height must be finite, got {}",
                sensor_height
            )));
        }

        let start = Instant::now();
        let mut cells = Array3::<CellGeometry>::default(geometry.dims());
        let fill = |(i, j, k): (usize, usize, usize), cell: &mut CellGeometry| {
            let (x, y, z) = geometry.cell_center(i, j, k);
            *cell = CellGeometry::at(x, y, z, sensor_height);
        };

        #[cfg(feature = "parallel")]
        Zip::indexed(&mut cells).par_for_each(fill);
        #[cfg(not(feature = "parallel"))]
        Zip::indexed(&mut cells).for_each(fill);

        log::debug!(
            "Geometry table {}x{}x{} built in {:.3}s",
            geometry.nx,
            geometry.ny,
            geometry.nz,
            start.elapsed().as_secs_f64()
        );

        Ok(Self {
            geometry: *geometry,
            sensor_height,
            cells,
        })
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn sensor_height(&self) -> f64 {
        self.sensor_height
    }

    #[inline]
    pub fn cell(&self, i: usize, j: usize, k: usize) -> &CellGeometry {
        &self.cells[[i, j, k]]
    }

    pub fn cells(&self) -> &Array3<CellGeometry> {
        &self.cells
    }

    /// True if this table was built for the same geometry and sensor height
    pub fn matches(&self, geometry: &GridGeometry, sensor_height: f64) -> bool {
        self.geometry == *geometry && self.sensor_height == sensor_height
    }
}
