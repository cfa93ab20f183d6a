use ndarray::Array3;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_008.0;

/// Effective Earth radius for beam propagation in a standard atmosphere (4/3 model)
pub const EFFECTIVE_EARTH_RADIUS_M: f64 = EARTH_RADIUS_M * 4.0 / 3.0;

/// No-data value written to cells without enough support
pub const INVALID_DATA: f64 = -9999.0;

/// Dense 3-D field grid indexed as [i, j, k] (x, y, z)
pub type FieldGrid = Array3<f64>;

/// Per-cell contributor counts
pub type CountGrid = Array3<u32>;

/// Regular Cartesian grid description, all distances in meters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridGeometry {
    pub min_x: f64,
    pub min_y: f64,
    pub min_z: f64,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl GridGeometry {
    /// Create a validated grid geometry
    pub fn new(
        origin: (f64, f64, f64),
        cell_size: (f64, f64, f64),
        dims: (usize, usize, usize),
    ) -> GridResult<Self> {
        let geometry = Self {
            min_x: origin.0,
            min_y: origin.1,
            min_z: origin.2,
            dx: cell_size.0,
            dy: cell_size.1,
            dz: cell_size.2,
            nx: dims.0,
            ny: dims.1,
            nz: dims.2,
        };
        geometry.validate()?;
        Ok(geometry)
    }

    /// Create a geometry from origin and cell size given in kilometers
    pub fn from_km(
        origin_km: (f64, f64, f64),
        cell_size_km: (f64, f64, f64),
        dims: (usize, usize, usize),
    ) -> GridResult<Self> {
        Self::new(
            (origin_km.0 * 1000.0, origin_km.1 * 1000.0, origin_km.2 * 1000.0),
            (cell_size_km.0 * 1000.0, cell_size_km.1 * 1000.0, cell_size_km.2 * 1000.0),
            dims,
        )
    }

    /// Check dimensions and cell sizes
    pub fn validate(&self) -> GridResult<()> {
        if self.nx == 0 || self.ny == 0 || self.nz == 0 {
            return Err(GridError::InvalidGeometry(format!(
                "Grid dimensions must be at least 1, got {}x{}x{}",
                self.nx, self.ny, self.nz
            )));
        }

        for (axis, size) in [("x", self.dx), ("y", self.dy), ("z", self.dz)] {
            if !(size.is_finite() && size > 0.0) {
                return Err(GridError::InvalidGeometry(format!(
                    "Cell size along {} must be positive, got {}",
                    axis, size
                )));
            }
        }

        if !(self.min_x.is_finite() && self.min_y.is_finite() && self.min_z.is_finite()) {
            return Err(GridError::InvalidGeometry(format!(
                "Grid origin must be finite, got ({}, {}, {})",
                self.min_x, self.min_y, self.min_z
            )));
        }

        Ok(())
    }

    /// Grid shape as (nx, ny, nz)
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }

    pub fn cell_count(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Cell center position for index (i, j, k)
    pub fn cell_center(&self, i: usize, j: usize, k: usize) -> (f64, f64, f64) {
        (
            self.min_x + i as f64 * self.dx,
            self.min_y + j as f64 * self.dy,
            self.min_z + k as f64 * self.dz,
        )
    }
}

/// Error types for gridding
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid grid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for gridding operations
pub type GridResult<T> = Result<T, GridError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_validation() {
        assert!(GridGeometry::new((0.0, 0.0, 0.0), (1000.0, 1000.0, 500.0), (2, 2, 1)).is_ok());
        assert!(GridGeometry::new((0.0, 0.0, 0.0), (1000.0, 1000.0, 500.0), (0, 2, 1)).is_err());
        assert!(GridGeometry::new((0.0, 0.0, 0.0), (1000.0, -1.0, 500.0), (2, 2, 1)).is_err());
        assert!(GridGeometry::new((f64::NAN, 0.0, 0.0), (1.0, 1.0, 1.0), (2, 2, 1)).is_err());
    }

    #[test]
    fn test_geometry_from_km() {
        let geometry = GridGeometry::from_km((-10.0, -20.0, 0.5), (1.0, 2.0, 0.25), (3, 4, 5)).unwrap();
        assert_eq!(geometry.min_x, -10_000.0);
        assert_eq!(geometry.min_y, -20_000.0);
        assert_eq!(geometry.dz, 250.0);
        assert_eq!(geometry.cell_count(), 60);
        assert_eq!(geometry.cell_center(1, 1, 2), (-9000.0, -18_000.0, 1000.0));
    }
}
