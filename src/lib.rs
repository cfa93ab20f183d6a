//! polargrid: polar radar volumes onto regular 3-D Cartesian grids
//!
//! Gates carrying a Cartesian position, beam geometry and radius of influence are
//! scattered onto a precomputed geometry table with an anisotropic weighting kernel,
//! then normalized into weighted-mean field grids. Cells with too little support
//! hold [`INVALID_DATA`].

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    GridGeometry, GridError, GridResult, FieldGrid, CountGrid,
    INVALID_DATA, EFFECTIVE_EARTH_RADIUS_M, EARTH_RADIUS_M
};

pub use io::{GateTable, GateGeometry, InputGate, GridParams};
pub use crate::core::{
    GridEngine, GridEngineParams, GeometryTable, FieldAccumulator, ScatterParams,
    ScatterStats, NormalizeParams, FieldSelection, AccumulationStrategy,
    PolarToCartesian, PolarGates, BeamParams
};
