//! Core gridding modules

pub mod geometry_table;
pub mod accumulator;
pub mod scatter;
pub mod normalize;
pub mod grid_engine;
pub mod polar_to_cartesian;

// Re-export main types
pub use geometry_table::{GeometryTable, CellGeometry};
pub use accumulator::{FieldAccumulator, AtomicFieldAccumulator};
pub use scatter::{ScatterEngine, ScatterParams, ScatterStats, FieldSelection, AccumulationStrategy, kernel_weight};
pub use normalize::{Normalizer, NormalizeParams};
pub use grid_engine::{GridEngine, GridEngineParams};
pub use polar_to_cartesian::{PolarToCartesian, PolarGates, BeamParams};
