//! Input tables and parameter files

pub mod gate_table;
pub mod params;

pub use gate_table::{GateTable, GateGeometry, InputGate};
pub use params::GridParams;
