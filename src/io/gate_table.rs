use crate::types::{GridError, GridResult, INVALID_DATA};
use std::collections::BTreeMap;

/// Per-gate geometry columns, one entry per gate
#[derive(Debug, Clone, Default)]
pub struct GateGeometry {
    /// Cartesian position relative to the sensor (meters)
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    /// Ground distance from the sensor (meters)
    pub ground_distance: Vec<f64>,
    /// Beam elevation (degrees)
    pub elevation_deg: Vec<f64>,
    /// Slant range of the gate center (meters)
    pub range_gate: Vec<f64>,
    /// Range resolution of the gate (meters)
    pub gate_size: Vec<f64>,
    /// Radius of influence (meters)
    pub radius_of_influence: Vec<f64>,
}

impl GateGeometry {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            x: Vec::with_capacity(n),
            y: Vec::with_capacity(n),
            z: Vec::with_capacity(n),
            ground_distance: Vec::with_capacity(n),
            elevation_deg: Vec::with_capacity(n),
            range_gate: Vec::with_capacity(n),
            gate_size: Vec::with_capacity(n),
            radius_of_influence: Vec::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Append a single gate
    pub fn push(&mut self, gate: InputGate) {
        self.x.push(gate.x);
        self.y.push(gate.y);
        self.z.push(gate.z);
        self.ground_distance.push(gate.ground_distance);
        self.elevation_deg.push(gate.elevation_deg);
        self.range_gate.push(gate.range_gate);
        self.gate_size.push(gate.gate_size);
        self.radius_of_influence.push(gate.radius_of_influence);
    }

    fn check_lengths(&self) -> GridResult<()> {
        let n = self.x.len();
        let columns = [
            ("y", self.y.len()),
            ("z", self.z.len()),
            ("ground_distance", self.ground_distance.len()),
            ("elevation_deg", self.elevation_deg.len()),
            ("range_gate", self.range_gate.len()),
            ("gate_size", self.gate_size.len()),
            ("radius_of_influence", self.radius_of_influence.len()),
        ];
        for (name, len) in columns {
            if len != n {
                return Err(GridError::InvalidInput(format!(
                    "Gate column '{}' has {} entries, expected {}",
                    name, len, n
                )));
            }
        }
        Ok(())
    }
}

/// Geometry of a single gate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputGate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub ground_distance: f64,
    pub elevation_deg: f64,
    pub range_gate: f64,
    pub gate_size: f64,
    pub radius_of_influence: f64,
}

/// Flat gate table handed over by the ingestion stage.
///
/// Every column, including each field column, holds exactly one entry per gate.
/// A field value is missing when it equals `missing_value` or is not finite.
#[derive(Debug, Clone)]
pub struct GateTable {
    geometry: GateGeometry,
    fields: BTreeMap<String, Vec<f64>>,
    missing_value: f64,
}

impl GateTable {
    /// Create a table using the default missing value
    pub fn new(geometry: GateGeometry) -> GridResult<Self> {
        Self::with_missing_value(geometry, INVALID_DATA)
    }

    pub fn with_missing_value(geometry: GateGeometry, missing_value: f64) -> GridResult<Self> {
        geometry.check_lengths()?;
        Ok(Self {
            geometry,
            fields: BTreeMap::new(),
            missing_value,
        })
    }

    /// Attach a field column
    pub fn add_field(&mut self, name: &str, values: Vec<f64>) -> GridResult<()> {
        if name.is_empty() {
            return Err(GridError::InvalidInput("Field name must not be empty".to_string()));
        }
        if values.len() != self.len() {
            return Err(GridError::InvalidInput(format!(
                "Field '{}' has {} values, expected {}",
                name,
                values.len(),
                self.len()
            )));
        }
        if self.fields.insert(name.to_string(), values).is_some() {
            log::warn!("Replacing existing gate field '{}'", name);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.geometry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometry.is_empty()
    }

    pub fn missing_value(&self) -> f64 {
        self.missing_value
    }

    pub fn geometry(&self) -> &GateGeometry {
        &self.geometry
    }

    /// Geometry of gate `m`
    pub fn gate(&self, m: usize) -> InputGate {
        let g = &self.geometry;
        InputGate {
            x: g.x[m],
            y: g.y[m],
            z: g.z[m],
            ground_distance: g.ground_distance[m],
            elevation_deg: g.elevation_deg[m],
            range_gate: g.range_gate[m],
            gate_size: g.gate_size[m],
            radius_of_influence: g.radius_of_influence[m],
        }
    }

    pub fn field(&self, name: &str) -> Option<&[f64]> {
        self.fields.get(name).map(|v| v.as_slice())
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    /// Value of `name` at gate `m`, `None` when missing
    pub fn value(&self, name: &str, m: usize) -> Option<f64> {
        self.fields
            .get(name)
            .and_then(|values| values.get(m).copied())
            .filter(|&v| self.is_usable(v))
    }

    #[inline]
    pub fn is_usable(&self, value: f64) -> bool {
        value.is_finite() && value != self.missing_value
    }
}
