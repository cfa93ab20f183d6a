use crate::io::gate_table::{GateGeometry, GateTable, InputGate};
use crate::types::{GridError, GridResult, EFFECTIVE_EARTH_RADIUS_M, INVALID_DATA};
use std::collections::BTreeMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Beam parameters used to size each gate's radius of influence
#[derive(Debug, Clone)]
pub struct BeamParams {
    /// Sensor height above the grid datum (meters)
    pub sensor_height: f64,
    /// Half-power beam width (degrees)
    pub beam_width_deg: f64,
    /// Lower bound on the radius of influence (meters)
    pub min_roi: f64,
    /// Multiplier on the beam footprint
    pub roi_factor: f64,
}

impl Default for BeamParams {
    fn default() -> Self {
        Self {
            sensor_height: 0.0,
            beam_width_deg: 1.0,
            min_roi: 500.0,
            roi_factor: 1.0,
        }
    }
}

/// Polar description of a radar volume, one entry per gate
#[derive(Debug, Clone, Default)]
pub struct PolarGates {
    /// Slant range to the gate center (meters)
    pub range: Vec<f64>,
    /// Azimuth, clockwise from north (degrees)
    pub azimuth_deg: Vec<f64>,
    /// Beam elevation (degrees)
    pub elevation_deg: Vec<f64>,
    /// Range resolution (meters)
    pub gate_size: Vec<f64>,
    pub fields: BTreeMap<String, Vec<f64>>,
    /// Value marking a missing field entry
    pub missing_value: f64,
}

impl PolarGates {
    pub fn new() -> Self {
        Self {
            missing_value: INVALID_DATA,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Derives Cartesian gate positions under the 4/3 Earth model
pub struct PolarToCartesian {
    params: BeamParams,
}

impl PolarToCartesian {
    pub fn new(params: BeamParams) -> Self {
        Self { params }
    }

    /// Position of a single gate
    pub fn gate(&self, range: f64, azimuth_deg: f64, elevation_deg: f64, gate_size: f64) -> InputGate {
        let ir = EFFECTIVE_EARTH_RADIUS_M;
        let e = elevation_deg.to_radians();
        let az = azimuth_deg.to_radians();

        let height = (range * range + 2.0 * range * ir * e.sin() + ir * ir).sqrt() - ir;
        let s = ir * (range * e.cos() / (ir + height)).asin();
        let beam_width = self.params.beam_width_deg.to_radians();
        let roi = (self.params.roi_factor * range * beam_width).max(self.params.min_roi);

        InputGate {
            x: s * az.sin(),
            y: s * az.cos(),
            z: height + self.params.sensor_height,
            ground_distance: s,
            elevation_deg,
            range_gate: range,
            gate_size,
            radius_of_influence: roi,
        }
    }

    /// Convert a polar volume into a gate table ready for gridding
    pub fn convert(&self, polar: PolarGates) -> GridResult<GateTable> {
        let n = polar.len();
        for (name, len) in [
            ("azimuth_deg", polar.azimuth_deg.len()),
            ("elevation_deg", polar.elevation_deg.len()),
            ("gate_size", polar.gate_size.len()),
        ] {
            if len != n {
                return Err(GridError::InvalidInput(format!(
                    "Polar column '{}' has {} entries, expected {}",
                    name, len, n
                )));
            }
        }

        log::debug!("Computing Cartesian positions for {} gates", n);

        let convert_one = |m: usize| {
            self.gate(
                polar.range[m],
                polar.azimuth_deg[m],
                polar.elevation_deg[m],
                polar.gate_size[m],
            )
        };

        #[cfg(feature = "parallel")]
        let gates: Vec<InputGate> = (0..n).into_par_iter().map(convert_one).collect();
        #[cfg(not(feature = "parallel"))]
        let gates: Vec<InputGate> = (0..n).map(convert_one).collect();

        let mut geometry = GateGeometry::with_capacity(n);
        for gate in gates {
            geometry.push(gate);
        }

        let mut table = GateTable::with_missing_value(geometry, polar.missing_value)?;
        for (name, values) in polar.fields {
            table.add_field(&name, values)?;
        }
        Ok(table)
    }
}
