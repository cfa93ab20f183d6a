use crate::core::grid_engine::GridEngineParams;
use crate::core::normalize::NormalizeParams;
use crate::core::polar_to_cartesian::BeamParams;
use crate::core::scatter::{AccumulationStrategy, FieldSelection, ScatterParams};
use crate::types::{GridError, GridGeometry, GridResult};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::path::Path;

/// Horizontal grid layout, distances in kilometers
#[derive(Debug, Clone, Deserialize)]
pub struct GridXyGeom {
    pub minx: f64,
    pub miny: f64,
    pub dx: f64,
    pub dy: f64,
    pub nx: usize,
    pub ny: usize,
}

/// Vertical grid layout, distances in kilometers
#[derive(Debug, Clone, Deserialize)]
pub struct GridZGeom {
    pub minz: f64,
    pub dz: f64,
    pub nz: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldList {
    #[serde(rename = "field", default)]
    pub fields: Vec<String>,
}

/// Optional overrides of the scatter thresholds
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScatterSection {
    pub gate_size_factor: Option<f64>,
    pub elevation_split_deg: Option<f64>,
    pub low_elevation_tolerance_deg: Option<f64>,
    pub high_elevation_tolerance_deg: Option<f64>,
    pub max_angular_separation_rad: Option<f64>,
    pub min_cell_elevation_deg: Option<f64>,
    pub max_cell_elevation_deg: Option<f64>,
    pub chunk_size: Option<usize>,
    pub accumulation: Option<String>,
}

/// Gridding parameter file.
///
/// ```xml
/// <params>
///   <grid_xy_geom><minx>-150</minx><miny>-150</miny><dx>1</dx><dy>1</dy><nx>301</nx><ny>301</ny></grid_xy_geom>
///   <grid_z_geom><minz>0.5</minz><dz>0.5</dz><nz>20</nz></grid_z_geom>
///   <output_fields><field>REF</field></output_fields>
/// </params>
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct GridParams {
    pub grid_xy_geom: GridXyGeom,
    pub grid_z_geom: GridZGeom,
    #[serde(default)]
    pub output_fields: FieldList,
    /// Restrict scattering to these fields
    pub selected_fields: Option<FieldList>,
    /// Restrict scattering to fields with this name prefix
    pub field_prefix: Option<String>,
    pub min_contributors: Option<u32>,
    pub beam_width_deg: Option<f64>,
    pub min_roi_km: Option<f64>,
    #[serde(default)]
    pub scatter: ScatterSection,
}

impl GridParams {
    pub fn from_xml_str(xml_content: &str) -> GridResult<Self> {
        from_str::<GridParams>(xml_content)
            .map_err(|e| GridError::Config(format!("Failed to parse gridding parameters: {}", e)))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> GridResult<Self> {
        log::info!("Loading gridding parameters: {}", path.as_ref().display());
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_xml_str(&content)
    }

    /// Grid geometry in meters
    pub fn geometry(&self) -> GridResult<GridGeometry> {
        let xy = &self.grid_xy_geom;
        let z = &self.grid_z_geom;
        GridGeometry::from_km((xy.minx, xy.miny, z.minz), (xy.dx, xy.dy, z.dz), (xy.nx, xy.ny, z.nz))
    }

    pub fn output_fields(&self) -> &[String] {
        &self.output_fields.fields
    }

    pub fn field_selection(&self) -> GridResult<FieldSelection> {
        match (&self.selected_fields, &self.field_prefix) {
            (Some(_), Some(_)) => Err(GridError::Config(
                "selected_fields and field_prefix are mutually exclusive".to_string(),
            )),
            (Some(list), None) => Ok(FieldSelection::names(list.fields.iter().cloned())),
            (None, Some(prefix)) => Ok(FieldSelection::Prefix(prefix.clone())),
            (None, None) => Ok(FieldSelection::All),
        }
    }

    pub fn scatter_params(&self) -> GridResult<ScatterParams> {
        let defaults = ScatterParams::default();
        let s = &self.scatter;
        let strategy = match &s.accumulation {
            Some(name) => name.parse::<AccumulationStrategy>()?,
            None => defaults.strategy,
        };

        let params = ScatterParams {
            gate_size_factor: s.gate_size_factor.unwrap_or(defaults.gate_size_factor),
            elevation_split_deg: s.elevation_split_deg.unwrap_or(defaults.elevation_split_deg),
            low_elevation_tolerance_deg: s
                .low_elevation_tolerance_deg
                .unwrap_or(defaults.low_elevation_tolerance_deg),
            high_elevation_tolerance_deg: s
                .high_elevation_tolerance_deg
                .unwrap_or(defaults.high_elevation_tolerance_deg),
            max_angular_separation_rad: s
                .max_angular_separation_rad
                .unwrap_or(defaults.max_angular_separation_rad),
            min_cell_elevation_deg: s.min_cell_elevation_deg,
            max_cell_elevation_deg: s.max_cell_elevation_deg,
            chunk_size: s.chunk_size.unwrap_or(defaults.chunk_size),
            strategy,
            field_selection: self.field_selection()?,
            ..defaults
        };
        params.validate()?;
        Ok(params)
    }

    pub fn normalize_params(&self) -> NormalizeParams {
        let defaults = NormalizeParams::default();
        NormalizeParams {
            min_contributors: self.min_contributors.unwrap_or(defaults.min_contributors),
            ..defaults
        }
    }

    pub fn engine_params(&self) -> GridResult<GridEngineParams> {
        let params = GridEngineParams {
            scatter: self.scatter_params()?,
            normalize: self.normalize_params(),
        };
        params.validate()?;
        Ok(params)
    }

    /// Beam parameters for deriving gate positions at the given sensor height
    pub fn beam_params(&self, sensor_height: f64) -> BeamParams {
        let defaults = BeamParams::default();
        BeamParams {
            sensor_height,
            beam_width_deg: self.beam_width_deg.unwrap_or(defaults.beam_width_deg),
            min_roi: self.min_roi_km.map_or(defaults.min_roi, |km| km * 1000.0),
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
        <params>
            <grid_xy_geom>
                <minx>-10.0</minx><miny>-20.0</miny>
                <dx>0.5</dx><dy>1.0</dy>
                <nx>41</nx><ny>41</ny>
            </grid_xy_geom>
            <grid_z_geom><minz>0.25</minz><dz>0.5</dz><nz>10</nz></grid_z_geom>
        </params>
    "#;

    #[test]
    fn test_minimal_params() {
        let params = GridParams::from_xml_str(MINIMAL).unwrap();
        let geometry = params.geometry().unwrap();

        assert_eq!(geometry.min_x, -10_000.0);
        assert_eq!(geometry.min_y, -20_000.0);
        assert_eq!(geometry.min_z, 250.0);
        assert_eq!(geometry.dx, 500.0);
        assert_eq!(geometry.dims(), (41, 41, 10));
        assert!(params.output_fields().is_empty());
        assert_eq!(params.field_selection().unwrap(), FieldSelection::All);

        let engine_params = params.engine_params().unwrap();
        assert_eq!(engine_params.normalize.min_contributors, 3);
        assert_eq!(engine_params.scatter.strategy, AccumulationStrategy::LocalReduce);
        assert_eq!(params.beam_params(30.0).min_roi, 500.0);
    }

    #[test]
    fn test_full_params() {
        let xml = r#"
            <params>
                <grid_xy_geom><minx>0</minx><miny>0</miny><dx>1</dx><dy>1</dy><nx>2</nx><ny>2</ny></grid_xy_geom>
                <grid_z_geom><minz>0</minz><dz>0.5</dz><nz>1</nz></grid_z_geom>
                <output_fields><field>REF</field><field>VEL</field></output_fields>
                <field_prefix>REF</field_prefix>
                <min_contributors>2</min_contributors>
                <beam_width_deg>0.95</beam_width_deg>
                <min_roi_km>0.75</min_roi_km>
                <scatter>
                    <max_angular_separation_rad>0.05</max_angular_separation_rad>
                    <min_cell_elevation_deg>0</min_cell_elevation_deg>
                    <max_cell_elevation_deg>20</max_cell_elevation_deg>
                    <accumulation>atomic</accumulation>
                </scatter>
            </params>
        "#;
        let params = GridParams::from_xml_str(xml).unwrap();

        assert_eq!(params.output_fields(), &["REF".to_string(), "VEL".to_string()]);
        let scatter = params.scatter_params().unwrap();
        assert_eq!(scatter.field_selection, FieldSelection::Prefix("REF".to_string()));
        assert_eq!(scatter.strategy, AccumulationStrategy::Atomic);
        assert_eq!(scatter.max_angular_separation_rad, 0.05);
        assert_eq!(scatter.max_cell_elevation_deg, Some(20.0));
        assert_eq!(scatter.gate_size_factor, 2.0);
        assert_eq!(params.normalize_params().min_contributors, 2);

        let beam = params.beam_params(12.0);
        assert_eq!(beam.min_roi, 750.0);
        assert_eq!(beam.beam_width_deg, 0.95);
        assert_eq!(beam.sensor_height, 12.0);
    }

    #[test]
    fn test_invalid_params() {
        assert!(matches!(GridParams::from_xml_str("<params>"), Err(GridError::Config(_))));

        let conflicting = MINIMAL.replace(
            "</params>",
            "<selected_fields><field>REF</field></selected_fields><field_prefix>R</field_prefix></params>",
        );
        let params = GridParams::from_xml_str(&conflicting).unwrap();
        assert!(params.field_selection().is_err());

        let bad_strategy = MINIMAL.replace("</params>", "<scatter><accumulation>mutex</accumulation></scatter></params>");
        assert!(GridParams::from_xml_str(&bad_strategy).unwrap().scatter_params().is_err());

        let empty_window = MINIMAL.replace(
            "</params>",
            "<scatter><min_cell_elevation_deg>20</min_cell_elevation_deg><max_cell_elevation_deg>0</max_cell_elevation_deg></scatter></params>",
        );
        assert!(matches!(
            GridParams::from_xml_str(&empty_window).unwrap().engine_params(),
            Err(GridError::Config(_))
        ));

        let zero_dims = MINIMAL.replace("<nz>10</nz>", "<nz>0</nz>");
        assert!(GridParams::from_xml_str(&zero_dims).unwrap().geometry().is_err());
    }

    #[test]
    fn test_params_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let params = GridParams::from_file(file.path()).unwrap();
        assert_eq!(params.grid_xy_geom.nx, 41);
        assert!(matches!(
            GridParams::from_file("/nonexistent/grid_params.xml"),
            Err(GridError::Io(_))
        ));
    }
}
