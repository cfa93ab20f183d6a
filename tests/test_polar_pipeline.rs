use polargrid::{GridEngine, GridParams, PolarGates, PolarToCartesian, INVALID_DATA};

const PARAMS_XML: &str = r#"
<params>
    <grid_xy_geom>
        <minx>-10</minx><miny>-10</miny>
        <dx>1</dx><dy>1</dy>
        <nx>21</nx><ny>21</ny>
    </grid_xy_geom>
    <grid_z_geom><minz>0</minz><dz>0.5</dz><nz>4</nz></grid_z_geom>
    <output_fields><field>REF</field><field>VEL</field></output_fields>
    <field_prefix>REF</field_prefix>
    <beam_width_deg>1.0</beam_width_deg>
    <min_roi_km>0.5</min_roi_km>
    <scatter>
        <min_cell_elevation_deg>0</min_cell_elevation_deg>
        <max_cell_elevation_deg>20</max_cell_elevation_deg>
    </scatter>
</params>
"#;

fn uniform_volume(value: f64) -> PolarGates {
    let mut polar = PolarGates::new();
    for &elevation in &[0.5, 1.5, 2.5, 3.5] {
        for az_step in 0..360 {
            for range_step in 1..=28 {
                polar.range.push(range_step as f64 * 500.0);
                polar.azimuth_deg.push(az_step as f64);
                polar.elevation_deg.push(elevation);
                polar.gate_size.push(250.0);
            }
        }
    }
    let n = polar.len();
    polar.fields.insert("REF".to_string(), vec![value; n]);
    polar.fields.insert("VEL".to_string(), vec![-4.0; n]);
    polar
}

#[test]
fn test_params_to_grid() {
    let _ = env_logger::builder().is_test(true).try_init();

    let params = GridParams::from_xml_str(PARAMS_XML).expect("parameters parse");
    let sensor_height = 15.0;

    let gates = PolarToCartesian::new(params.beam_params(sensor_height))
        .convert(uniform_volume(25.0))
        .expect("gate table");
    let mut engine = GridEngine::with_params(
        params.geometry().unwrap(),
        sensor_height,
        params.output_fields().iter().cloned(),
        params.engine_params().unwrap(),
    )
    .unwrap();

    assert_eq!(engine.dimensions(), (21, 21, 4));
    let stats = engine.run_scatter_and_normalize(&gates);
    assert_eq!(stats.gates_total, gates.len());
    assert!(stats.gates_scattered > 0);

    let reflectivity = engine.final_grid("REF").unwrap();
    let valid: Vec<f64> = reflectivity.iter().cloned().filter(|&v| v != INVALID_DATA).collect();
    assert!(!valid.is_empty());
    assert!(valid.iter().all(|&v| (25.0 - 1e-9..=26.0).contains(&v)));

    // Only REF-prefixed fields are scattered
    let velocity = engine.final_grid("VEL").unwrap();
    assert!(velocity.iter().all(|&v| v == INVALID_DATA));
    assert_eq!(engine.accumulator("VEL").unwrap().touched_cells(), 0);
}

#[test]
fn test_engines_share_geometry_table() {
    let params = GridParams::from_xml_str(PARAMS_XML).unwrap();
    let gates = PolarToCartesian::new(params.beam_params(0.0))
        .convert(uniform_volume(40.0))
        .unwrap();

    let mut first = GridEngine::with_params(params.geometry().unwrap(), 0.0, ["REF"], params.engine_params().unwrap()).unwrap();
    let mut second = GridEngine::with_table(first.geometry_table().clone(), ["REF"], params.engine_params().unwrap()).unwrap();

    first.run_scatter_and_normalize(&gates);
    second.run_scatter_and_normalize(&gates);

    assert_eq!(first.accumulator("REF").unwrap().count, second.accumulator("REF").unwrap().count);
}
