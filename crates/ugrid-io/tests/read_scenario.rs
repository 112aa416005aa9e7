//! Reads a small scenario from disk, validates it and writes OpenDSS scripts.

use std::fs;
use std::path::Path;

use serde_json::json;
use tempfile::tempdir;
use ugrid_algo::{validate_model, ValidationOptions};
use ugrid_core::{PhaseSet, Volts};
use ugrid_io::{read_urbanopt, write_opendss, EquipmentCatalog, ProfileWriter, ReaderOptions};

fn write_json(path: &Path, value: serde_json::Value) {
    fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
}

fn junction(id: &str, lon: f64, lat: f64, extra: serde_json::Value) -> serde_json::Value {
    let mut props = json!({"id": id, "type": "ElectricalJunction"});
    props
        .as_object_mut()
        .unwrap()
        .extend(extra.as_object().unwrap().clone());
    json!({"type": "Feature", "properties": props,
           "geometry": {"type": "Point", "coordinates": [lon, lat]}})
}

fn scenario(dir: &Path) {
    write_json(
        &dir.join("catalog.json"),
        json!({
            "WIRES": {"WIRES CATALOG": [
                {"nameclass": "AL 1/0", "ampacity (A)": "200", "gmr (mm)": 4.0,
                 "diameter (mm)": 9.0, "resistance (ohm/km)": 0.6, "type": "OH"}
            ]},
            "LINES": [{"Zone": [{"Name": "3P_OH", "Line geometry": [
                {"wire": "AL 1/0", "phase": "A", "x (m)": 0, "height (m)": 9},
                {"wire": "AL 1/0", "phase": "B", "x (m)": 0.5, "height (m)": 9},
                {"wire": "AL 1/0", "phase": "C", "x (m)": 1.0, "height (m)": 9}
            ]}]}],
            "SUBSTATIONS AND DISTRIBUTION TRANSFORMERS": [{"Zone": [
                {"Name": "T_3P", "Installed Power(kVA)": 500, "Primary Voltage (kV)": 13.8,
                 "Secondary Voltage (kV)": 0.48, "Nphases": 3, "Centertap": "False",
                 "connection": "Delta-Wye", "Reactance (p.u. transf)": 0.05,
                 "Low-voltage-side short-circuit resistance (ohms)": 0.004}
            ]}]
        }),
    );

    write_json(
        &dir.join("feature.json"),
        json!({"type": "FeatureCollection", "features": [
            {"properties": {"id": "sub", "district_system_type": "Electrical Substation"}},
            junction("j_sub", -105.0, 40.0, json!({"DSId": "sub"})),
            junction("j_hv", -105.001, 40.0, json!({"DSId": "t1"})),
            junction("j_lv", -105.001, 40.0, json!({"DSId": "t1"})),
            junction("j_b1", -105.002, 40.0, json!({"buildingId": "b1"})),
            junction("j_island", -105.00201, 40.0, json!({"buildingId": "b2"})),
            {"properties": {"id": "l1", "type": "ElectricalConnector",
                "startJunctionId": "j_sub", "endJunctionId": "j_hv",
                "total_length": 100.0, "electrical_catalog_name": "3P_OH"}},
            {"properties": {"id": "l2", "type": "ElectricalConnector",
                "startJunctionId": "j_lv", "endJunctionId": "j_b1",
                "total_length": 50.0, "electrical_catalog_name": "3P_OH"}},
            {"properties": {"id": "t1", "district_system_type": "Transformer",
                "electrical_catalog_name": "T_3P", "phases": ["A", "B", "C"]}},
            {"properties": {"id": "b1", "type": "Building"}},
            {"properties": {"id": "b2", "type": "Building"}}
        ]}),
    );

    let reports = dir.join("run/b1/feature_reports");
    fs::create_dir_all(&reports).unwrap();
    fs::write(
        reports.join("default_feature_report.csv"),
        "Datetime,Net Power(kW)\n\
         2020/01/01 00:00:00,30\n\
         2020/01/01 00:15:00,60\n\
         2020/01/01 00:30:00,45\n",
    )
    .unwrap();
}

#[test]
fn test_read_validate_and_export() {
    let dir = tempdir().unwrap();
    scenario(dir.path());

    let catalog = EquipmentCatalog::load(&dir.path().join("catalog.json")).unwrap();
    let out = dir.path().join("opendss");
    let options = ReaderOptions {
        load_folder: dir.path().join("run"),
        use_reopt: false,
        profiles: Some(ProfileWriter::new(out.join("profiles"), "../profiles")),
    };
    let mut outcome = read_urbanopt(&dir.path().join("feature.json"), &catalog, &options).unwrap();

    assert_eq!(outcome.substitutions.get("j_island"), Some("j_b1"));
    assert_eq!(
        outcome.building_junctions.get("b2").map(String::as_str),
        Some("j_b1")
    );

    let model = &outcome.model;
    assert_eq!(model.node("source").unwrap().nominal_voltage, Some(Volts(13800.0)));
    assert_eq!(model.feeder.as_ref().unwrap().nominal_voltage, Volts(13800.0));

    let b1 = model.loads().find(|l| l.name == "b1").unwrap();
    assert_eq!(b1.phases(), PhaseSet::three_phase());
    assert!((b1.active_power().kw() - 60.0).abs() < 1e-9);
    let ts = b1.timeseries.as_ref().unwrap();
    assert_eq!(ts.values, vec![0.5, 1.0, 0.75]);
    assert_eq!(ts.interval_hours, 0.25);
    assert!(out.join("profiles/timestamps.csv").exists());

    let report = validate_model(&mut outcome.model, "ps_source", &ValidationOptions::default())
        .unwrap()
        .report;
    assert!(report.passed());

    let written = write_opendss(&outcome.model, &out).unwrap();
    let loads = fs::read_to_string(written.dss_dir.join("Loads.dss")).unwrap();
    assert!(loads.contains("New Load.b1 bus1=j_b1.1.2.3"));
    assert!(loads.contains("yearly=feature_b1"));
    let shapes = fs::read_to_string(written.dss_dir.join("LoadShapes.dss")).unwrap();
    assert!(shapes.contains("mult=(file=../profiles/load_b1_pu.csv)"));
}

#[test]
fn test_unknown_line_catalog_entry_is_fatal() {
    let dir = tempdir().unwrap();
    scenario(dir.path());
    let path = dir.path().join("feature.json");
    let text = fs::read_to_string(&path)
        .unwrap()
        .replacen("3P_OH", "4P_UG", 1);
    fs::write(&path, text).unwrap();

    let catalog = EquipmentCatalog::load(&dir.path().join("catalog.json")).unwrap();
    let options = ReaderOptions {
        load_folder: dir.path().join("run"),
        ..ReaderOptions::default()
    };
    let err = read_urbanopt(&path, &catalog, &options).unwrap_err();
    assert!(err.to_string().contains("No line found in catalog for 4P_UG"));
}
