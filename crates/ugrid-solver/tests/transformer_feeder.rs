//! Validated feeder through the radial sweep

use ugrid_algo::{validate_model, ValidationOptions};
use ugrid_core::{
    GridError, Line, Load, Model, Node, PhaseSet, PowerSource, PowerTransformer, VoltAmperes,
    Vars, Volts, Watts,
};
use ugrid_solver::{
    line_loading, transformer_loading, CircuitDescription, CircuitSession, RadialSweepSession,
    SolveRequest,
};

fn feeder(demand_kw: f64) -> Model {
    let mut model = Model::new();
    for name in ["source", "mv", "lv", "j_b1"] {
        model.add(Node::new(name)).unwrap();
    }
    model
        .add(PowerSource::new("ps_source", "source", Volts(13200.0)))
        .unwrap();
    model
        .add(Line::new("l_mv", "source", "mv").with_phases(PhaseSet::three_phase()))
        .unwrap();
    let mut tx = PowerTransformer::new("t1", "mv", "lv").with_windings(
        (Volts(13200.0), PhaseSet::three_phase()),
        (Volts(480.0), PhaseSet::three_phase()),
        VoltAmperes::from_kva(100.0),
    );
    tx.reactances = vec![0.05];
    tx.windings[1].resistance = 0.02;
    model.add(tx).unwrap();
    model
        .add(Line::new("l_lv", "lv", "j_b1").with_phases(PhaseSet::three_phase()))
        .unwrap();
    model
        .add(Load::new("b1", "j_b1").with_demand(
            PhaseSet::three_phase(),
            Watts::from_kw(demand_kw),
            Vars(0.0),
        ))
        .unwrap();
    model
}

fn request() -> SolveRequest {
    SolveRequest {
        index: 0,
        stepsize_minutes: 60.0,
        hour: 0,
        seconds: 0.0,
    }
}

#[test]
fn test_transformer_loading_tracks_demand() {
    let mut model = feeder(50.0);
    assert!(validate_model(&mut model, "ps_source", &ValidationOptions::default())
        .unwrap()
        .report
        .passed());

    let mut session = RadialSweepSession::new();
    session
        .load(&CircuitDescription {
            model: &model,
            master_file: None,
        })
        .unwrap();
    assert_eq!(session.solve(&request()).unwrap(), None);

    let voltages = session.bus_voltages().unwrap();
    assert!(voltages["j_b1"] < voltages["lv"] + 1e-12);
    assert!(voltages["lv"] < 1.0);

    assert_eq!(session.transformer_names(), vec!["t1".to_string()]);
    let reading = session.transformer_currents("t1").unwrap();
    assert_eq!(reading.rated_kva, 100.0);
    assert!((reading.rated_kv - 13.2).abs() < 1e-12);
    let loading = transformer_loading(&reading);
    assert!(loading > 0.45 && loading < 0.55, "loading {loading}");

    // default conductors carry no rating
    let line = session.line_currents("l_lv").unwrap();
    assert_eq!(line_loading(&line), 0.0);
    assert!(line.currents[0] > 50.0);
}

#[test]
fn test_unknown_branch_and_reload() {
    let model = feeder(10.0);
    let mut session = RadialSweepSession::new();
    let circuit = CircuitDescription {
        model: &model,
        master_file: None,
    };
    session.load(&circuit).unwrap();
    assert!(matches!(
        session.line_currents("l_lv"),
        Err(GridError::Solver(_))
    ));
    session.solve(&request()).unwrap();
    assert!(matches!(
        session.line_currents("nope"),
        Err(GridError::UnknownElement(_))
    ));

    session.clear();
    assert!(session.transformer_names().is_empty());
    session.load(&circuit).unwrap();
    assert_eq!(session.line_names(), vec!["l_lv".to_string(), "l_mv".to_string()]);
}

#[test]
fn test_model_without_source_is_rejected() {
    let mut model = Model::new();
    model.add(Node::new("n1")).unwrap();
    let mut session = RadialSweepSession::new();
    let err = session
        .load(&CircuitDescription {
            model: &model,
            master_file: None,
        })
        .unwrap_err();
    assert!(matches!(err, GridError::NoSubstation));
}
