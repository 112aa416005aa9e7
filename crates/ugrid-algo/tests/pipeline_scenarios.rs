//! End-to-end scenarios for repair, checks and fixers

use ugrid_algo::{
    check_model, repair, validate_model, CheckKind, SizingPolicy, UpstreamIndex,
    ValidationOptions,
};
use ugrid_core::{
    GridError, Line, LinkKind, Load, Model, NetworkGraph, Node, Phase, PhaseSet, PowerSource,
    PowerTransformer, VoltAmperes, Vars, Volts, Watts,
};

/// Source -> MV line -> transformer -> LV line -> building load.
fn single_transformer_feeder(lv_phases: PhaseSet, rating_kva: f64, demand_kw: f64) -> Model {
    let mut model = Model::new();
    model
        .add(Node::new("source").with_position(40.0, -105.0))
        .unwrap();
    model.add(Node::new("mv").with_position(40.0, -105.001)).unwrap();
    model.add(Node::new("lv").with_position(40.0, -105.001)).unwrap();
    model.add(Node::new("j_b1").with_position(40.0, -105.002)).unwrap();
    model
        .add(PowerSource::new("ps_source", "source", Volts(13200.0)))
        .unwrap();
    model
        .add(Line::new("l_mv", "source", "mv").with_phases(PhaseSet::three_phase()))
        .unwrap();
    model
        .add(PowerTransformer::new("t1", "mv", "lv").with_windings(
            (Volts(13200.0), PhaseSet::three_phase()),
            (Volts(480.0), PhaseSet::three_phase()),
            VoltAmperes::from_kva(rating_kva),
        ))
        .unwrap();
    model
        .add(Line::new("l_lv", "lv", "j_b1").with_phases(lv_phases))
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

#[test]
fn test_two_components_merge_onto_source() {
    let mut model = Model::new();
    model.add(Node::new("N1").with_position(0.0, 0.0)).unwrap();
    model.add(Node::new("N2").with_position(0.0, 0.0001)).unwrap();
    model
        .add(PowerSource::new("S", "N1", Volts(13200.0)))
        .unwrap();
    model.add(Load::new("L", "N2")).unwrap();

    let before = NetworkGraph::build(&model, "S").unwrap();
    assert_eq!(before.component_count(), 2);

    let outcome = repair(&mut model, "S").unwrap();
    assert_eq!(outcome.graph.component_count(), 1);
    assert_eq!(outcome.substitutions.len(), 1);
    assert_eq!(outcome.substitutions.get("N2"), Some("N1"));
    assert!(!model.contains("N2"));
    assert_eq!(model.loads().next().unwrap().connecting_element, "N1");
    assert_eq!(model.nodes().count(), 1);
}

#[test]
fn test_repair_on_connected_model_is_noop() {
    let mut model = single_transformer_feeder(PhaseSet::three_phase(), 100.0, 10.0);
    let count = model.len();
    let outcome = repair(&mut model, "ps_source").unwrap();
    assert!(outcome.substitutions.is_empty());
    assert_eq!(model.len(), count);
}

#[test]
fn test_repair_without_substation_fails() {
    let mut model = Model::new();
    model.add(Node::new("a").with_position(0.0, 0.0)).unwrap();
    model.add(Node::new("b").with_position(1.0, 0.0)).unwrap();
    assert!(matches!(repair(&mut model, "a"), Err(GridError::NoSubstation)));
}

#[test]
fn test_phase_mismatch_is_fixed_once() {
    let ab: PhaseSet = [Phase::A, Phase::B].into_iter().collect();
    let mut model = single_transformer_feeder(ab, 100.0, 10.0);

    let outcome = validate_model(&mut model, "ps_source", &ValidationOptions::default()).unwrap();
    let initial = outcome.initial.outcome(CheckKind::MatchedPhases).unwrap();
    assert!(!initial.passed);
    assert!(outcome.report.passed());
    assert_eq!(outcome.phase_rewrites.len(), 1);
    assert_eq!(outcome.phase_rewrites[0].element, "l_lv");
    assert_eq!(model.line("l_lv").unwrap().phases(), PhaseSet::three_phase());
}

#[test]
fn test_unfixable_primary_mismatch_is_fatal() {
    let ab: PhaseSet = [Phase::A, Phase::B].into_iter().collect();
    let mut model = single_transformer_feeder(PhaseSet::three_phase(), 100.0, 10.0);
    if let Some(ugrid_core::Element::Line(line)) = model.get_mut("l_mv") {
        line.set_phases(ab);
    }
    let err = validate_model(&mut model, "ps_source", &ValidationOptions::default()).unwrap_err();
    assert!(err.to_string().contains("Invalid OpenDSS input"));
    assert!(err.to_string().contains("matched phases"));
}

#[test]
fn test_loop_is_fatal_without_repair_attempt() {
    let mut model = single_transformer_feeder(PhaseSet::three_phase(), 100.0, 10.0);
    model
        .add(Line::new("l_back", "j_b1", "source").with_phases(PhaseSet::three_phase()))
        .unwrap();
    let err = validate_model(&mut model, "ps_source", &ValidationOptions::default()).unwrap_err();
    assert!(err.to_string().contains("no loops"));
    assert!(err.to_string().contains("unique path"));
}

#[test]
fn test_undersized_transformer_upgraded_on_request() {
    let mut model = single_transformer_feeder(PhaseSet::three_phase(), 100.0, 150.0);
    let options = ValidationOptions::default().with_upgrades(SizingPolicy::default());
    let outcome = validate_model(&mut model, "ps_source", &options).unwrap();

    assert_eq!(outcome.upgrades.len(), 1);
    let rating = model.transformer("t1").unwrap().rated_power().kva();
    assert!(rating >= 150.0);
    assert_eq!(rating, 150.0);
}

#[test]
fn test_undersized_transformer_kept_without_flag() {
    let mut model = single_transformer_feeder(PhaseSet::three_phase(), 100.0, 150.0);
    let outcome = validate_model(&mut model, "ps_source", &ValidationOptions::default()).unwrap();
    assert!(outcome.upgrades.is_empty());
    assert_eq!(model.transformer("t1").unwrap().rated_power().kva(), 100.0);
}

#[test]
fn test_single_node_passes_every_check() {
    let mut model = Model::new();
    model.add(Node::new("source")).unwrap();
    let graph = NetworkGraph::build(&model, "source").unwrap();
    let report = check_model(&model, &graph);
    assert_eq!(report.outcomes.len(), 5);
    assert!(report.passed());
}

#[test]
fn test_checks_are_idempotent() {
    let ab: PhaseSet = [Phase::A, Phase::B].into_iter().collect();
    for model in [
        single_transformer_feeder(PhaseSet::three_phase(), 100.0, 10.0),
        single_transformer_feeder(ab, 100.0, 10.0),
    ] {
        let graph = NetworkGraph::build(&model, "ps_source").unwrap();
        assert_eq!(check_model(&model, &graph), check_model(&model, &graph));
    }
}

#[test]
fn test_upstream_transformer_is_nearest_on_path() {
    let mut model = single_transformer_feeder(PhaseSet::three_phase(), 500.0, 10.0);
    model.add(Node::new("lv2")).unwrap();
    model.add(Node::new("j_b2")).unwrap();
    model
        .add(PowerTransformer::new("t2", "j_b1", "lv2").with_windings(
            (Volts(480.0), PhaseSet::three_phase()),
            (Volts(208.0), PhaseSet::three_phase()),
            VoltAmperes::from_kva(50.0),
        ))
        .unwrap();
    model
        .add(Line::new("l_b2", "lv2", "j_b2").with_phases(PhaseSet::three_phase()))
        .unwrap();
    model.add(Load::new("b2", "j_b2")).unwrap();

    let graph = NetworkGraph::build(&model, "ps_source").unwrap();
    let upstream = UpstreamIndex::build(&graph);
    for (load, expected) in [("b1", "t1"), ("b2", "t2")] {
        let assigned = upstream.get_upstream_transformer(load).unwrap();
        assert_eq!(assigned, Some(expected));
        let path = upstream.path_to_source(load).unwrap();
        let first_tx = path
            .iter()
            .find(|hop| hop.kind == LinkKind::Transformer)
            .map(|hop| hop.element.as_str());
        assert_eq!(first_tx, Some(expected));
    }
}

#[test]
fn test_validation_outcome_serializes_rewrites() {
    let ab: PhaseSet = [Phase::A, Phase::B].into_iter().collect();
    let mut model = single_transformer_feeder(ab, 100.0, 10.0);
    let outcome = validate_model(&mut model, "ps_source", &ValidationOptions::default()).unwrap();
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["phase_rewrites"][0]["element"], "l_lv");
    assert_eq!(json["upgrades"].as_array().map(Vec::len), Some(0));
}
