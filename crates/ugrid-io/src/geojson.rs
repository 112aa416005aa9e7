//! URBANopt GeoJSON feature reader.
//!
//! Reading happens in two stages. [`build_network`] turns junctions,
//! connectors and transformers into nodes, lines and transformers.
//! [`attach_buildings`] then stitches any islands onto the source and hangs
//! one load (and optionally one PV system) per building off its junction,
//! taking voltage and phases from the building's upstream transformer.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use ugrid_algo::{repair, SubstitutionMap, UpstreamIndex};
use ugrid_core::{
    ConcentricNeutral, ConnectionType, Diagnostics, FeederMetadata, GridError, Line, LineType,
    Load, Model, NetworkGraph, Node, Phase, PhaseSet, Photovoltaic, PerUnit, PowerSource,
    PowerTransformer, VoltAmperes, VoltageType, Volts, Watts, Winding, Wire,
};

use crate::catalog::{EquipmentCatalog, TransformerSpec, WireSpec};
use crate::profiles::{feature_reports_dir, read_pv_capacity_kw, Profile, ProfileWriter};

pub const SOURCE_NODE: &str = "source";
pub const SOURCE_ELEMENT: &str = "ps_source";
pub const FEEDER_NAME: &str = "urbanopt-feeder";
/// Source voltage until a transformer primary says otherwise
pub const PLACEHOLDER_VOLTAGE: Volts = Volts(13200.0);
pub const POWER_FACTOR: f64 = 0.95;

const FEET_TO_METERS: f64 = 0.3048;
const INSULATION_THICKNESS_M: f64 = 0.01;

const JUNCTION: &str = "ElectricalJunction";
const CONNECTOR: &str = "ElectricalConnector";
const BUILDING: &str = "Building";
const SUBSTATION: &str = "Electrical Substation";
const TRANSFORMER: &str = "Transformer";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Problem trying to read json from file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing feature file {}", path.display()))
    }

    fn of_type<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Feature> {
        self.features.iter().filter(move |f| f.is_type(kind))
    }

    fn of_system_type<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Feature> {
        self.features
            .iter()
            .filter(move |f| f.system_type() == Some(kind))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Geometry {
    #[serde(default)]
    pub coordinates: Value,
}

impl Feature {
    pub fn prop(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// String property; numeric ids are accepted and stringified.
    pub fn prop_str(&self, key: &str) -> Option<String> {
        match self.prop(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn id(&self) -> Option<String> {
        self.prop_str("id")
    }

    pub fn is_type(&self, kind: &str) -> bool {
        self.prop("type").and_then(Value::as_str) == Some(kind)
    }

    pub fn system_type(&self) -> Option<&str> {
        self.prop("district_system_type").and_then(Value::as_str)
    }

    /// First `[long, lat]` pair of the geometry, as `(lat, long)`.
    pub fn lat_long(&self) -> Option<(f64, f64)> {
        let mut coords = &self.geometry.as_ref()?.coordinates;
        while let Some(first) = coords.as_array().and_then(|a| a.first()) {
            if first.is_number() {
                break;
            }
            coords = first;
        }
        let pair = coords.as_array()?;
        Some((pair.get(1)?.as_f64()?, pair.first()?.as_f64()?))
    }

    fn require_str(&self, key: &str) -> Result<String> {
        self.prop_str(key).ok_or_else(|| {
            GridError::MalformedInput(format!(
                "feature '{}' has no '{}' property",
                self.id().unwrap_or_default(),
                key
            ))
            .into()
        })
    }
}

/// Lookups shared by both reading stages.
#[derive(Debug, Clone, Default)]
struct FeatureIndex {
    /// District system id -> ids of the junctions belonging to it
    systems: BTreeMap<String, Vec<String>>,
    substation_junctions: BTreeSet<String>,
    /// Building id -> junction id
    building_junctions: BTreeMap<String, String>,
}

impl FeatureIndex {
    fn new(features: &FeatureCollection) -> Self {
        let mut index = FeatureIndex::default();
        for feature in &features.features {
            if let (Some(ds_id), Some(id)) = (feature.prop_str("DSId"), feature.id()) {
                index.systems.entry(ds_id).or_default().push(id);
            }
        }
        for substation in features.of_system_type(SUBSTATION) {
            let Some(id) = substation.id() else { continue };
            if let Some(junctions) = index.systems.get(&id) {
                index.substation_junctions.extend(junctions.iter().cloned());
            }
        }
        for junction in features.of_type(JUNCTION) {
            if let (Some(building), Some(id)) = (junction.prop_str("buildingId"), junction.id()) {
                index.building_junctions.insert(building, id);
            }
        }
        index
    }

    /// Model name of a junction: substation junctions all become the source.
    fn node_name<'a>(&self, junction: &'a str) -> &'a str {
        if self.substation_junctions.contains(junction) {
            SOURCE_NODE
        } else {
            junction
        }
    }
}

fn note(diagnostics: &mut Diagnostics, category: &str, message: String) {
    warn!("{}", message);
    diagnostics.add_warning(category, &message);
}

/// Nodes, lines and transformers of the feature collection.
pub fn build_network(
    features: &FeatureCollection,
    catalog: &EquipmentCatalog,
    diagnostics: &mut Diagnostics,
) -> Result<Model> {
    let index = FeatureIndex::new(features);
    let mut model = Model::new();

    add_nodes(&mut model, features, &index, diagnostics)?;
    add_lines(&mut model, features, &index, catalog, diagnostics)?;
    let source_voltages = add_transformers(&mut model, features, &index, catalog, diagnostics)?;

    match source_voltages.as_slice() {
        [] => {}
        [voltage] => set_source_voltage(&mut model, *voltage),
        many => {
            let listed: Vec<String> = many.iter().map(|v| v.to_string()).collect();
            bail!(GridError::MalformedInput(format!(
                "Problem setting source voltage: non-unique transformer high side voltages ({})",
                listed.join(", ")
            )));
        }
    }

    info!("network read: {}", model.stats());
    Ok(model)
}

fn add_nodes(
    model: &mut Model,
    features: &FeatureCollection,
    index: &FeatureIndex,
    diagnostics: &mut Diagnostics,
) -> Result<()> {
    if index.substation_junctions.len() > 1 {
        note(
            diagnostics,
            "source",
            format!(
                "multiple power sources: {} substation junctions are merged into '{}'",
                index.substation_junctions.len(),
                SOURCE_NODE
            ),
        );
    }

    for junction in features.of_type(JUNCTION) {
        let Some(id) = junction.id() else {
            note(diagnostics, "junction", "junction without an id skipped".to_string());
            continue;
        };
        let (lat, long) = junction.lat_long().ok_or_else(|| {
            GridError::MalformedInput(format!("junction '{id}' has no point geometry"))
        })?;

        if !index.substation_junctions.contains(&id) {
            model.add(Node::new(id).with_position(lat, long))?;
            continue;
        }
        if model.contains(SOURCE_NODE) {
            continue;
        }
        let mut node = Node::new(SOURCE_NODE).with_position(lat, long);
        node.nominal_voltage = Some(PLACEHOLDER_VOLTAGE);
        node.is_substation_connection = true;
        node.setpoint = Some(PerUnit(1.0));
        model.add(node)?;
        model.add(PowerSource::new(
            SOURCE_ELEMENT,
            SOURCE_NODE,
            PLACEHOLDER_VOLTAGE,
        ))?;
        model.feeder = Some(FeederMetadata {
            name: FEEDER_NAME.to_string(),
            headnode: SOURCE_NODE.to_string(),
            nominal_voltage: PLACEHOLDER_VOLTAGE,
        });
    }
    Ok(())
}

fn wire_from_catalog(spec: &WireSpec, phase: Phase, x_m: f64, height_m: f64) -> Wire {
    let concentric_neutral = spec.has_concentric_neutral().then(|| ConcentricNeutral {
        gmr_m: spec.neutral_gmr_mm.unwrap_or(0.0) / 1000.0,
        resistance_ohm_per_m: spec.neutral_resistance_ohm_per_km.unwrap_or(0.0) / 1000.0,
        diameter_m: spec.neutral_strand_diameter_mm.unwrap_or(0.0) / 1000.0,
        outside_diameter_m: spec.neutral_outside_diameter_mm.unwrap_or(0.0) / 1000.0,
        strand_count: spec.neutral_strands.unwrap_or(0.0).round().max(0.0) as u32,
        insulation_thickness_m: INSULATION_THICKNESS_M,
    });
    Wire {
        nameclass: spec.nameclass.replace(' ', "_").replace('/', "-"),
        phase,
        ampacity_a: spec.ampacity_a,
        resistance_ohm_per_m: spec.resistance_ohm_per_km / 1000.0,
        gmr_m: spec.gmr_mm / 1000.0,
        diameter_m: spec.diameter_mm / 1000.0,
        x_m,
        height_m,
        concentric_neutral,
    }
}

fn add_lines(
    model: &mut Model,
    features: &FeatureCollection,
    index: &FeatureIndex,
    catalog: &EquipmentCatalog,
    diagnostics: &mut Diagnostics,
) -> Result<()> {
    let mut bad_lines = Vec::new();
    for connector in features.of_type(CONNECTOR) {
        let id = connector.require_str("id")?;
        let start = connector.require_str("startJunctionId")?;
        let end = connector.require_str("endJunctionId")?;
        let length_ft = connector
            .prop("total_length")
            .and_then(Value::as_f64)
            .ok_or_else(|| GridError::MalformedInput(format!("line '{id}' has no total_length")))?;

        let mut line = Line::new(id, index.node_name(&start), index.node_name(&end));
        line.length_m = length_ft * FEET_TO_METERS;

        match connector.prop_str("electrical_catalog_name") {
            Some(catalog_name) => {
                let spec = catalog.line(&catalog_name).ok_or_else(|| {
                    GridError::MalformedInput(format!("No line found in catalog for {catalog_name}"))
                })?;
                for geometry in &spec.geometry {
                    let wire_spec = catalog.wire(&geometry.wire).ok_or_else(|| {
                        GridError::MalformedInput(format!(
                            "No wire found in catalog for {}",
                            geometry.wire
                        ))
                    })?;
                    let phase: Phase = geometry.phase.parse()?;
                    if wire_spec.is_overhead() {
                        line.line_type = Some(LineType::Overhead);
                    } else if wire_spec.is_underground() {
                        line.line_type = Some(LineType::Underground);
                    }
                    line.wires.push(wire_from_catalog(
                        wire_spec,
                        phase,
                        geometry.x_m,
                        geometry.height_m,
                    ));
                }
            }
            None => bad_lines.push(line.name.clone()),
        }
        model.add(line)?;
    }

    if !bad_lines.is_empty() {
        for name in &bad_lines {
            diagnostics.add_error_with_entity("line", "line has no electrical_catalog_name", name);
        }
        bail!(GridError::MalformedInput(format!(
            "Wires missing for some lines: {}",
            bad_lines.join(", ")
        )));
    }
    Ok(())
}

/// Adds transformers; returns the distinct primary voltages seen.
fn add_transformers(
    model: &mut Model,
    features: &FeatureCollection,
    index: &FeatureIndex,
    catalog: &EquipmentCatalog,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Volts>> {
    let mut source_voltages: Vec<Volts> = Vec::new();
    for feature in features.of_system_type(TRANSFORMER) {
        let id = feature.require_str("id")?;
        let Some(junctions) = index.systems.get(&id) else {
            note(
                diagnostics,
                "transformer",
                format!("No from and to elements found for transformer {id}"),
            );
            continue;
        };
        match junctions.len() {
            0 | 1 => {
                note(
                    diagnostics,
                    "transformer",
                    format!("No from and to elements found for transformer {id}"),
                );
                continue;
            }
            2 => {}
            n => note(
                diagnostics,
                "transformer",
                format!(
                    "the transformer {id} should have a from and to element - {n} junctions on the transformer"
                ),
            ),
        }

        let catalog_name = feature.require_str("electrical_catalog_name")?;
        let spec = catalog.transformer(&catalog_name).ok_or_else(|| {
            GridError::MalformedInput(format!(
                "No transformer found in catalog for {catalog_name}"
            ))
        })?;
        let transformer = transformer_from_catalog(
            &id,
            index.node_name(&junctions[0]),
            index.node_name(&junctions[1]),
            spec,
            feature,
        )?;
        model.add(transformer)?;

        let primary = Volts(spec.primary_kv * 1000.0);
        if !source_voltages.contains(&primary) {
            source_voltages.push(primary);
        }
    }
    Ok(source_voltages)
}

fn transformer_from_catalog(
    id: &str,
    from: &str,
    to: &str,
    spec: &TransformerSpec,
    feature: &Feature,
) -> Result<PowerTransformer> {
    let connections = spec
        .connection
        .split('-')
        .map(str::parse::<ConnectionType>)
        .collect::<Result<Vec<_>, _>>()?;
    let [high, low] = connections.as_slice() else {
        bail!(GridError::MalformedInput(format!(
            "transformer '{}' has connection '{}', expected '<primary>-<secondary>'",
            spec.name, spec.connection
        )));
    };

    let labels = feature
        .prop("phases")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            GridError::MalformedInput(format!(
                "Transformer {id} does not have phases included in geojson file"
            ))
        })?;
    if labels.len() != spec.phase_count() {
        bail!(GridError::MalformedInput(format!(
            "Phases for transformer {} in database do not match number of phases of transformer {} in geojson file",
            spec.name, id
        )));
    }
    let phases = labels
        .iter()
        .map(|label| {
            label
                .as_str()
                .ok_or_else(|| anyhow!("phase labels of transformer {id} must be strings"))
                .and_then(|s| s.parse::<Phase>().map_err(anyhow::Error::from))
        })
        .collect::<Result<PhaseSet>>()?;

    let rated_power = VoltAmperes::from_kva(spec.kva()?);
    let resistance = spec.resistance_ohm.unwrap_or(0.0);

    let mut primary_voltage = Volts(spec.primary_kv * 1000.0);
    if spec.centertap {
        primary_voltage = primary_voltage / 3f64.sqrt();
    }
    let mut primary = Winding::new(VoltageType::Primary, primary_voltage, phases);
    primary.connection_type = *high;

    let (secondary_phases, secondary_count) = if spec.centertap {
        (PhaseSet::split_phase(), 2)
    } else {
        (phases, 1)
    };
    let mut secondary = Winding::new(
        VoltageType::Secondary,
        Volts(spec.secondary_kv * 1000.0),
        secondary_phases,
    );
    secondary.connection_type = *low;

    let mut transformer = PowerTransformer::new(id, from, to);
    transformer.is_center_tap = spec.centertap;
    transformer.windings = std::iter::once(primary)
        .chain(std::iter::repeat(secondary).take(secondary_count))
        .map(|mut winding| {
            winding.rated_power = rated_power;
            winding.resistance = resistance;
            winding
        })
        .collect();
    transformer.reactances = vec![spec.reactance_pu.unwrap_or(0.0); transformer.windings.len()];
    transformer.validate_windings()?;
    Ok(transformer)
}

fn set_source_voltage(model: &mut Model, voltage: Volts) {
    if let Some(ugrid_core::Element::Node(node)) = model.get_mut(SOURCE_NODE) {
        node.nominal_voltage = Some(voltage);
    }
    if let Some(ugrid_core::Element::PowerSource(source)) = model.get_mut(SOURCE_ELEMENT) {
        source.nominal_voltage = voltage;
    }
    if let Some(feeder) = model.feeder.as_mut() {
        feeder.nominal_voltage = voltage;
    }
}

/// How a service point is fed.
#[derive(Debug, Clone, PartialEq)]
struct Supply {
    voltage: Volts,
    phases: PhaseSet,
    connection: Option<ConnectionType>,
}

impl Supply {
    fn medium_voltage(model: &Model) -> Self {
        Self {
            voltage: model
                .feeder
                .as_ref()
                .map(|f| f.nominal_voltage)
                .unwrap_or(PLACEHOLDER_VOLTAGE),
            phases: PhaseSet::three_phase(),
            connection: None,
        }
    }

    fn from_transformer(tx: &PowerTransformer) -> Self {
        Self {
            voltage: tx
                .secondary()
                .map(|w| w.nominal_voltage)
                .unwrap_or_default(),
            phases: tx.secondary_phases(),
            connection: tx.secondary().map(|w| w.connection_type),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReaderOptions {
    /// Scenario run folder holding `<building>/feature_reports/`
    pub load_folder: PathBuf,
    pub use_reopt: bool,
    /// Where to write profile CSVs; profiles are not attached when unset
    pub profiles: Option<ProfileWriter>,
}

#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub model: Model,
    /// Junctions removed by the repair stage -> junction kept
    pub substitutions: SubstitutionMap,
    pub diagnostics: Diagnostics,
    /// Building id -> junction the building's load hangs off
    pub building_junctions: BTreeMap<String, String>,
}

/// Repair the network and add building loads and PV.
///
/// Returns the substitutions made by the repair and the building -> junction
/// map of every load added.
pub fn attach_buildings(
    model: &mut Model,
    features: &FeatureCollection,
    options: &ReaderOptions,
    diagnostics: &mut Diagnostics,
) -> Result<(SubstitutionMap, BTreeMap<String, String>)> {
    if !model.contains(SOURCE_ELEMENT) {
        bail!(GridError::NoSubstation);
    }

    let mut graph = NetworkGraph::build(model, SOURCE_ELEMENT)?;
    let mut substitutions = SubstitutionMap::new();
    if graph.component_count() > 1 {
        info!(
            "{} connected components, stitching onto {}",
            graph.component_count(),
            SOURCE_NODE
        );
        let outcome = repair(model, SOURCE_ELEMENT)?;
        graph = outcome.graph;
        substitutions = outcome.substitutions;
    }
    let attached = add_buildings(model, features, &graph, &substitutions, options, diagnostics)?;
    Ok((substitutions, attached))
}

/// Add a load (and PV) per building, supplied from the nearest transformer
/// upstream of its junction in `graph`.
///
/// Junctions with no path to the source are reported together as
/// connection problems.
fn add_buildings(
    model: &mut Model,
    features: &FeatureCollection,
    graph: &NetworkGraph,
    substitutions: &SubstitutionMap,
    options: &ReaderOptions,
    diagnostics: &mut Diagnostics,
) -> Result<BTreeMap<String, String>> {
    let index = FeatureIndex::new(features);
    let upstream = UpstreamIndex::build(graph);

    let mut attached = BTreeMap::new();
    let mut disconnected = Vec::new();
    for building in features.of_type(BUILDING) {
        let Some(id) = building.id() else { continue };
        let Some(junction) = index.building_junctions.get(&id) else {
            note(
                diagnostics,
                "load",
                format!("{id} missing from building object. Skipping..."),
            );
            continue;
        };
        let junction = substitutions.resolve(index.node_name(junction))?.to_string();
        if !model.contains(&junction) {
            note(
                diagnostics,
                "load",
                format!("junction {junction} of building {id} is not in the model. Skipping..."),
            );
            continue;
        }

        let transformer = match upstream.get_upstream_transformer(&junction) {
            Ok(tx) => tx.and_then(|name| model.transformer(name)),
            Err(_) => {
                disconnected.push(id.clone());
                None
            }
        };
        let supply = match transformer {
            Some(tx) => Supply::from_transformer(tx),
            None => {
                note(
                    diagnostics,
                    "load",
                    format!("Load {id} has no transformer. Assigning as MV load"),
                );
                Supply::medium_voltage(model)
            }
        };

        let load = building_load(&id, &junction, &supply, options, diagnostics)?;
        model.add(load)?;
        attached.insert(id.clone(), junction.clone());

        if options.use_reopt {
            if let Some(pv) = building_pv(&id, &junction, &supply, options, diagnostics)? {
                model.add(pv)?;
            }
        }
    }

    if !disconnected.is_empty() {
        note(
            diagnostics,
            "load",
            format!(
                "The following loads have connection problems: {}",
                disconnected.join(",")
            ),
        );
    }
    Ok(attached)
}

fn building_load(
    id: &str,
    junction: &str,
    supply: &Supply,
    options: &ReaderOptions,
    diagnostics: &mut Diagnostics,
) -> Result<Load> {
    let mut load = Load::new(id, junction);
    load.nominal_voltage = Some(supply.voltage);

    if !feature_reports_dir(&options.load_folder, id).exists() {
        note(diagnostics, "load", format!("Load information missing for {id}"));
        return Ok(load.with_demand(supply.phases, Watts(0.0), Default::default()));
    }

    let profile = Profile::read_load(&options.load_folder, id, options.use_reopt)?;
    let p = Watts(profile.peak() * profile.multiplier);
    load = load.with_demand(supply.phases, p, p.reactive_at(POWER_FACTOR));
    if let Some(writer) = &options.profiles {
        load.timeseries = Some(writer.write_load(id, &profile)?);
    }
    Ok(load)
}

fn building_pv(
    id: &str,
    junction: &str,
    supply: &Supply,
    options: &ReaderOptions,
    diagnostics: &mut Diagnostics,
) -> Result<Option<Photovoltaic>> {
    let capacity_kw = match read_pv_capacity_kw(&options.load_folder, id) {
        Ok(kw) => kw,
        Err(err) => {
            note(diagnostics, "pv", format!("no PV summary for {id}: {err:#}"));
            return Ok(None);
        }
    };
    if capacity_kw <= 0.0 {
        return Ok(None);
    }

    let mut pv = Photovoltaic::new(format!("solar_{id}"), junction, capacity_kw);
    pv.nominal_voltage = Some(supply.voltage);
    pv.connection_type = supply.connection;
    pv.phases = supply.phases;
    if let Some(writer) = &options.profiles {
        let profile = Profile::read_pv(&options.load_folder, id)?;
        pv.timeseries = Some(writer.write_pv(id, &profile, capacity_kw)?);
    }
    Ok(Some(pv))
}

/// Read a feature file into a complete, single-component model.
pub fn read_urbanopt(
    geojson: &Path,
    catalog: &EquipmentCatalog,
    options: &ReaderOptions,
) -> Result<ReadOutcome> {
    let features = FeatureCollection::load(geojson)?;
    let mut diagnostics = Diagnostics::new();
    let mut model = build_network(&features, catalog, &mut diagnostics)?;
    let (substitutions, building_junctions) =
        attach_buildings(&mut model, &features, options, &mut diagnostics)?;
    info!("model read: {}", model.stats());
    Ok(ReadOutcome {
        model,
        substitutions,
        diagnostics,
        building_junctions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> EquipmentCatalog {
        EquipmentCatalog::from_value(&json!({
            "WIRES": {"WIRES CATALOG": [
                {"nameclass": "AL 1/0", "ampacity (A)": 200, "gmr (mm)": 4.0,
                 "diameter (mm)": 9.0, "resistance (ohm/km)": 0.6, "type": "OH"}
            ]},
            "LINES": [{"Zone": [
                {"Name": "3P_OH", "Line geometry": [
                    {"wire": "AL 1/0", "phase": "A", "x (m)": 0, "height (m)": 9},
                    {"wire": "AL 1/0", "phase": "B", "x (m)": 0.5, "height (m)": 9},
                    {"wire": "AL 1/0", "phase": "C", "x (m)": 1.0, "height (m)": 9}
                ]}
            ]}],
            "SUBSTATIONS AND DISTRIBUTION TRANSFORMERS": [{"Zone": [
                {"Name": "T_3P", "Installed Power(kVA)": 100, "Primary Voltage (kV)": 13.2,
                 "Secondary Voltage (kV)": 0.48, "Nphases": 3, "Centertap": false,
                 "connection": "Delta-Wye", "Reactance (p.u. transf)": 0.05,
                 "Low-voltage-side short-circuit resistance (ohms)": 0.004},
                {"Name": "T_CT", "Installed Power(kVA)": 50, "Primary Voltage (kV)": 13.2,
                 "Secondary Voltage (kV)": 0.24, "Nphases": 1, "Centertap": true,
                 "connection": "Wye-Wye", "Reactance (p.u. transf)": 0.02,
                 "Low-voltage-side short-circuit resistance (ohms)": 0.01}
            ]}]
        }))
        .unwrap()
    }

    fn junction(id: &str, lon: f64, lat: f64, extra: Value) -> Value {
        let mut props = json!({"id": id, "type": "ElectricalJunction"});
        if let (Some(p), Some(e)) = (props.as_object_mut(), extra.as_object()) {
            p.extend(e.clone());
        }
        json!({"properties": props, "geometry": {"type": "Point", "coordinates": [lon, lat]}})
    }

    fn features(transformer_phases: Value) -> FeatureCollection {
        serde_json::from_value(json!({"features": [
            {"properties": {"id": "sub", "district_system_type": "Electrical Substation"}},
            junction("j_sub", -105.0, 40.0, json!({"DSId": "sub"})),
            junction("j_hv", -105.001, 40.0, json!({"DSId": "t1"})),
            junction("j_lv", -105.001, 40.0, json!({"DSId": "t1"})),
            junction("j_b1", -105.002, 40.0, json!({"buildingId": "b1"})),
            {"properties": {"id": "l1", "type": "ElectricalConnector",
                "startJunctionId": "j_sub", "endJunctionId": "j_hv",
                "total_length": 100.0, "electrical_catalog_name": "3P_OH"}},
            {"properties": {"id": "l2", "type": "ElectricalConnector",
                "startJunctionId": "j_lv", "endJunctionId": "j_b1",
                "total_length": 50.0, "electrical_catalog_name": "3P_OH"}},
            {"properties": {"id": "t1", "district_system_type": "Transformer",
                "electrical_catalog_name": "T_3P", "phases": transformer_phases}},
            {"properties": {"id": "b1", "type": "Building"}}
        ]}))
        .unwrap()
    }

    #[test]
    fn test_network_from_features() {
        let mut diagnostics = Diagnostics::new();
        let model = build_network(&features(json!(["A", "B", "C"])), &catalog(), &mut diagnostics)
            .unwrap();

        let source = model.node(SOURCE_NODE).unwrap();
        assert!(source.is_substation_connection);
        assert_eq!(source.nominal_voltage, Some(Volts(13200.0)));
        assert_eq!(source.position().unwrap().lat, 40.0);
        assert_eq!(source.position().unwrap().long, -105.0);

        let l1 = model.line("l1").unwrap();
        assert_eq!(l1.from_element, SOURCE_NODE);
        assert!((l1.length_m - 30.48).abs() < 1e-9);
        assert_eq!(l1.phases(), PhaseSet::three_phase());
        assert_eq!(l1.wires[0].nameclass, "AL_1-0");
        assert_eq!(l1.wires[0].gmr_m, 0.004);
        assert_eq!(l1.line_type, Some(LineType::Overhead));

        let t1 = model.transformer("t1").unwrap();
        assert_eq!((t1.from_element.as_str(), t1.to_element.as_str()), ("j_hv", "j_lv"));
        assert_eq!(t1.rated_power().kva(), 100.0);
        assert_eq!(t1.primary().unwrap().connection_type, ConnectionType::Delta);
        assert_eq!(t1.secondary().unwrap().nominal_voltage, Volts(480.0));
        assert!(!diagnostics.has_issues());
    }

    #[test]
    fn test_phase_count_mismatch_is_fatal() {
        let err = build_network(&features(json!(["A", "B"])), &catalog(), &mut Diagnostics::new())
            .unwrap_err();
        assert!(err.to_string().contains("do not match number of phases"));
    }

    #[test]
    fn test_missing_phases_is_fatal() {
        let err = build_network(&features(Value::Null), &catalog(), &mut Diagnostics::new())
            .unwrap_err();
        assert!(err.to_string().contains("does not have phases"));
    }

    #[test]
    fn test_line_without_catalog_name_is_collected() {
        let mut features = features(json!(["A", "B", "C"]));
        for feature in &mut features.features {
            feature.properties.remove("electrical_catalog_name");
        }
        let err = build_network(&features, &catalog(), &mut Diagnostics::new()).unwrap_err();
        assert!(err.to_string().contains("Wires missing for some lines"));
        assert!(err.to_string().contains("l1, l2"));
    }

    #[test]
    fn test_center_tap_windings() {
        let feature: Feature = serde_json::from_value(json!({
            "properties": {"id": "t_ct", "phases": ["A"]}
        }))
        .unwrap();
        let catalog = catalog();
        let spec = catalog.transformer("T_CT").unwrap();
        let tx = transformer_from_catalog("t_ct", "a", "b", spec, &feature).unwrap();
        assert_eq!(tx.windings.len(), 3);
        assert_eq!(tx.reactances, vec![0.02; 3]);
        assert_eq!(tx.secondary_phases(), PhaseSet::split_phase());
        let primary = tx.primary().unwrap().nominal_voltage.value();
        assert!((primary - 13200.0 / 3f64.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_building_inherits_transformer_secondary() {
        let features = features(json!(["A", "B", "C"]));
        let mut diagnostics = Diagnostics::new();
        let mut model = build_network(&features, &catalog(), &mut diagnostics).unwrap();
        let options = ReaderOptions::default();
        let (subs, attached) =
            attach_buildings(&mut model, &features, &options, &mut diagnostics).unwrap();

        assert!(subs.is_empty());
        assert_eq!(attached.get("b1").map(String::as_str), Some("j_b1"));
        let load = model.loads().next().unwrap();
        assert_eq!(load.nominal_voltage, Some(Volts(480.0)));
        assert_eq!(load.phases(), PhaseSet::three_phase());
        assert!(diagnostics
            .warnings()
            .any(|w| w.message.contains("Load information missing for b1")));
    }

    /// Substation feeding building junctions directly, plus an unconnected one.
    fn medium_voltage_features() -> FeatureCollection {
        serde_json::from_value(json!({"features": [
            {"properties": {"id": "sub", "district_system_type": "Electrical Substation"}},
            junction("j_sub", -105.0, 40.0, json!({"DSId": "sub"})),
            junction("j_b1", -105.002, 40.0, json!({"buildingId": "b1"})),
            junction("j_far", -105.1, 40.1, json!({"buildingId": "b2"})),
            {"properties": {"id": "l1", "type": "ElectricalConnector",
                "startJunctionId": "j_sub", "endJunctionId": "j_b1",
                "total_length": 100.0, "electrical_catalog_name": "3P_OH"}},
            {"properties": {"id": "b1", "type": "Building"}},
            {"properties": {"id": "b2", "type": "Building"}}
        ]}))
        .unwrap()
    }

    #[test]
    fn test_building_without_transformer_is_mv_load() {
        let features = medium_voltage_features();
        let mut diagnostics = Diagnostics::new();
        let mut model = build_network(&features, &catalog(), &mut diagnostics).unwrap();
        let (subs, attached) =
            attach_buildings(&mut model, &features, &ReaderOptions::default(), &mut diagnostics)
                .unwrap();

        assert_eq!(subs.get("j_far"), Some("j_b1"));
        assert_eq!(attached.get("b2").map(String::as_str), Some("j_b1"));
        let feeder_voltage = model.feeder.as_ref().unwrap().nominal_voltage;
        assert_eq!(feeder_voltage, PLACEHOLDER_VOLTAGE);
        for load in model.loads() {
            assert_eq!(load.nominal_voltage, Some(feeder_voltage));
            assert_eq!(load.phases(), PhaseSet::three_phase());
        }
        assert_eq!(model.loads().count(), 2);
        assert!(diagnostics
            .warnings()
            .any(|w| w.message == "Load b1 has no transformer. Assigning as MV load"));
        assert!(!diagnostics
            .warnings()
            .any(|w| w.message.contains("connection problems")));
    }

    #[test]
    fn test_unreachable_building_is_reported() {
        let features = medium_voltage_features();
        let mut diagnostics = Diagnostics::new();
        let mut model = build_network(&features, &catalog(), &mut diagnostics).unwrap();
        let graph = NetworkGraph::build(&model, SOURCE_ELEMENT).unwrap();
        assert_eq!(graph.component_count(), 2);

        let attached = add_buildings(
            &mut model,
            &features,
            &graph,
            &SubstitutionMap::new(),
            &ReaderOptions::default(),
            &mut diagnostics,
        )
        .unwrap();

        assert_eq!(attached.get("b2").map(String::as_str), Some("j_far"));
        assert!(diagnostics
            .warnings()
            .any(|w| w.message == "The following loads have connection problems: b2"));
        assert!(diagnostics
            .warnings()
            .any(|w| w.message == "Load b2 has no transformer. Assigning as MV load"));
    }

    #[test]
    fn test_buildings_need_a_substation() {
        let mut model = Model::new();
        model.add(Node::new("n1")).unwrap();
        let err = attach_buildings(
            &mut model,
            &FeatureCollection::default(),
            &ReaderOptions::default(),
            &mut Diagnostics::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GridError>(),
            Some(GridError::NoSubstation)
        ));
    }
}
