//! Circuit elements.
//!
//! Elements refer to each other by name (`from_element`, `to_element`,
//! `connecting_element`). The [`Model`](crate::Model) owns them in an
//! insertion-ordered name index so those references can be retargeted
//! without touching anything but strings.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{GridError, GridResult};
use crate::phase::{Phase, PhaseSet};
use crate::units::{PerUnit, VoltAmperes, Vars, Volts, Watts};

/// Geographic position of a junction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub long: f64,
}

impl Position {
    pub fn new(lat: f64, long: f64) -> Self {
        Self { lat, long }
    }

    /// Euclidean distance with lat/long treated as planar coordinates.
    pub fn planar_distance(&self, other: &Position) -> f64 {
        ((self.lat - other.lat).powi(2) + (self.long - other.long).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub nominal_voltage: Option<Volts>,
    pub positions: Vec<Position>,
    pub is_substation_connection: bool,
    pub setpoint: Option<PerUnit>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_position(mut self, lat: f64, long: f64) -> Self {
        self.positions.push(Position::new(lat, long));
        self
    }

    /// First recorded position, used by the nearest-neighbour stitching.
    pub fn position(&self) -> Option<Position> {
        self.positions.first().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineType {
    Overhead,
    Underground,
}

/// Concentric-neutral data of an underground cable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcentricNeutral {
    pub gmr_m: f64,
    pub resistance_ohm_per_m: f64,
    pub diameter_m: f64,
    pub outside_diameter_m: f64,
    pub strand_count: u32,
    pub insulation_thickness_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wire {
    pub nameclass: String,
    pub phase: Phase,
    pub ampacity_a: f64,
    pub resistance_ohm_per_m: f64,
    pub gmr_m: f64,
    pub diameter_m: f64,
    /// Horizontal offset in the line geometry
    pub x_m: f64,
    pub height_m: f64,
    pub concentric_neutral: Option<ConcentricNeutral>,
}

impl Default for Wire {
    fn default() -> Self {
        Self {
            nameclass: String::new(),
            phase: Phase::A,
            ampacity_a: 0.0,
            resistance_ohm_per_m: 0.0,
            gmr_m: 0.0,
            diameter_m: 0.0,
            x_m: 0.0,
            height_m: 0.0,
            concentric_neutral: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub name: String,
    pub from_element: String,
    pub to_element: String,
    pub length_m: f64,
    pub line_type: Option<LineType>,
    pub wires: Vec<Wire>,
}

impl Line {
    pub fn new(
        name: impl Into<String>,
        from_element: impl Into<String>,
        to_element: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            from_element: from_element.into(),
            to_element: to_element.into(),
            ..Self::default()
        }
    }

    /// Add one default conductor per phase.
    pub fn with_phases(mut self, phases: PhaseSet) -> Self {
        self.set_phases(phases);
        self
    }

    pub fn phases(&self) -> PhaseSet {
        self.wires.iter().map(|w| w.phase).collect()
    }

    /// Rewrite the phase conductors to exactly `phases`.
    ///
    /// Existing conductors keep their data; added phases copy the first
    /// phase conductor. Neutral conductors are kept at the end.
    pub fn set_phases(&mut self, phases: PhaseSet) {
        let template = self
            .wires
            .iter()
            .find(|w| !w.phase.is_neutral())
            .cloned()
            .unwrap_or_default();
        let mut rewired: Vec<Wire> = phases
            .iter()
            .map(|phase| {
                self.wires
                    .iter()
                    .find(|w| w.phase == phase)
                    .cloned()
                    .unwrap_or_else(|| Wire {
                        phase,
                        ..template.clone()
                    })
            })
            .collect();
        rewired.extend(self.wires.iter().filter(|w| w.phase.is_neutral()).cloned());
        self.wires = rewired;
    }

    /// Normal current rating: the weakest phase conductor.
    pub fn normal_amps(&self) -> Option<f64> {
        self.wires
            .iter()
            .filter(|w| !w.phase.is_neutral() && w.ampacity_a > 0.0)
            .map(|w| w.ampacity_a)
            .reduce(f64::min)
    }

    /// Series resistance of one phase conductor over the full length.
    pub fn phase_resistance_ohm(&self) -> f64 {
        self.wires
            .iter()
            .find(|w| !w.phase.is_neutral())
            .map(|w| w.resistance_ohm_per_m * self.length_m)
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionType {
    Delta,
    Wye,
}

impl ConnectionType {
    pub fn code(self) -> &'static str {
        match self {
            ConnectionType::Delta => "D",
            ConnectionType::Wye => "Y",
        }
    }
}

impl FromStr for ConnectionType {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Delta" | "D" | "delta" => Ok(ConnectionType::Delta),
            "Wye" | "Y" | "wye" => Ok(ConnectionType::Wye),
            other => Err(GridError::MalformedInput(format!(
                "unknown winding connection '{other}'"
            ))),
        }
    }
}

/// Which side of the transformer a winding faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoltageType {
    Primary = 0,
    Secondary = 1,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseWinding {
    pub phase: Phase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Winding {
    pub rated_power: VoltAmperes,
    pub nominal_voltage: Volts,
    pub connection_type: ConnectionType,
    pub voltage_type: VoltageType,
    pub resistance: f64,
    pub phase_windings: Vec<PhaseWinding>,
}

impl Winding {
    pub fn new(voltage_type: VoltageType, nominal_voltage: Volts, phases: PhaseSet) -> Self {
        Self {
            rated_power: VoltAmperes(0.0),
            nominal_voltage,
            connection_type: ConnectionType::Wye,
            voltage_type,
            resistance: 0.0,
            phase_windings: phases.iter().map(|phase| PhaseWinding { phase }).collect(),
        }
    }

    pub fn phases(&self) -> PhaseSet {
        self.phase_windings.iter().map(|pw| pw.phase).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerTransformer {
    pub name: String,
    pub from_element: String,
    pub to_element: String,
    pub is_center_tap: bool,
    pub reactances: Vec<f64>,
    pub windings: Vec<Winding>,
}

impl PowerTransformer {
    pub fn new(
        name: impl Into<String>,
        from_element: impl Into<String>,
        to_element: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            from_element: from_element.into(),
            to_element: to_element.into(),
            ..Self::default()
        }
    }

    /// Two-winding transformer with the same rating on both windings.
    pub fn with_windings(
        mut self,
        primary: (Volts, PhaseSet),
        secondary: (Volts, PhaseSet),
        rated_power: VoltAmperes,
    ) -> Self {
        let mut high = Winding::new(VoltageType::Primary, primary.0, primary.1);
        let mut low = Winding::new(VoltageType::Secondary, secondary.0, secondary.1);
        high.rated_power = rated_power;
        low.rated_power = rated_power;
        self.windings = vec![high, low];
        self
    }

    pub fn primary(&self) -> Option<&Winding> {
        self.windings.first()
    }

    pub fn secondary(&self) -> Option<&Winding> {
        self.windings.get(1)
    }

    /// Phases delivered downstream. Center-tap secondaries are split-phase.
    pub fn secondary_phases(&self) -> PhaseSet {
        if self.is_center_tap {
            return PhaseSet::split_phase();
        }
        self.secondary().map(Winding::phases).unwrap_or_default()
    }

    pub fn primary_phases(&self) -> PhaseSet {
        self.primary().map(Winding::phases).unwrap_or_default()
    }

    pub fn rated_power(&self) -> VoltAmperes {
        self.windings
            .iter()
            .map(|w| w.rated_power)
            .fold(VoltAmperes(0.0), VoltAmperes::max)
    }

    pub fn set_rated_power(&mut self, rating: VoltAmperes) {
        for winding in &mut self.windings {
            winding.rated_power = rating;
        }
    }

    /// Center-tap transformers carry three windings, all others two.
    pub fn validate_windings(&self) -> GridResult<()> {
        let expected = if self.is_center_tap { 3 } else { 2 };
        if self.windings.len() != expected {
            return Err(GridError::MalformedInput(format!(
                "transformer '{}' has {} windings, expected {}",
                self.name,
                self.windings.len(),
                expected
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseLoad {
    pub phase: Phase,
    pub p: Watts,
    pub q: Vars,
}

/// Per-unit profile attached to a load or generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeseries {
    pub data_label: String,
    pub interval_hours: f64,
    /// Location of the profile relative to the written circuit files
    pub data_location: Option<String>,
    pub scale_factor: f64,
    pub values: Vec<f64>,
}

impl Timeseries {
    /// Multiplier at a profile index; missing samples count as zero.
    pub fn multiplier(&self, index: usize) -> f64 {
        self.values.get(index).copied().unwrap_or(0.0) * self.scale_factor
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Load {
    pub name: String,
    pub connecting_element: String,
    pub nominal_voltage: Option<Volts>,
    pub phase_loads: Vec<PhaseLoad>,
    pub timeseries: Option<Timeseries>,
}

impl Load {
    pub fn new(name: impl Into<String>, connecting_element: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connecting_element: connecting_element.into(),
            ..Self::default()
        }
    }

    /// Spread an active/reactive demand evenly across `phases`.
    pub fn with_demand(mut self, phases: PhaseSet, p: Watts, q: Vars) -> Self {
        self.phase_loads = split_demand(phases, p, q);
        self
    }

    pub fn phases(&self) -> PhaseSet {
        self.phase_loads.iter().map(|pl| pl.phase).collect()
    }

    pub fn active_power(&self) -> Watts {
        self.phase_loads.iter().map(|pl| pl.p).sum()
    }

    pub fn reactive_power(&self) -> Vars {
        self.phase_loads.iter().map(|pl| pl.q).sum()
    }

    /// Rated demand used for transformer sizing.
    pub fn apparent_power(&self) -> VoltAmperes {
        self.active_power().apparent_power(self.reactive_power())
    }

    /// Re-split the total demand over a new phase set.
    pub fn set_phases(&mut self, phases: PhaseSet) {
        self.phase_loads = split_demand(phases, self.active_power(), self.reactive_power());
    }
}

fn split_demand(phases: PhaseSet, p: Watts, q: Vars) -> Vec<PhaseLoad> {
    let count = phases.len().max(1) as f64;
    phases
        .iter()
        .map(|phase| PhaseLoad {
            phase,
            p: p / count,
            q: q / count,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSource {
    pub name: String,
    pub connecting_element: String,
    pub nominal_voltage: Volts,
    pub per_unit: PerUnit,
    pub is_sourcebus: bool,
}

impl PowerSource {
    pub fn new(
        name: impl Into<String>,
        connecting_element: impl Into<String>,
        nominal_voltage: Volts,
    ) -> Self {
        Self {
            name: name.into(),
            connecting_element: connecting_element.into(),
            nominal_voltage,
            per_unit: PerUnit(1.0),
            is_sourcebus: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Photovoltaic {
    pub name: String,
    pub connecting_element: String,
    pub nominal_voltage: Option<Volts>,
    pub connection_type: Option<ConnectionType>,
    pub phases: PhaseSet,
    pub rated_power: Watts,
    pub active_rating: Watts,
    pub timeseries: Option<Timeseries>,
}

impl Photovoltaic {
    /// PV array with the inverter rated at 110% of the array.
    pub fn new(name: impl Into<String>, connecting_element: impl Into<String>, kw: f64) -> Self {
        Self {
            name: name.into(),
            connecting_element: connecting_element.into(),
            rated_power: Watts::from_kw(kw),
            active_rating: Watts::from_kw(kw) * 1.1,
            ..Self::default()
        }
    }
}

/// Feeder-level metadata (head node and nominal feeder voltage).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeederMetadata {
    pub name: String,
    pub headnode: String,
    pub nominal_voltage: Volts,
}

/// Reference slot an element can use to point at another element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RefSlot {
    From,
    To,
    Connecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ElementKind {
    Node,
    Line,
    Transformer,
    Load,
    PowerSource,
    Photovoltaic,
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ElementKind::Node => "node",
            ElementKind::Line => "line",
            ElementKind::Transformer => "transformer",
            ElementKind::Load => "load",
            ElementKind::PowerSource => "power source",
            ElementKind::Photovoltaic => "photovoltaic",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Element {
    Node(Node),
    Line(Line),
    Transformer(PowerTransformer),
    Load(Load),
    PowerSource(PowerSource),
    Photovoltaic(Photovoltaic),
}

impl Element {
    pub fn name(&self) -> &str {
        match self {
            Element::Node(node) => &node.name,
            Element::Line(line) => &line.name,
            Element::Transformer(tx) => &tx.name,
            Element::Load(load) => &load.name,
            Element::PowerSource(source) => &source.name,
            Element::Photovoltaic(pv) => &pv.name,
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            Element::Node(_) => ElementKind::Node,
            Element::Line(_) => ElementKind::Line,
            Element::Transformer(_) => ElementKind::Transformer,
            Element::Load(_) => ElementKind::Load,
            Element::PowerSource(_) => ElementKind::PowerSource,
            Element::Photovoltaic(_) => ElementKind::Photovoltaic,
        }
    }

    /// Names this element points at, with the slot holding each one.
    pub fn references(&self) -> Vec<(RefSlot, &str)> {
        match self {
            Element::Node(_) => Vec::new(),
            Element::Line(line) => vec![
                (RefSlot::From, line.from_element.as_str()),
                (RefSlot::To, line.to_element.as_str()),
            ],
            Element::Transformer(tx) => vec![
                (RefSlot::From, tx.from_element.as_str()),
                (RefSlot::To, tx.to_element.as_str()),
            ],
            Element::Load(load) => vec![(RefSlot::Connecting, load.connecting_element.as_str())],
            Element::PowerSource(source) => {
                vec![(RefSlot::Connecting, source.connecting_element.as_str())]
            }
            Element::Photovoltaic(pv) => vec![(RefSlot::Connecting, pv.connecting_element.as_str())],
        }
    }

    pub fn reference_mut(&mut self, slot: RefSlot) -> Option<&mut String> {
        match (self, slot) {
            (Element::Line(line), RefSlot::From) => Some(&mut line.from_element),
            (Element::Line(line), RefSlot::To) => Some(&mut line.to_element),
            (Element::Transformer(tx), RefSlot::From) => Some(&mut tx.from_element),
            (Element::Transformer(tx), RefSlot::To) => Some(&mut tx.to_element),
            (Element::Load(load), RefSlot::Connecting) => Some(&mut load.connecting_element),
            (Element::PowerSource(source), RefSlot::Connecting) => {
                Some(&mut source.connecting_element)
            }
            (Element::Photovoltaic(pv), RefSlot::Connecting) => Some(&mut pv.connecting_element),
            _ => None,
        }
    }
}

macro_rules! impl_from_element {
    ($($variant:ident($type:ty)),* $(,)?) => {
        $(
            impl From<$type> for Element {
                fn from(value: $type) -> Self {
                    Element::$variant(value)
                }
            }
        )*
    };
}

impl_from_element!(
    Node(Node),
    Line(Line),
    Transformer(PowerTransformer),
    Load(Load),
    PowerSource(PowerSource),
    Photovoltaic(Photovoltaic),
);
