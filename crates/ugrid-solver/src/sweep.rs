//! # Reference radial power flow
//!
//! [`RadialSweepSession`] is a [`CircuitSession`] that solves the circuit
//! directly from the [`Model`] with a backward/forward sweep. It needs no
//! external engine, which makes it the session used by tests and by runs
//! where OpenDSS is not installed.
//!
//! ## Network Reduction
//!
//! Each branch is reduced to a positive-sequence series impedance in per unit
//! of a common 1 MVA base:
//!
//! ```text
//!   line         z = r·l + j·ω·2e-7·ln(Deq / GMR)·l     (ohm, over Zbase = V² / Sbase)
//!   transformer  z = Σ R_w / (V_w² / S_rated) + j·x      (pu on own rating, × Sbase / S_rated)
//! ```
//!
//! `Deq` is the geometric mean spacing of the phase conductors. Transformers
//! are ideal in per unit apart from their series impedance, so the voltage
//! base steps by the winding ratio across them.
//!
//! ## Sweep
//!
//! ```text
//!   repeat until max |ΔV| < tolerance:
//!     backward:  I_bus = conj(S_bus / V_bus)
//!                J_branch = I_child + Σ J of branches below child
//!     forward:   V_child = V_parent - z · J_branch
//! ```
//!
//! Buses are ordered breadth-first from the source so both passes are single
//! loops. Meshed branches (already-visited far ends) are left out of the tree.
//!
//! ## Limitations
//!
//! The sweep is a balanced single-phase equivalent: every phase of a branch
//! reports the same current and every bus one voltage magnitude.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::f64::consts::PI;

use num_complex::Complex64;
use tracing::{debug, warn};
use ugrid_core::{GridError, GridResult, Line, Model, PowerTransformer, Timeseries};

use crate::session::{
    BranchReading, CircuitDescription, CircuitSession, SolveRequest, TransformerReading,
};

/// System power base (VA)
pub const BASE_VA: f64 = 1.0e6;
pub const FREQUENCY_HZ: f64 = 60.0;
/// μ0 / 2π (H/m)
const MU0_OVER_2PI: f64 = 2.0e-7;
/// Spacing assumed when fewer than two phase conductors are placed (m)
const DEFAULT_SPACING_M: f64 = 1.0;
pub const TOLERANCE: f64 = 1.0e-6;
pub const MAX_ITERATIONS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BranchKind {
    Line,
    Transformer,
}

#[derive(Debug, Clone)]
struct Bus {
    name: String,
    /// Line-to-line voltage base (V)
    base_volts: f64,
    /// Bus one step nearer the source; `None` for the source bus
    parent: Option<usize>,
}

#[derive(Debug, Clone)]
struct Branch {
    name: String,
    kind: BranchKind,
    /// Bus nearer the source
    upstream: usize,
    downstream: usize,
    z_pu: Complex64,
    phases: usize,
    normal_amps: f64,
    rated_kva: f64,
    rated_kv: f64,
}

#[derive(Debug, Clone)]
struct Circuit {
    buses: Vec<Bus>,
    /// Tree branches, indexed by downstream bus
    branches: Vec<Branch>,
    by_downstream: HashMap<usize, usize>,
    lines: BTreeMap<String, usize>,
    transformers: BTreeMap<String, usize>,
    /// Per-unit constant demand per bus at multiplier 1
    loads: Vec<Vec<(Complex64, Option<Timeseries>)>>,
    generation: Vec<Vec<(Complex64, Option<Timeseries>)>>,
    source_pu: f64,
}

#[derive(Debug, Clone)]
struct Solution {
    voltages: Vec<Complex64>,
    /// Per-unit current into each bus's incoming branch
    branch_currents: Vec<Complex64>,
}

/// Backward/forward sweep over the model's radial tree.
#[derive(Debug)]
pub struct RadialSweepSession {
    circuit: Option<Circuit>,
    solution: Option<Solution>,
    tolerance: f64,
    max_iterations: usize,
}

impl RadialSweepSession {
    pub fn new() -> Self {
        Self {
            circuit: None,
            solution: None,
            tolerance: TOLERANCE,
            max_iterations: MAX_ITERATIONS,
        }
    }

    fn circuit(&self) -> GridResult<&Circuit> {
        self.circuit
            .as_ref()
            .ok_or_else(|| GridError::Solver("no circuit loaded".into()))
    }

    fn solution(&self) -> GridResult<(&Circuit, &Solution)> {
        let circuit = self.circuit()?;
        let solution = self
            .solution
            .as_ref()
            .ok_or_else(|| GridError::Solver("circuit has not been solved".into()))?;
        Ok((circuit, solution))
    }

    fn branch_amps(circuit: &Circuit, solution: &Solution, branch: &Branch) -> f64 {
        let base_volts = circuit.buses[branch.upstream].base_volts;
        if base_volts <= 0.0 {
            return 0.0;
        }
        let base_amps = if branch.phases > 1 {
            BASE_VA / (3f64.sqrt() * base_volts)
        } else {
            BASE_VA / base_volts
        };
        solution.branch_currents[branch.downstream].norm() * base_amps
    }
}

impl Default for RadialSweepSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitSession for RadialSweepSession {
    fn name(&self) -> &'static str {
        "radial-sweep"
    }

    fn clear(&mut self) {
        self.circuit = None;
        self.solution = None;
    }

    fn load(&mut self, description: &CircuitDescription<'_>) -> GridResult<()> {
        let circuit = build_circuit(description.model)?;
        debug!(
            buses = circuit.buses.len(),
            branches = circuit.branches.len(),
            "radial circuit loaded"
        );
        self.circuit = Some(circuit);
        self.solution = None;
        Ok(())
    }

    fn solve(&mut self, request: &SolveRequest) -> GridResult<Option<String>> {
        let circuit = self.circuit()?;
        let n = circuit.buses.len();
        let demand: Vec<Complex64> = (0..n)
            .map(|bus| {
                let load: Complex64 = circuit.loads[bus]
                    .iter()
                    .map(|(s, ts)| *s * shape_multiplier(ts.as_ref(), request.index))
                    .sum();
                let generation: Complex64 = circuit.generation[bus]
                    .iter()
                    .map(|(s, ts)| *s * shape_multiplier(ts.as_ref(), request.index))
                    .sum();
                load - generation
            })
            .collect();

        let source = Complex64::new(circuit.source_pu, 0.0);
        let mut voltages = vec![source; n];
        let mut currents = vec![Complex64::new(0.0, 0.0); n];
        let mut converged = false;
        let mut iterations = 0;

        while iterations < self.max_iterations {
            iterations += 1;
            for (bus, s) in demand.iter().enumerate() {
                currents[bus] = if voltages[bus].norm() > 0.0 {
                    (*s / voltages[bus]).conj()
                } else {
                    Complex64::new(0.0, 0.0)
                };
            }
            // children always sit after their parent in BFS order
            for bus in (1..n).rev() {
                if let Some(parent) = circuit.buses[bus].parent {
                    let carried = currents[bus];
                    currents[parent] += carried;
                }
            }

            let mut delta: f64 = 0.0;
            for bus in 1..n {
                let Some(&branch) = circuit.by_downstream.get(&bus) else {
                    continue;
                };
                let branch = &circuit.branches[branch];
                let updated = voltages[branch.upstream] - branch.z_pu * currents[bus];
                delta = delta.max((updated - voltages[bus]).norm());
                voltages[bus] = updated;
            }

            if !delta.is_finite() {
                break;
            }
            if delta < self.tolerance {
                converged = true;
                break;
            }
        }

        let finite = voltages.iter().all(|v| v.re.is_finite() && v.im.is_finite());
        self.solution = Some(Solution {
            voltages,
            branch_currents: currents,
        });

        if !finite {
            return Ok(Some(format!(
                "sweep diverged at step {} (hour {}, {} s)",
                request.index, request.hour, request.seconds
            )));
        }
        if !converged {
            return Ok(Some(format!(
                "sweep did not converge in {} iterations at step {}",
                iterations, request.index
            )));
        }
        debug!(iterations, index = request.index, "sweep converged");
        Ok(None)
    }

    fn bus_voltages(&self) -> GridResult<BTreeMap<String, f64>> {
        let (circuit, solution) = self.solution()?;
        Ok(circuit
            .buses
            .iter()
            .zip(&solution.voltages)
            .map(|(bus, v)| (bus.name.clone(), v.norm()))
            .collect())
    }

    fn line_names(&self) -> Vec<String> {
        self.circuit
            .as_ref()
            .map(|c| c.lines.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn line_currents(&self, line: &str) -> GridResult<BranchReading> {
        let (circuit, solution) = self.solution()?;
        let branch = circuit
            .lines
            .get(line)
            .map(|&i| &circuit.branches[i])
            .ok_or_else(|| GridError::UnknownElement(line.to_string()))?;
        let amps = Self::branch_amps(circuit, solution, branch);
        Ok(BranchReading {
            currents: vec![amps; branch.phases.max(1)],
            normal_amps: branch.normal_amps,
        })
    }

    fn transformer_names(&self) -> Vec<String> {
        self.circuit
            .as_ref()
            .map(|c| c.transformers.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn transformer_currents(&self, transformer: &str) -> GridResult<TransformerReading> {
        let (circuit, solution) = self.solution()?;
        let branch = circuit
            .transformers
            .get(transformer)
            .map(|&i| &circuit.branches[i])
            .ok_or_else(|| GridError::UnknownElement(transformer.to_string()))?;
        let amps = Self::branch_amps(circuit, solution, branch);
        Ok(TransformerReading {
            currents: vec![amps; branch.phases.max(1)],
            rated_kva: branch.rated_kva,
            rated_kv: branch.rated_kv,
            phases: branch.phases,
        })
    }
}

fn shape_multiplier(shape: Option<&Timeseries>, index: usize) -> f64 {
    shape.map_or(1.0, |ts| ts.multiplier(index))
}

enum Edge<'a> {
    Line(&'a Line),
    Transformer(&'a PowerTransformer),
}

impl Edge<'_> {
    fn ends(&self) -> (&str, &str) {
        match self {
            Edge::Line(l) => (&l.from_element, &l.to_element),
            Edge::Transformer(t) => (&t.from_element, &t.to_element),
        }
    }
}

fn build_circuit(model: &Model) -> GridResult<Circuit> {
    let source = model
        .power_sources()
        .find(|ps| ps.is_sourcebus)
        .or_else(|| model.power_sources().next())
        .ok_or(GridError::NoSubstation)?;

    let edges: Vec<Edge<'_>> = model
        .lines()
        .map(Edge::Line)
        .chain(model.transformers().map(Edge::Transformer))
        .collect();
    let mut adjacency: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, edge) in edges.iter().enumerate() {
        let (a, b) = edge.ends();
        adjacency.entry(a).or_default().push(i);
        adjacency.entry(b).or_default().push(i);
    }

    let mut buses = vec![Bus {
        name: source.connecting_element.clone(),
        base_volts: source.nominal_voltage.value(),
        parent: None,
    }];
    let mut index: HashMap<&str, usize> = HashMap::new();
    index.insert(source.connecting_element.as_str(), 0);
    let mut branches = Vec::new();
    let mut by_downstream = HashMap::new();
    let mut used = vec![false; edges.len()];
    let mut queue = VecDeque::from([source.connecting_element.as_str()]);

    while let Some(current) = queue.pop_front() {
        let upstream = index[current];
        for &e in adjacency.get(current).map(Vec::as_slice).unwrap_or_default() {
            if used[e] {
                continue;
            }
            used[e] = true;
            let (a, b) = edges[e].ends();
            let (far, forward) = if a == current { (b, true) } else { (a, false) };
            if index.contains_key(far) {
                debug!(bus = far, "meshed branch left out of the radial tree");
                continue;
            }
            let parent_volts = buses[upstream].base_volts;
            let downstream = buses.len();
            let (branch, base_volts) = match &edges[e] {
                Edge::Line(line) => (
                    line_branch(line, upstream, downstream, parent_volts),
                    parent_volts,
                ),
                Edge::Transformer(tx) => {
                    transformer_branch(tx, upstream, downstream, parent_volts, forward)
                }
            };
            buses.push(Bus {
                name: far.to_string(),
                base_volts,
                parent: Some(upstream),
            });
            index.insert(far, downstream);
            by_downstream.insert(downstream, branches.len());
            branches.push(branch);
            queue.push_back(far);
        }
    }

    let mut lines = BTreeMap::new();
    let mut transformers = BTreeMap::new();
    for (i, branch) in branches.iter().enumerate() {
        match branch.kind {
            BranchKind::Line => lines.insert(branch.name.clone(), i),
            BranchKind::Transformer => transformers.insert(branch.name.clone(), i),
        };
    }

    let mut loads = vec![Vec::new(); buses.len()];
    let mut generation = vec![Vec::new(); buses.len()];
    let mut unreached = 0usize;
    for load in model.loads() {
        match index.get(load.connecting_element.as_str()) {
            Some(&bus) => loads[bus].push((
                Complex64::new(load.active_power().value(), load.reactive_power().value())
                    / BASE_VA,
                load.timeseries.clone(),
            )),
            None => unreached += 1,
        }
    }
    for pv in model.photovoltaics() {
        match index.get(pv.connecting_element.as_str()) {
            Some(&bus) => generation[bus].push((
                Complex64::new(pv.rated_power.value() / BASE_VA, 0.0),
                pv.timeseries.clone(),
            )),
            None => unreached += 1,
        }
    }
    if unreached > 0 {
        warn!(unreached, "injections not reachable from the source are ignored");
    }

    Ok(Circuit {
        buses,
        branches,
        by_downstream,
        lines,
        transformers,
        loads,
        generation,
        source_pu: source.per_unit.value(),
    })
}

fn line_branch(line: &Line, upstream: usize, downstream: usize, base_volts: f64) -> Branch {
    let r = line.phase_resistance_ohm();
    let x = line_reactance_ohm(line);
    let z_base = base_volts * base_volts / BASE_VA;
    let z_pu = if z_base > 0.0 {
        Complex64::new(r, x) / z_base
    } else {
        Complex64::new(0.0, 0.0)
    };
    Branch {
        name: line.name.clone(),
        kind: BranchKind::Line,
        upstream,
        downstream,
        z_pu,
        phases: line.phases().len(),
        normal_amps: line.normal_amps().unwrap_or(0.0),
        rated_kva: 0.0,
        rated_kv: 0.0,
    }
}

/// Series reactance from conductor geometry.
fn line_reactance_ohm(line: &Line) -> f64 {
    let phase_wires: Vec<_> = line.wires.iter().filter(|w| !w.phase.is_neutral()).collect();
    let Some(gmr) = phase_wires.first().map(|w| w.gmr_m).filter(|g| *g > 0.0) else {
        return 0.0;
    };
    let mut log_sum = 0.0;
    let mut pairs = 0usize;
    for (i, a) in phase_wires.iter().enumerate() {
        for b in &phase_wires[i + 1..] {
            let d = (a.x_m - b.x_m).hypot(a.height_m - b.height_m);
            if d > 0.0 {
                log_sum += d.ln();
                pairs += 1;
            }
        }
    }
    let deq = if pairs == 0 {
        DEFAULT_SPACING_M
    } else {
        (log_sum / pairs as f64).exp()
    };
    let per_m = 2.0 * PI * FREQUENCY_HZ * MU0_OVER_2PI * (deq / gmr).ln();
    (per_m * line.length_m).max(0.0)
}

/// Branch and downstream voltage base for a transformer reached from one side.
fn transformer_branch(
    tx: &PowerTransformer,
    upstream: usize,
    downstream: usize,
    parent_volts: f64,
    forward: bool,
) -> (Branch, f64) {
    let primary = tx.primary().map_or(0.0, |w| w.nominal_voltage.value());
    let secondary = tx.secondary().map_or(0.0, |w| w.nominal_voltage.value());
    let (near, far) = if forward {
        (primary, secondary)
    } else {
        (secondary, primary)
    };
    let base_volts = if near > 0.0 && far > 0.0 {
        parent_volts * far / near
    } else {
        parent_volts
    };

    let rated = tx.rated_power().value();
    let z_pu = if rated > 0.0 {
        let r: f64 = tx
            .windings
            .iter()
            .filter(|w| w.nominal_voltage.value() > 0.0)
            .map(|w| w.resistance / (w.nominal_voltage.value().powi(2) / rated))
            .sum();
        let x = tx.reactances.first().copied().unwrap_or(0.0);
        Complex64::new(r, x) * (BASE_VA / rated)
    } else {
        Complex64::new(0.0, 0.0)
    };

    let branch = Branch {
        name: tx.name.clone(),
        kind: BranchKind::Transformer,
        upstream,
        downstream,
        z_pu,
        phases: tx.primary_phases().len(),
        normal_amps: 0.0,
        rated_kva: rated / 1000.0,
        rated_kv: primary / 1000.0,
    };
    (branch, base_volts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ugrid_core::{Element, Load, Node, PhaseSet, PowerSource, Vars, Volts, Watts, Wire};

    fn feeder(demand_kw: f64) -> Model {
        let mut model = Model::new();
        model.add(Node::new("source")).unwrap();
        model.add(Node::new("j1")).unwrap();
        model
            .add(PowerSource::new("ps_source", "source", Volts(480.0)))
            .unwrap();
        let mut line = Line::new("l1", "source", "j1").with_phases(PhaseSet::three_phase());
        line.length_m = 100.0;
        for (i, wire) in line.wires.iter_mut().enumerate() {
            *wire = Wire {
                phase: wire.phase,
                ampacity_a: 200.0,
                resistance_ohm_per_m: 0.0005,
                gmr_m: 0.004,
                x_m: i as f64 * 0.3,
                height_m: 9.0,
                ..Wire::default()
            };
        }
        model.add(line).unwrap();
        model
            .add(Load::new("b1", "j1").with_demand(
                PhaseSet::three_phase(),
                Watts::from_kw(demand_kw),
                Vars(0.0),
            ))
            .unwrap();
        model
    }

    fn solve(model: &Model, index: usize) -> RadialSweepSession {
        let mut session = RadialSweepSession::new();
        session
            .load(&CircuitDescription {
                model,
                master_file: None,
            })
            .unwrap();
        let request = SolveRequest {
            index,
            stepsize_minutes: 15.0,
            hour: 0,
            seconds: 0.0,
        };
        assert_eq!(session.solve(&request).unwrap(), None);
        session
    }

    #[test]
    fn test_unloaded_feeder_sits_at_source_voltage() {
        let model = feeder(0.0);
        let session = solve(&model, 0);
        let voltages = session.bus_voltages().unwrap();
        assert!((voltages["j1"] - 1.0).abs() < 1e-12);
        assert_eq!(session.line_currents("l1").unwrap().currents, vec![0.0; 3]);
    }

    #[test]
    fn test_loaded_line_drops_voltage() {
        let model = feeder(100.0);
        let session = solve(&model, 0);
        let v = session.bus_voltages().unwrap()["j1"];
        assert!(v < 1.0 && v > 0.9, "voltage {v}");

        let reading = session.line_currents("l1").unwrap();
        let expected = 100_000.0 / (3f64.sqrt() * 480.0);
        assert!((reading.currents[0] - expected).abs() / expected < 0.05);
        assert_eq!(reading.normal_amps, 200.0);
    }

    #[test]
    fn test_profile_multiplier_scales_demand() {
        let mut model = feeder(100.0);
        if let Some(Element::Load(load)) = model.get_mut("b1") {
            load.timeseries = Some(Timeseries {
                data_label: "feature_b1".into(),
                interval_hours: 1.0,
                data_location: None,
                scale_factor: 1.0,
                values: vec![0.0, 1.0],
            });
        }
        let idle = solve(&model, 0);
        assert!((idle.bus_voltages().unwrap()["j1"] - 1.0).abs() < 1e-12);
        let busy = solve(&model, 1);
        assert!(busy.bus_voltages().unwrap()["j1"] < 1.0);
    }

    #[test]
    fn test_queries_before_load_fail() {
        let session = RadialSweepSession::new();
        assert!(matches!(session.bus_voltages(), Err(GridError::Solver(_))));
        assert!(session.line_names().is_empty());
    }

    #[test]
    fn test_reactance_from_spacing() {
        let model = feeder(0.0);
        let x = line_reactance_ohm(model.line("l1").unwrap());
        let deq = (0.3f64 * 0.3 * 0.6).cbrt();
        let expected = 2.0 * PI * 60.0 * 2e-7 * (deq / 0.004).ln() * 100.0;
        assert!((x - expected).abs() < 1e-9);
    }
}
