//! Solver boundary.
//!
//! A [`CircuitSession`] owns the solver's active circuit. The orchestrator
//! holds exactly one session for a run and drives it one timestep at a time:
//! `clear`, `load`, then alternating `solve` and queries.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use ugrid_core::{GridResult, Model};

/// What a session is asked to load.
#[derive(Debug, Clone, Copy)]
pub struct CircuitDescription<'a> {
    pub model: &'a Model,
    /// `Master.dss` written for the model, for sessions driving OpenDSS
    pub master_file: Option<&'a Path>,
}

/// One timestep of a yearly simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SolveRequest {
    /// Index into the load profiles
    pub index: usize,
    pub stepsize_minutes: f64,
    pub hour: u64,
    pub seconds: f64,
}

/// Phase current magnitudes of a line, in amperes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchReading {
    pub currents: Vec<f64>,
    pub normal_amps: f64,
}

/// Primary-side phase current magnitudes of a transformer, in amperes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformerReading {
    pub currents: Vec<f64>,
    pub rated_kva: f64,
    /// Primary winding voltage
    pub rated_kv: f64,
    pub phases: usize,
}

/// Exclusive handle on one solver circuit.
pub trait CircuitSession {
    /// Solver name for log lines.
    fn name(&self) -> &'static str;

    /// Drop the active circuit.
    fn clear(&mut self);

    fn load(&mut self, circuit: &CircuitDescription<'_>) -> GridResult<()>;

    /// Solve one timestep.
    ///
    /// `Ok(Some(text))` carries solver diagnostics for the step; the step's
    /// results are still queryable.
    fn solve(&mut self, request: &SolveRequest) -> GridResult<Option<String>>;

    /// Per-unit voltage magnitude of every bus of the last solution.
    fn bus_voltages(&self) -> GridResult<BTreeMap<String, f64>>;

    fn line_names(&self) -> Vec<String>;

    fn line_currents(&self, line: &str) -> GridResult<BranchReading>;

    fn transformer_names(&self) -> Vec<String>;

    fn transformer_currents(&self, transformer: &str) -> GridResult<TransformerReading>;
}
