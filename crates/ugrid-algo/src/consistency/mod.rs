//! Consistency Checker.
//!
//! Five structural checks over a built graph and its model. Each returns a
//! [`CheckOutcome`] with pass/fail and the diagnostics explaining a failure;
//! none of them mutates anything, so running them twice on the same model
//! gives identical results.

mod connectivity;
mod loops;
mod phases;

pub use connectivity::{check_loads_connected, check_unique_path};
pub use loops::check_loops;
pub use phases::{check_matched_phases, check_transformer_phase_path};

use serde::Serialize;
use std::fmt;

use ugrid_core::{Diagnostics, Model, NetworkGraph};

use crate::upstream::UpstreamIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Loops,
    LoadsConnected,
    UniquePath,
    MatchedPhases,
    TransformerPhasePath,
}

impl CheckKind {
    pub const ALL: [CheckKind; 5] = [
        CheckKind::Loops,
        CheckKind::LoadsConnected,
        CheckKind::UniquePath,
        CheckKind::MatchedPhases,
        CheckKind::TransformerPhasePath,
    ];

    /// Diagnostics category used by the check
    pub fn category(self) -> &'static str {
        match self {
            CheckKind::Loops => "loops",
            CheckKind::LoadsConnected => "loads_connected",
            CheckKind::UniquePath => "unique_path",
            CheckKind::MatchedPhases => "matched_phases",
            CheckKind::TransformerPhasePath => "transformer_phase_path",
        }
    }

    /// Checks the phase-path fixer is allowed to repair.
    pub fn is_phase_check(self) -> bool {
        matches!(
            self,
            CheckKind::MatchedPhases | CheckKind::TransformerPhasePath
        )
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckKind::Loops => "no loops",
            CheckKind::LoadsConnected => "loads connected",
            CheckKind::UniquePath => "unique path",
            CheckKind::MatchedPhases => "matched phases",
            CheckKind::TransformerPhasePath => "transformer phase path",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutcome {
    pub kind: CheckKind,
    pub passed: bool,
    pub diagnostics: Diagnostics,
}

impl CheckOutcome {
    /// Outcome that passes iff `diagnostics` holds no errors.
    pub fn from_diagnostics(kind: CheckKind, diagnostics: Diagnostics) -> Self {
        Self {
            kind,
            passed: !diagnostics.has_errors(),
            diagnostics,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConsistencyReport {
    pub outcomes: Vec<CheckOutcome>,
}

impl ConsistencyReport {
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed)
    }

    pub fn outcome(&self, kind: CheckKind) -> Option<&CheckOutcome> {
        self.outcomes.iter().find(|o| o.kind == kind)
    }

    pub fn failed(&self) -> impl Iterator<Item = CheckKind> + '_ {
        self.outcomes.iter().filter(|o| !o.passed).map(|o| o.kind)
    }

    /// Replace the outcome of a re-run check, keeping report order.
    pub fn replace(&mut self, outcome: CheckOutcome) {
        match self.outcomes.iter_mut().find(|o| o.kind == outcome.kind) {
            Some(slot) => *slot = outcome,
            None => self.outcomes.push(outcome),
        }
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let mut all = Diagnostics::new();
        for outcome in &self.outcomes {
            all.merge(outcome.diagnostics.clone());
        }
        all
    }
}

/// Run a single check.
pub fn run_check(
    kind: CheckKind,
    model: &Model,
    graph: &NetworkGraph,
    upstream: &UpstreamIndex,
) -> CheckOutcome {
    match kind {
        CheckKind::Loops => check_loops(graph),
        CheckKind::LoadsConnected => check_loads_connected(model, upstream),
        CheckKind::UniquePath => check_unique_path(model, graph),
        CheckKind::MatchedPhases => check_matched_phases(model, graph, upstream),
        CheckKind::TransformerPhasePath => check_transformer_phase_path(model, upstream),
    }
}

/// Run all five checks in order.
pub fn check_model(model: &Model, graph: &NetworkGraph) -> ConsistencyReport {
    let upstream = UpstreamIndex::build(graph);
    ConsistencyReport {
        outcomes: CheckKind::ALL
            .into_iter()
            .map(|kind| run_check(kind, model, graph, &upstream))
            .collect(),
    }
}
