//! Validation pipeline run on a model before it is handed to the solver.
//!
//! Order matters: the consistency checks run against the current graph; a
//! failed phase check gets exactly one fix attempt followed by a re-run of
//! both phase checks; any other failure is fatal. Sizing runs last, and only
//! when requested.

use serde::Serialize;
use tracing::{info, warn};

use ugrid_core::{GridError, GridResult, Model, NetworkGraph};

use crate::consistency::{check_model, run_check, CheckKind, ConsistencyReport};
use crate::fix_phase_path::{fix_phase_path, PhaseRewrite};
use crate::fix_sizing::{fix_transformer_sizing, SizingPolicy, Upgrade};
use crate::upstream::UpstreamIndex;

#[derive(Debug, Clone, Default)]
pub struct ValidationOptions {
    pub upgrade_transformers: bool,
    pub sizing: SizingPolicy,
}

impl ValidationOptions {
    pub fn with_upgrades(mut self, policy: SizingPolicy) -> Self {
        self.upgrade_transformers = true;
        self.sizing = policy;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationOutcome {
    /// Report of the first pass
    pub initial: ConsistencyReport,
    /// Report after the phase fix, identical to `initial` when no fix ran
    pub report: ConsistencyReport,
    pub phase_rewrites: Vec<PhaseRewrite>,
    pub upgrades: Vec<Upgrade>,
}

fn rejected(report: &ConsistencyReport) -> GridError {
    let failed: Vec<String> = report.failed().map(|kind| kind.to_string()).collect();
    GridError::Topology(format!(
        "Invalid OpenDSS input: failed checks: {}",
        failed.join(", ")
    ))
}

/// Check, repair phases once if needed, and optionally resize transformers.
pub fn validate_model(
    model: &mut Model,
    source_name: &str,
    options: &ValidationOptions,
) -> GridResult<ValidationOutcome> {
    let graph = NetworkGraph::build(model, source_name)?;
    let initial = check_model(model, &graph);
    for outcome in &initial.outcomes {
        info!(
            "{}: {}",
            outcome.kind,
            if outcome.passed { "PASS" } else { "FAIL" }
        );
        for issue in &outcome.diagnostics.issues {
            warn!("{}", issue);
        }
    }

    if initial.failed().any(|kind| !kind.is_phase_check()) {
        return Err(rejected(&initial));
    }

    let mut report = initial.clone();
    let mut phase_rewrites = Vec::new();
    if !report.passed() {
        info!("phase checks failed, attempting to fix the phase path");
        phase_rewrites = fix_phase_path(model, &graph)?;
        let graph = NetworkGraph::build(model, source_name)?;
        let upstream = UpstreamIndex::build(&graph);
        for kind in [CheckKind::MatchedPhases, CheckKind::TransformerPhasePath] {
            let outcome = run_check(kind, model, &graph, &upstream);
            info!(
                "{} (after fix): {}",
                kind,
                if outcome.passed { "PASS" } else { "FAIL" }
            );
            report.replace(outcome);
        }
        if !report.passed() {
            return Err(rejected(&report));
        }
    }

    let upgrades = if options.upgrade_transformers {
        let graph = NetworkGraph::build(model, source_name)?;
        fix_transformer_sizing(model, &graph, &options.sizing)?
    } else {
        Vec::new()
    };

    Ok(ValidationOutcome {
        initial,
        report,
        phase_rewrites,
        upgrades,
    })
}
