//! Transformer Sizing Fixer.
//!
//! Demand behind a transformer is the summed apparent power of every load
//! whose upstream transformer resolves to it. An undersized transformer is
//! raised to the next standard size; ratings are never lowered.

use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

use ugrid_core::{GridResult, Model, NetworkGraph, VoltAmperes};

use crate::upstream::UpstreamIndex;

/// Standard distribution transformer sizes in kVA.
pub const STANDARD_KVA_STEPS: [f64; 22] = [
    15.0, 25.0, 37.5, 50.0, 75.0, 100.0, 112.5, 150.0, 167.0, 225.0, 250.0, 300.0, 333.0, 500.0,
    750.0, 1000.0, 1500.0, 2000.0, 2500.0, 3000.0, 3750.0, 5000.0,
];

/// Size ladder a transformer is upgraded along.
#[derive(Debug, Clone, PartialEq)]
pub struct SizingPolicy {
    steps_kva: Vec<f64>,
}

impl Default for SizingPolicy {
    fn default() -> Self {
        Self {
            steps_kva: STANDARD_KVA_STEPS.to_vec(),
        }
    }
}

impl SizingPolicy {
    /// Ladder made of the distinct ratings found in an equipment catalog.
    ///
    /// Falls back to the standard ladder when the catalog has none.
    pub fn from_catalog(ratings_kva: impl IntoIterator<Item = f64>) -> Self {
        let mut steps: Vec<f64> = ratings_kva
            .into_iter()
            .filter(|kva| kva.is_finite() && *kva > 0.0)
            .collect();
        steps.sort_by(f64::total_cmp);
        steps.dedup();
        if steps.is_empty() {
            return Self::default();
        }
        Self { steps_kva: steps }
    }

    pub fn steps_kva(&self) -> &[f64] {
        &self.steps_kva
    }

    /// Smallest step covering `demand_kva`; the demand itself above the ladder.
    pub fn size_for(&self, demand_kva: f64) -> f64 {
        self.steps_kva
            .iter()
            .copied()
            .find(|step| *step >= demand_kva)
            .unwrap_or(demand_kva)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Upgrade {
    pub transformer: String,
    pub from_kva: f64,
    pub to_kva: f64,
    pub demand_kva: f64,
}

/// Apparent demand per transformer name.
pub fn downstream_demand(model: &Model, upstream: &UpstreamIndex) -> HashMap<String, VoltAmperes> {
    let mut demand: HashMap<String, VoltAmperes> = HashMap::new();
    for load in model.loads() {
        match upstream.get_upstream_transformer(&load.name) {
            Ok(Some(tx)) => {
                let total = demand.entry(tx.to_string()).or_default();
                *total = *total + load.apparent_power();
            }
            Ok(None) => {}
            Err(err) => warn!("skipping {} in sizing: {}", load.name, err),
        }
    }
    demand
}

/// Raise every undersized transformer; returns the upgrades made.
pub fn fix_transformer_sizing(
    model: &mut Model,
    graph: &NetworkGraph,
    policy: &SizingPolicy,
) -> GridResult<Vec<Upgrade>> {
    let upstream = UpstreamIndex::build(graph);
    let demand = downstream_demand(model, &upstream);
    let mut upgrades = Vec::new();

    for tx in model.transformers_mut() {
        let Some(needed) = demand.get(&tx.name) else {
            continue;
        };
        let rated = tx.rated_power();
        if rated >= *needed {
            continue;
        }
        let target = VoltAmperes::from_kva(policy.size_for(needed.kva())).max(*needed);
        info!(
            "Upgrading {} from {} kVA to {} kVA",
            tx.name,
            rated.kva(),
            target.kva()
        );
        tx.set_rated_power(target);
        upgrades.push(Upgrade {
            transformer: tx.name.clone(),
            from_kva: rated.kva(),
            to_kva: target.kva(),
            demand_kva: needed.kva(),
        });
    }
    Ok(upgrades)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_ladder() {
        let policy = SizingPolicy::default();
        assert_eq!(policy.size_for(150.0), 150.0);
        assert_eq!(policy.size_for(150.1), 167.0);
        assert_eq!(policy.size_for(0.5), 15.0);
        assert_eq!(policy.size_for(6000.0), 6000.0);
    }

    #[test]
    fn test_catalog_ladder_dedups_and_sorts() {
        let policy = SizingPolicy::from_catalog([75.0, 25.0, 75.0, 0.0, 300.0]);
        assert_eq!(policy.steps_kva(), &[25.0, 75.0, 300.0]);
        assert_eq!(policy.size_for(80.0), 300.0);
        assert_eq!(SizingPolicy::from_catalog([]), SizingPolicy::default());
    }
}
