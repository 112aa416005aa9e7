//! Branch loading in per unit of the branch rating.

use crate::session::{BranchReading, TransformerReading};

/// Largest phase current over the conductor's normal rating.
///
/// A line without a rating reports zero loading.
pub fn line_loading(reading: &BranchReading) -> f64 {
    if reading.normal_amps <= 0.0 {
        return 0.0;
    }
    max_current(&reading.currents) / reading.normal_amps
}

/// Per-phase current limit: kVA / (kV·√3) for polyphase units, kVA / kV otherwise.
pub fn transformer_limit_amps(rated_kva: f64, rated_kv: f64, phases: usize) -> f64 {
    if rated_kv <= 0.0 {
        return 0.0;
    }
    if phases > 1 {
        rated_kva / (rated_kv * 3f64.sqrt())
    } else {
        rated_kva / rated_kv
    }
}

pub fn transformer_loading(reading: &TransformerReading) -> f64 {
    let limit = transformer_limit_amps(reading.rated_kva, reading.rated_kv, reading.phases);
    if limit <= 0.0 {
        return 0.0;
    }
    max_current(&reading.currents) / limit
}

fn max_current(currents: &[f64]) -> f64 {
    currents.iter().copied().fold(0.0, f64::max)
}
