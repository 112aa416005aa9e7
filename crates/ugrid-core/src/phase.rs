//! Phase labels and phase sets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GridError;

/// A conductor phase label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    A,
    B,
    C,
    /// Neutral conductor; never part of a [`PhaseSet`]
    N,
}

impl Phase {
    pub const ENERGIZED: [Phase; 3] = [Phase::A, Phase::B, Phase::C];

    pub fn is_neutral(self) -> bool {
        matches!(self, Phase::N)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::A => "A",
            Phase::B => "B",
            Phase::C => "C",
            Phase::N => "N",
        }
    }

    /// OpenDSS node number for the phase (`bus.1.2.3`)
    pub fn node_number(self) -> u8 {
        match self {
            Phase::A => 1,
            Phase::B => 2,
            Phase::C => 3,
            Phase::N => 0,
        }
    }

    fn bit(self) -> u8 {
        match self {
            Phase::A => 0b001,
            Phase::B => 0b010,
            Phase::C => 0b100,
            Phase::N => 0,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Phase::A),
            "B" => Ok(Phase::B),
            "C" => Ok(Phase::C),
            "N" => Ok(Phase::N),
            other => Err(GridError::MalformedInput(format!(
                "unknown phase label '{other}'"
            ))),
        }
    }
}

/// Set of energized phases (A, B, C). Neutral labels are ignored on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "Vec<Phase>", from = "Vec<Phase>")]
pub struct PhaseSet(u8);

impl PhaseSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn three_phase() -> Self {
        Self(0b111)
    }

    /// Split-phase output of a center-tap secondary
    pub const fn split_phase() -> Self {
        Self(0b011)
    }

    pub fn insert(&mut self, phase: Phase) {
        self.0 |= phase.bit();
    }

    pub fn contains(self, phase: Phase) -> bool {
        phase.bit() != 0 && self.0 & phase.bit() != 0
    }

    pub fn is_superset(self, other: PhaseSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Phases in `other` that are missing here
    pub fn missing_from(self, other: PhaseSet) -> PhaseSet {
        PhaseSet(other.0 & !self.0)
    }

    pub fn iter(self) -> impl Iterator<Item = Phase> {
        Phase::ENERGIZED
            .into_iter()
            .filter(move |phase| self.contains(*phase))
    }
}

impl FromIterator<Phase> for PhaseSet {
    fn from_iter<I: IntoIterator<Item = Phase>>(iter: I) -> Self {
        let mut set = PhaseSet::empty();
        for phase in iter {
            set.insert(phase);
        }
        set
    }
}

impl From<Vec<Phase>> for PhaseSet {
    fn from(phases: Vec<Phase>) -> Self {
        phases.into_iter().collect()
    }
}

impl From<PhaseSet> for Vec<Phase> {
    fn from(set: PhaseSet) -> Self {
        set.iter().collect()
    }
}

impl fmt::Display for PhaseSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("{}");
        }
        for phase in self.iter() {
            f.write_str(phase.as_str())?;
        }
        Ok(())
    }
}
