//! Core circuit model for urban distribution networks.
//!
//! Elements are kept in an arena keyed by name ([`Model`]); the connectivity
//! graph ([`NetworkGraph`]) is derived from it on demand.

pub mod diagnostics;
pub mod elements;
pub mod error;
pub mod graph;
pub mod model;
pub mod phase;
pub mod units;

pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use elements::{
    ConcentricNeutral, ConnectionType, Element, ElementKind, FeederMetadata, Line, LineType,
    Load, Node, PhaseLoad, PhaseWinding, Photovoltaic, Position, PowerSource, PowerTransformer,
    RefSlot, Timeseries, VoltageType, Winding, Wire,
};
pub use error::{GridError, GridResult};
pub use graph::{Component, ComponentMember, GraphStats, Link, LinkKind, NetworkGraph, Vertex};
pub use model::{Model, ModelStats};
pub use phase::{Phase, PhaseSet};
pub use units::{Kilovolts, PerUnit, VoltAmperes, Vars, Volts, Watts};
