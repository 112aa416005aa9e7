//! Solver boundary for ugrid circuits.
//!
//! [`CircuitSession`] is the request/response protocol the run orchestrator
//! drives once per timestep. [`RadialSweepSession`] implements it with a
//! backward/forward sweep straight from the model; [`loading`] turns the
//! currents it reports into per-unit branch loading.

pub mod loading;
pub mod session;
pub mod sweep;

pub use loading::{line_loading, transformer_limit_amps, transformer_loading};
pub use session::{
    BranchReading, CircuitDescription, CircuitSession, SolveRequest, TransformerReading,
};
pub use sweep::RadialSweepSession;
