//! Unified error type for the ugrid workspace
//!
//! [`GridError`] covers the failure classes of the conversion pipeline:
//! malformed input, topology defects, configuration problems and solver
//! boundary failures. Crates above `ugrid-core` may wrap it in `anyhow`
//! at file boundaries; domain code returns it directly.
//!
//! # Example
//!
//! ```ignore
//! use ugrid_core::{GridError, GridResult};
//!
//! fn require_source(model: &Model) -> GridResult<()> {
//!     if model.power_sources().next().is_none() {
//!         return Err(GridError::NoSubstation);
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Error type for all model, topology and pipeline operations.
#[derive(Error, Debug)]
pub enum GridError {
    /// I/O errors (file access)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Missing keys, missing catalog entries, missing phase annotations
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// A name was looked up that is not present in the model
    #[error("Unknown element '{0}'")]
    UnknownElement(String),

    /// Two elements share one name
    #[error("Duplicate element name '{0}'")]
    DuplicateName(String),

    /// Loops, non-unique paths, unmergeable components
    #[error("Topology error: {0}")]
    Topology(String),

    /// The element cannot be reached from the source root
    #[error("Element '{element}' is not connected to the source")]
    Disconnected { element: String },

    /// No component of the graph contains a power source
    #[error("No substation found: no connected component contains a power source")]
    NoSubstation,

    /// Model has no elements or no nodes
    #[error("Model is empty: {0}")]
    EmptyModel(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failures reported at the solver boundary
    #[error("Solver error: {0}")]
    Solver(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using GridError.
pub type GridResult<T> = Result<T, GridError>;

impl From<anyhow::Error> for GridError {
    fn from(err: anyhow::Error) -> Self {
        GridError::Other(err.to_string())
    }
}

impl From<String> for GridError {
    fn from(s: String) -> Self {
        GridError::Other(s)
    }
}

impl From<&str> for GridError {
    fn from(s: &str) -> Self {
        GridError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for GridError {
    fn from(err: serde_json::Error) -> Self {
        GridError::Parse(err.to_string())
    }
}
