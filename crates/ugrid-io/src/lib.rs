//! # ugrid-io: URBANopt input and OpenDSS output
//!
//! Reads an URBANopt scenario (GeoJSON features, equipment catalog, per-building
//! feature reports) into a [`ugrid_core::Model`] and writes the model back out
//! as OpenDSS scripts plus per-element result CSVs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use ugrid_io::{read_urbanopt, write_opendss, EquipmentCatalog, ReaderOptions};
//!
//! fn main() -> anyhow::Result<()> {
//!     let catalog = EquipmentCatalog::load(Path::new("extended_catalog.json"))?;
//!     let options = ReaderOptions {
//!         load_folder: "run/baseline".into(),
//!         ..ReaderOptions::default()
//!     };
//!     let outcome = read_urbanopt(Path::new("feature.json"), &catalog, &options)?;
//!     write_opendss(&outcome.model, Path::new("run/baseline/opendss"))?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`catalog`] - wires, line geometries and transformers by catalog name
//! - [`geojson`] - feature reader: network first, then buildings
//! - [`profiles`] - feature report columns in, profile CSVs out
//! - [`opendss`] - `Master.dss` and the scripts it redirects to
//! - [`reports`] - `results/{Features,Lines,Transformers}/<name>.csv`
//!
//! ## Error Handling
//!
//! File-level failures are `anyhow` errors with the offending path in the
//! context chain. Malformed features and catalog misses carry a
//! [`ugrid_core::GridError`] that callers can `downcast_ref`.

pub mod catalog;
pub mod geojson;
pub mod opendss;
pub mod profiles;
pub mod reports;

pub use catalog::EquipmentCatalog;
pub use geojson::{
    attach_buildings, build_network, read_urbanopt, FeatureCollection, ReadOutcome,
    ReaderOptions, FEEDER_NAME, SOURCE_ELEMENT, SOURCE_NODE,
};
pub use opendss::{write_opendss, DssOutput, DssScripts};
pub use profiles::{read_timestamps, Profile, ProfileWriter};
pub use reports::{LoadingRow, RunRecorder, VoltageRow};
