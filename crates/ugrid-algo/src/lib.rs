//! # ugrid-algo: topology repair and consistency for distribution models
//!
//! | Stage | Module |
//! |-------|--------|
//! | Nearest upstream transformer per vertex | [`upstream`] |
//! | Stitch disconnected components onto the source | [`repair`] |
//! | Loops, connectivity, unique path, phase checks | [`consistency`] |
//! | Relabel downstream phases to the transformer secondary | [`fix_phase_path`] |
//! | Raise undersized transformers | [`fix_sizing`] |
//! | All of the above in order | [`pipeline`] |
//!
//! Every stage works on a [`ugrid_core::Model`] and a freshly built
//! [`ugrid_core::NetworkGraph`]; stages that mutate the model expect the
//! caller to rebuild the graph afterwards.

pub mod consistency;
pub mod fix_phase_path;
pub mod fix_sizing;
pub mod pipeline;
pub mod repair;
pub mod upstream;

pub use consistency::{check_model, CheckKind, CheckOutcome, ConsistencyReport};
pub use fix_phase_path::{apply_phase_fix, fix_phase_path, plan_phase_fix, PhaseRewrite};
pub use fix_sizing::{fix_transformer_sizing, SizingPolicy, Upgrade, STANDARD_KVA_STEPS};
pub use pipeline::{validate_model, ValidationOptions, ValidationOutcome};
pub use repair::{apply_repair, plan_repair, repair, RepairOutcome, RepairPlan, SubstitutionMap};
pub use upstream::{get_upstream_transformer, UpstreamIndex};
