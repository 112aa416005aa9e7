use anyhow::Result;
use tracing::info;
use ugrid_solver::RadialSweepSession;

use crate::cli::RunArgs;
use crate::config::RunConfig;
use crate::pipeline;

pub fn handle(args: &RunArgs) -> Result<()> {
    let config = RunConfig::from_args(args)?.resolve()?;
    let mut session = RadialSweepSession::new();
    let summary = pipeline::run(&config, &mut session)?;
    info!(
        "{} timepoints, {} phase rewrites, {} transformer upgrades",
        summary.timepoints,
        summary.validation.phase_rewrites.len(),
        summary.validation.upgrades.len()
    );
    println!("\nDone. Results located in {}\n", summary.output_dir.display());
    Ok(())
}
