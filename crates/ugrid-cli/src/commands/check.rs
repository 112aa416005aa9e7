use std::io::{self, Write};

use anyhow::Result;
use tabwriter::TabWriter;
use ugrid_algo::{check_model, ConsistencyReport};
use ugrid_core::NetworkGraph;
use ugrid_io::{read_urbanopt, EquipmentCatalog, ReaderOptions, SOURCE_ELEMENT};

use crate::cli::CheckArgs;
use crate::config::scenario_run_dir;
use crate::pipeline::validation_options;

fn print_report(title: &str, report: &ConsistencyReport) -> Result<()> {
    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "{title}\tRESULT\tISSUES")?;
    for outcome in &report.outcomes {
        writeln!(
            writer,
            "{}\t{}\t{}",
            outcome.kind,
            if outcome.passed { "PASS" } else { "FAIL" },
            outcome.diagnostics.issues.len()
        )?;
    }
    writer.flush()?;
    Ok(())
}

pub fn handle(args: &CheckArgs) -> Result<()> {
    let catalog = EquipmentCatalog::load(&args.equipment)?;
    let load_folder = match &args.scenario_file {
        Some(path) => scenario_run_dir(path)?,
        None => Default::default(),
    };
    let reader = ReaderOptions {
        load_folder,
        use_reopt: args.reopt,
        profiles: None,
    };
    let mut outcome = read_urbanopt(&args.feature_file, &catalog, &reader)?;

    let graph = NetworkGraph::build(&outcome.model, SOURCE_ELEMENT)?;
    let initial = check_model(&outcome.model, &graph);
    if !args.json {
        print_report("CHECK", &initial)?;
    }

    let options = validation_options(args.upgrade, false, &catalog);
    let validated = ugrid_algo::validate_model(&mut outcome.model, SOURCE_ELEMENT, &options)?;

    if args.json {
        serde_json::to_writer_pretty(io::stdout(), &validated)
            .map_err(|err| anyhow::anyhow!("serializing validation outcome to JSON: {err}"))?;
        println!();
        return Ok(());
    }
    if !validated.phase_rewrites.is_empty() {
        println!();
        for rewrite in &validated.phase_rewrites {
            println!("Rewired {}: {} -> {}", rewrite.element, rewrite.from, rewrite.to);
        }
        print_report("AFTER FIX", &validated.report)?;
    }
    for upgrade in &validated.upgrades {
        println!(
            "Upgraded {}: {} kVA -> {} kVA",
            upgrade.transformer, upgrade.from_kva, upgrade.to_kva
        );
    }
    Ok(())
}
