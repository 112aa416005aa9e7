use anyhow::Result;
use ugrid_core::{Diagnostics, Model, NetworkGraph};
use ugrid_io::{build_network, EquipmentCatalog, FeatureCollection, SOURCE_ELEMENT};

use crate::cli::GraphCommands;

/// Network elements only; buildings are not attached.
fn network(feature_file: &std::path::Path, equipment: &std::path::Path) -> Result<Model> {
    let catalog = EquipmentCatalog::load(equipment)?;
    let features = FeatureCollection::load(feature_file)?;
    let mut diagnostics = Diagnostics::new();
    build_network(&features, &catalog, &mut diagnostics)
}

pub fn handle(command: &GraphCommands) -> Result<()> {
    match command {
        GraphCommands::Stats {
            feature_file,
            equipment,
        } => {
            let model = network(feature_file, equipment)?;
            let graph = NetworkGraph::build(&model, SOURCE_ELEMENT)?;
            let stats = graph.stats();
            println!("Graph statistics for {}:", feature_file.display());
            println!("  Elements      : {}", model.stats());
            println!("  Vertices      : {}", stats.node_count);
            println!(
                "  Edges         : {} ({} lines, {} transformers)",
                stats.edge_count, stats.line_count, stats.transformer_count
            );
            println!("  Components    : {}", stats.connected_components);
            println!(
                "  Degree [min/avg/max]: {}/{:.2}/{}",
                stats.min_degree, stats.avg_degree, stats.max_degree
            );
            Ok(())
        }
        GraphCommands::Islands {
            feature_file,
            equipment,
            emit,
        } => {
            let model = network(feature_file, equipment)?;
            let graph = NetworkGraph::build(&model, SOURCE_ELEMENT)?;
            for component in graph.components() {
                println!(
                    "Island {}: {} element(s){}",
                    component.id,
                    component.members.len(),
                    if component.has_power_source() {
                        " [source]"
                    } else {
                        ""
                    }
                );
                if *emit {
                    for member in &component.members {
                        println!("  {:<24} {:?}", member.name, member.kind);
                    }
                }
            }
            Ok(())
        }
    }
}
