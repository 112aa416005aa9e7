use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ugrid", author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info", global = true)]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run OpenDSS-style power flow on an existing URBANopt scenario
    Run(RunArgs),
    /// Read a scenario and report the consistency checks without solving
    Check(CheckArgs),
    /// Graph utilities on a feature file
    Graph {
        #[command(subcommand)]
        command: GraphCommands,
    },
}

#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Path to the scenario CSV file
    #[arg(short = 's', long)]
    pub scenario_file: Option<PathBuf>,
    /// Path to the feature GeoJSON file
    #[arg(short = 'f', long)]
    pub feature_file: Option<PathBuf>,
    /// Path to the equipment catalog
    #[arg(short = 'e', long)]
    pub equipment: Option<PathBuf>,
    /// First timepoint to simulate (`YYYY/MM/DD HH:MM:SS`)
    #[arg(short = 'b', long)]
    pub start_time: Option<String>,
    /// Last timepoint to simulate (`YYYY/MM/DD HH:MM:SS`)
    #[arg(short = 'n', long)]
    pub end_time: Option<String>,
    /// Simulation step in minutes; a multiple of the load file step
    #[arg(short = 't', long)]
    pub timestep: Option<f64>,
    /// Use REopt load and PV results
    #[arg(short = 'r', long)]
    pub reopt: bool,
    /// JSON or TOML run configuration; flags override its values
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,
    /// Upgrade undersized transformers
    #[arg(short = 'u', long)]
    pub upgrade: bool,
    /// Output folder (default: `<scenario run dir>/opendss`)
    #[arg(short = 'o', long)]
    pub out_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Path to the feature GeoJSON file
    #[arg(short = 'f', long)]
    pub feature_file: PathBuf,
    /// Path to the equipment catalog
    #[arg(short = 'e', long)]
    pub equipment: PathBuf,
    /// Scenario CSV file, to attach building demand
    #[arg(short = 's', long)]
    pub scenario_file: Option<PathBuf>,
    /// Use REopt load and PV results
    #[arg(short = 'r', long)]
    pub reopt: bool,
    /// Also run the transformer sizing fixer
    #[arg(short = 'u', long)]
    pub upgrade: bool,
    /// Print the validation outcome as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum GraphCommands {
    /// Graph stats summary
    Stats {
        /// Path to the feature GeoJSON file
        feature_file: PathBuf,
        /// Path to the equipment catalog
        #[arg(short = 'e', long)]
        equipment: PathBuf,
    },
    /// List connected components before repair
    Islands {
        /// Path to the feature GeoJSON file
        feature_file: PathBuf,
        /// Path to the equipment catalog
        #[arg(short = 'e', long)]
        equipment: PathBuf,
        /// Emit the members of every island
        #[arg(long)]
        emit: bool,
    },
}
