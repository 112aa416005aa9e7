use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;
use ugrid_cli::{commands, Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let result = match &cli.command {
        Commands::Run(args) => commands::run::handle(args),
        Commands::Check(args) => commands::check::handle(args),
        Commands::Graph { command } => commands::graph::handle(command),
    };

    match result {
        Ok(()) => {
            info!("ugrid finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:?}", e);
            eprintln!("CLI failed with message: {e}");
            ExitCode::FAILURE
        }
    }
}
