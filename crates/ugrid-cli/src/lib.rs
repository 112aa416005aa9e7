pub mod cli;
pub mod commands;
pub mod config;
pub mod pipeline;

pub use cli::{CheckArgs, Cli, Commands, GraphCommands, RunArgs};
pub use config::{ResolvedConfig, RunConfig};
