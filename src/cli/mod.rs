use clap::{Parser, Subcommand};
use std::path::PathBuf;
use workstation_brain::LogFormat;

pub mod commands;

#[derive(Parser)]
#[command(name = "workstation-brain")]
#[command(about = "Assembly workstation orchestrator")]
#[command(long_about = "Workstation Brain fuses object detections and hand positions into a \
                       shared world state, checks subtask completion rules against it and \
                       drives the projector and management interfaces. Start with \
                       'workstation-brain init-config' and 'workstation-brain check'.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run ingestion, the orchestrator loop and the stdio bus until interrupted
    Run {
        /// Configuration file (defaults to ./workstation.toml when present)
        #[arg(long, help = "Path to the station configuration file")]
        config: Option<PathBuf>,
        /// Task catalog overriding `catalog_path` from the configuration
        #[arg(long, help = "Path to the task catalog (TOML or JSON)")]
        catalog: Option<PathBuf>,
        /// Log output format
        #[arg(long, value_enum, default_value_t = LogFormat::Json)]
        log_format: LogFormat,
    },
    /// Validate configuration and catalog, then print a summary
    Check {
        #[arg(long, help = "Path to the station configuration file")]
        config: Option<PathBuf>,
        #[arg(long, help = "Path to the task catalog (TOML or JSON)")]
        catalog: Option<PathBuf>,
    },
    /// Write the default configuration as TOML
    InitConfig {
        #[arg(long, default_value = "workstation.toml", help = "Where to write the configuration")]
        output: PathBuf,
        /// Overwrite an existing file
        #[arg(long, help = "Overwrite the output file if it already exists")]
        force: bool,
    },
}
