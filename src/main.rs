use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use workstation_brain::{init_telemetry, LogFormat};

mod cli;

use cli::commands::{check::CheckCommand, init::InitConfigCommand, run::RunCommand, Command};
use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            catalog,
            log_format,
        } => {
            init_telemetry(log_format)?;
            let runtime = tokio::runtime::Runtime::new()?;
            let result = runtime.block_on(async { RunCommand::new(config, catalog).execute().await });
            // stdin reads park a blocking thread that never finishes on its own
            runtime.shutdown_timeout(Duration::from_secs(1));
            result
        }
        Commands::Check { config, catalog } => {
            init_telemetry(LogFormat::Pretty)?;
            tokio::runtime::Runtime::new()?.block_on(async {
                CheckCommand::new(config, catalog).execute().await
            })
        }
        Commands::InitConfig { output, force } => {
            tokio::runtime::Runtime::new()?.block_on(async {
                InitConfigCommand::new(output, force).execute().await
            })
        }
    }
}
