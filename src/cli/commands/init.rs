use anyhow::{bail, Result};
use std::path::PathBuf;
use workstation_brain::StationConfig;

use super::Command;

pub struct InitConfigCommand {
    pub output: PathBuf,
    pub force: bool,
}

impl InitConfigCommand {
    pub fn new(output: PathBuf, force: bool) -> Self {
        Self { output, force }
    }
}

impl Command for InitConfigCommand {
    async fn execute(&self) -> Result<()> {
        if self.output.exists() && !self.force {
            bail!(
                "{} already exists; use --force to overwrite it",
                self.output.display()
            );
        }

        StationConfig::default().save_to_file(&self.output)?;
        println!("✅ Wrote default configuration to {}", self.output.display());
        println!("   Next: point catalog_path at your task catalog, then run 'workstation-brain check'");
        Ok(())
    }
}
