use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use workstation_brain::{StationConfig, TaskCatalog};

pub mod check;
pub mod init;
pub mod run;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}

/// Load configuration and the catalog it points at, or the `catalog` override
pub fn load_station(
    config: Option<&Path>,
    catalog: Option<&Path>,
) -> Result<(Arc<StationConfig>, Arc<TaskCatalog>, PathBuf)> {
    StationConfig::load_env_file()?;
    let config = StationConfig::load(config).context("invalid station configuration")?;
    let catalog_path = catalog
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.catalog_path.clone());
    let catalog = TaskCatalog::load(&catalog_path)
        .with_context(|| format!("invalid task catalog {}", catalog_path.display()))?;
    Ok((Arc::new(config), Arc::new(catalog), catalog_path))
}
