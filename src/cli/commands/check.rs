use anyhow::{bail, Result};
use std::path::PathBuf;
use workstation_brain::RuleEvaluator;

use super::{load_station, Command};

pub struct CheckCommand {
    pub config: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
}

impl CheckCommand {
    pub fn new(config: Option<PathBuf>, catalog: Option<PathBuf>) -> Self {
        Self { config, catalog }
    }
}

impl Command for CheckCommand {
    async fn execute(&self) -> Result<()> {
        println!("🔍 WORKSTATION CHECK");
        println!("====================");

        let (config, catalog, catalog_path) =
            load_station(self.config.as_deref(), self.catalog.as_deref())?;

        println!("✅ Configuration: station '{}'", config.station.id);
        println!(
            "   Grid {}x{}, confirmation cell {}, error cell {}",
            config.grid.rows,
            config.grid.cols,
            config.confirmation_cell().label(),
            config.error_cell().label()
        );
        println!("   Tick interval: {} ms", config.station.tick_interval_ms);
        println!(
            "✅ Catalog {}: {} tasks, {} subtasks, {} rules, {} products",
            catalog_path.display(),
            catalog.tasks.len(),
            catalog.subtask_count(),
            catalog.rules.len(),
            catalog.products.len()
        );

        for rule_id in catalog.unused_rules() {
            println!("⚠️  Rule '{rule_id}' is not referenced by any subtask");
        }

        let evaluator = RuleEvaluator::compile(catalog.rule_conditions());
        let invalid = evaluator.invalid_rules();
        if !invalid.is_empty() {
            for (rule_id, error) in &invalid {
                println!("❌ Rule '{rule_id}': {error}");
            }
            bail!("{} rule(s) failed to parse", invalid.len());
        }

        println!("✅ All {} rules parse", evaluator.len());
        Ok(())
    }
}
