use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::grid::{GridCell, GridMapper};
use crate::state::CombinationScope;

/// Default file looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "workstation.toml";

/// Main configuration structure for a workstation
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StationConfig {
    /// Static task, rule and product metadata
    pub catalog_path: PathBuf,
    pub station: StationSection,
    pub grid: GridConfig,
    pub confirmation: ConfirmationConfig,
    pub detection: DetectionConfig,
    pub hands: HandsConfig,
    pub timing: TimingConfig,
    pub topics: TopicsConfig,
    pub broker: BrokerConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StationSection {
    /// Identifier attached to logs
    pub id: String,
    /// Control loop period
    pub tick_interval_ms: u64,
    /// Log metric counters every this many ticks (0 disables)
    pub stats_every_ticks: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GridConfig {
    pub rows: u32,
    pub cols: u32,
    pub image_width: f64,
    pub image_height: f64,
}

/// Cells are addressed from the bottom-right corner of the grid
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub row_offset: u32,
    pub col_offset: u32,
    /// Cell highlighted red while rules fail; defaults to the confirmation cell
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_row_offset: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_col_offset: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Key prefix of the flat detection records (`yolo_0_class`, ...)
    pub key_prefix: String,
    pub frame_width: f64,
    pub frame_height: f64,
    /// Detections scoring below this are ignored
    pub min_score: f64,
    /// Normalized validation window, applied to both axes (exclusive bounds)
    pub window_min: f64,
    pub window_max: f64,
    pub combination_scope: CombinationScope,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HandsConfig {
    /// Hand readings older than this read as absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_after_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Give up on a subtask whose rules stay unsatisfied this long
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_timeout_ms: Option<u64>,
    /// Give up waiting for the confirmation gesture after this long
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TopicsConfig {
    pub detection: String,
    pub hands: String,
    pub assignment: String,
    pub projector: String,
    pub management: String,
    pub completion: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub keep_alive_secs: u64,
}

impl Default for StationSection {
    fn default() -> Self {
        Self {
            id: "workstation-1".to_string(),
            tick_interval_ms: 100,
            stats_every_ticks: 600,
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            rows: 5,
            cols: 5,
            image_width: 640.0,
            image_height: 480.0,
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            row_offset: 2,
            col_offset: 0,
            error_row_offset: None,
            error_col_offset: None,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            key_prefix: "yolo".to_string(),
            frame_width: 960.0,
            frame_height: 720.0,
            min_score: 0.6,
            window_min: 0.3,
            window_max: 0.7,
            combination_scope: CombinationScope::WholeMap,
        }
    }
}

impl Default for HandsConfig {
    fn default() -> Self {
        Self {
            stale_after_ms: Some(2000),
        }
    }
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            detection: "objdet/results".to_string(),
            hands: "hands/position".to_string(),
            assignment: "tasks/publish".to_string(),
            projector: "projector/control".to_string(),
            management: "management/interface".to_string(),
            completion: "v1/devices/me/telemetry".to_string(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            keep_alive_secs: 60,
        }
    }
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            station: StationSection::default(),
            grid: GridConfig::default(),
            confirmation: ConfirmationConfig::default(),
            detection: DetectionConfig::default(),
            hands: HandsConfig::default(),
            timing: TimingConfig::default(),
            topics: TopicsConfig::default(),
            broker: BrokerConfig::default(),
            catalog_path: PathBuf::from("config/catalog.toml"),
        }
    }
}

impl StationConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (`path`, or `workstation.toml` if present)
    /// 3. Environment variables (`WORKSTATION__GRID__ROWS=6`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                if !path.exists() {
                    bail!("configuration file {} does not exist", path.display());
                }
                builder = builder.add_source(File::from(path));
            }
            None => {
                if Path::new(DEFAULT_CONFIG_FILE).exists() {
                    builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("WORKSTATION")
                .separator("__")
                .try_parsing(true),
        );

        let config: StationConfig = builder
            .build()
            .context("failed to read configuration sources")?
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the station cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.grid.rows == 0 || self.grid.cols == 0 {
            bail!("grid must have at least one row and one column");
        }
        if !(self.grid.image_width > 0.0 && self.grid.image_height > 0.0) {
            bail!("grid image size must be positive");
        }
        if !(self.detection.frame_width > 0.0 && self.detection.frame_height > 0.0) {
            bail!("detection frame size must be positive");
        }
        if self.detection.window_min >= self.detection.window_max {
            bail!(
                "detection window_min ({}) must be below window_max ({})",
                self.detection.window_min,
                self.detection.window_max
            );
        }
        if self.station.tick_interval_ms == 0 {
            bail!("station.tick_interval_ms must be positive");
        }

        let (row_offset, col_offset) = self.error_offsets();
        for (name, row, col) in [
            ("confirmation", self.confirmation.row_offset, self.confirmation.col_offset),
            ("error", row_offset, col_offset),
        ] {
            if row >= self.grid.rows || col >= self.grid.cols {
                bail!(
                    "{name} cell offset ({row}, {col}) lies outside the {}x{} grid",
                    self.grid.rows,
                    self.grid.cols
                );
            }
        }
        Ok(())
    }

    fn error_offsets(&self) -> (u32, u32) {
        (
            self.confirmation
                .error_row_offset
                .unwrap_or(self.confirmation.row_offset),
            self.confirmation
                .error_col_offset
                .unwrap_or(self.confirmation.col_offset),
        )
    }

    pub fn grid_mapper(&self) -> GridMapper {
        GridMapper::new(
            self.grid.rows,
            self.grid.cols,
            self.grid.image_width,
            self.grid.image_height,
        )
    }

    /// Cell the operator touches to confirm a subtask
    pub fn confirmation_cell(&self) -> GridCell {
        self.grid_mapper()
            .offset_from_bottom_right(self.confirmation.row_offset, self.confirmation.col_offset)
    }

    /// Cell highlighted red while completion rules fail
    pub fn error_cell(&self) -> GridCell {
        let (row_offset, col_offset) = self.error_offsets();
        self.grid_mapper().offset_from_bottom_right(row_offset, col_offset)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.station.tick_interval_ms)
    }

    pub fn hand_stale_after(&self) -> Option<Duration> {
        self.hands.stale_after_ms.map(Duration::from_millis)
    }

    pub fn execution_timeout(&self) -> Option<Duration> {
        self.timing.execution_timeout_ms.map(Duration::from_millis)
    }

    pub fn confirmation_timeout(&self) -> Option<Duration> {
        self.timing.confirmation_timeout_ms.map(Duration::from_millis)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}
