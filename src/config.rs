use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::channel::{ChannelError, ChannelPlan, FrequencySpec};
use crate::device::{InventoryParams, Session, TargetMode};
use crate::error::ReaderError;
use crate::hopper::HopPlan;

pub const CONFIG_ENV_VAR: &str = "UHFSCAN_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("invalid inventory settings: {0}")]
    Inventory(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    #[serde(rename = "address")]
    pub mac_address: String,
    pub ip: String,
    pub port: u16,
    pub verbose: bool,
    pub power: u8,
    pub beep: bool,
    pub antennas: AntennaConfig,
    pub inventory: InventoryConfig,
    pub frequency: FrequencyConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            mac_address: "2C-AC-44-04-97-01".to_string(),
            ip: "192.168.1.200".to_string(),
            port: 2022,
            verbose: false,
            power: 30,
            beep: true,
            antennas: AntennaConfig::default(),
            inventory: InventoryConfig::default(),
            frequency: FrequencyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntennaConfig {
    pub num: usize,
    /// One-based antenna position -> enabled.
    pub map: BTreeMap<u8, bool>,
}

impl Default for AntennaConfig {
    fn default() -> Self {
        Self { num: 4, map: BTreeMap::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    pub session: u8,
    pub q_value: u8,
    pub scan_time: u8,
    pub target: TargetMode,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        let params = InventoryParams::default();
        Self {
            session: params.session.code(),
            q_value: params.q_value,
            scan_time: params.scan_time,
            target: params.target_mode,
        }
    }
}

impl InventoryConfig {
    pub fn to_params(&self) -> Result<InventoryParams, ConfigError> {
        let session = Session::from_code(self.session)
            .ok_or_else(|| ConfigError::Inventory(format!("session must be 0..3, got {}", self.session)))?;
        InventoryParams::new(self.q_value, session, self.target, self.scan_time).map_err(|e| match e {
            ReaderError::Validation(message) => ConfigError::Inventory(message),
            other => ConfigError::Inventory(other.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyConfig {
    /// Hop interval in milliseconds; 0 disables hopping.
    pub interval: u64,
    pub specs: Vec<FrequencySpec>,
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self { interval: 1_000, specs: Vec::new() }
    }
}

impl FrequencyConfig {
    /// `None` when no specs are configured.
    pub fn hop_plan(&self, plan: &ChannelPlan) -> Result<Option<HopPlan>, ConfigError> {
        if self.specs.is_empty() {
            return Ok(None);
        }
        Ok(Some(HopPlan::from_specs(plan, &self.specs, self.interval)?))
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Explicit path first, then `UHFSCAN_CONFIG`, then built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) if !path.is_empty() => Self::from_file(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
