//! File-backed configuration for both simulators.
//!
//! A config file is a single JSON object with optional `health` and `fleet`
//! sections. Missing sections and fields take their defaults, so `{}` is a
//! valid file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::fleet::FleetConfig;
use crate::health::HealthConfig;

/// Combined configuration as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub health: HealthConfig,
    pub fleet: FleetConfig,
}

/// Read a [`SimulationConfig`] from a JSON file.
///
/// Parse failures surface as [`std::io::ErrorKind::InvalidData`]. Values are
/// not normalized here; each simulator normalizes its own section on
/// construction.
pub fn load_config_from_path(path: &Path) -> std::io::Result<SimulationConfig> {
    let raw = std::fs::read_to_string(path)?;
    let config = serde_json::from_str::<SimulationConfig>(&raw).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("failed to parse config {}: {e}", path.display()),
        )
    })?;
    log::debug!("loaded config from {}", path.display());
    Ok(config)
}
