//! Optional `tau.toml` configuration. Everything has a default, so the file
//! may be absent, empty, or partial.

use std::fs;
use std::path::Path;

use log::debug;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Number of general-purpose registers the spawned VM gets.
    pub registers: usize,
    /// Number of float registers.
    pub float_registers: usize,
    /// RAM size in cells.
    pub ram: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            registers: 8,
            float_registers: 4,
            ram: 1024,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub vm: VmConfig,
}

const CONFIG_FILE: &str = "tau.toml";

/// Loads the configuration from `path`, or from `tau.toml` in the working
/// directory when no path is given. A missing file yields the defaults; a
/// malformed one is an error.
pub fn load(path: Option<&Path>) -> Result<Config, String> {
    let path = path.unwrap_or(Path::new(CONFIG_FILE));
    if !path.exists() {
        debug!("no config at '{}', using defaults", path.display());
        return Ok(Config::default());
    }
    let content = fs::read_to_string(path)
        .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
    toml::from_str(&content).map_err(|e| format!("malformed '{}': {}", path.display(), e))
}
