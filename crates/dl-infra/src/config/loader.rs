//! Configuration loader.
//!
//! Reads a TOML file and hands the parsed value to `AppConfig::from_toml`.
//! Missing keys are resolved to defaults there, not here.

use anyhow::Context;
use std::path::PathBuf;

use dl_core::config::AppConfig;

/// Load configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid TOML, or holds
/// a value of the wrong type for a known key.
pub fn load_config(config_path: PathBuf) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
    let toml_value: toml::Value =
        toml::from_str(&content).context("Failed to parse config as TOML")?;
    AppConfig::from_toml(&toml_value)
        .with_context(|| format!("Invalid config file: {}", config_path.display()))
}
