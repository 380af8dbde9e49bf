//! Config file resolution.

use std::path::{Path, PathBuf};

use dl_core::config::AppConfig;
use dl_infra::load_config;

pub const DEFAULT_CONFIG_FILE: &str = "devlink.toml";

/// Pick the config file: an explicit path wins, otherwise `devlink.toml` in
/// `search_dir` if it exists.
pub fn resolve_config_path(explicit: Option<PathBuf>, search_dir: &Path) -> Option<PathBuf> {
    if explicit.is_some() {
        return explicit;
    }
    let candidate = search_dir.join(DEFAULT_CONFIG_FILE);
    candidate.is_file().then_some(candidate)
}

/// Load the resolved config, or defaults when there is no file.
pub fn load_app_config(explicit: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let cwd = std::env::current_dir()?;
    match resolve_config_path(explicit, &cwd) {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Loading config");
            load_config(path)
        }
        None => {
            tracing::debug!("No config file found, using defaults");
            Ok(AppConfig::default())
        }
    }
}
