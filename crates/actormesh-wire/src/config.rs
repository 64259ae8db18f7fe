//! Configuration loading.

use actormesh_types::config::MeshConfig;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Load configuration from `path`, or from [`default_config_path`] when
/// `None`. A missing, unreadable or invalid file yields the defaults.
pub fn load_config(path: Option<&Path>) -> MeshConfig {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        info!(path = %config_path.display(), "Config file not found, using defaults");
        return MeshConfig::default();
    }
    let contents = match std::fs::read_to_string(&config_path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(error = %e, path = %config_path.display(), "Failed to read config, using defaults");
            return MeshConfig::default();
        }
    };
    match toml::from_str::<MeshConfig>(&contents) {
        Ok(config) => match config.validate() {
            Ok(()) => {
                info!(path = %config_path.display(), "Loaded configuration");
                config
            }
            Err(e) => {
                warn!(error = %e, path = %config_path.display(), "Invalid config, using defaults");
                MeshConfig::default()
            }
        },
        Err(e) => {
            warn!(error = %e, path = %config_path.display(), "Failed to parse config, using defaults");
            MeshConfig::default()
        }
    }
}

/// `~/.actormesh/config.toml`, under the temp dir if there is no home.
pub fn default_config_path() -> PathBuf {
    actormesh_home().join("config.toml")
}

/// `~/.actormesh`.
pub fn actormesh_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".actormesh")
}
