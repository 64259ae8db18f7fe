//! Configuration types for an actormesh node.
//!
//! All sections use `#[serde(default)]` so a partial (or empty) TOML file is
//! valid; missing fields take the defaults below.

use crate::error::{TypeError, TypeResult};
use serde::{Deserialize, Serialize};

/// Default application identifier exchanged during handshakes.
pub const DEFAULT_APP_IDENTIFIER: &str = "generic-actormesh-app";

/// Default maximum payload size of a single frame (16 MB).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Protocol engine settings.
    pub wire: WireConfig,
    /// Logging settings.
    pub log: LogConfig,
}

impl MeshConfig {
    /// Check every section.
    pub fn validate(&self) -> TypeResult<()> {
        self.wire.validate()
    }
}

/// Protocol engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WireConfig {
    /// Nodes only talk to peers announcing the exact same identifier.
    pub app_identifier: String,
    /// Largest accepted payload length. Larger frames fault the connection
    /// before any buffer is allocated.
    pub max_frame_size: u32,
    /// Period of the heartbeat trigger in milliseconds (0 = disabled). The
    /// host's timer uses this; the engine only reacts to ticks.
    pub heartbeat_interval_ms: u64,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            app_identifier: DEFAULT_APP_IDENTIFIER.to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            heartbeat_interval_ms: 0,
        }
    }
}

impl WireConfig {
    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> TypeResult<()> {
        if self.app_identifier.is_empty() {
            return Err(TypeError::InvalidConfig(
                "wire.app_identifier must not be empty".to_string(),
            ));
        }
        if self.max_frame_size == 0 {
            return Err(TypeError::InvalidConfig(
                "wire.max_frame_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Heartbeat period, or `None` when disabled.
    pub fn heartbeat_interval(&self) -> Option<std::time::Duration> {
        (self.heartbeat_interval_ms > 0)
            .then(|| std::time::Duration::from_millis(self.heartbeat_interval_ms))
    }
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MeshConfig::default();
        assert_eq!(config.wire.app_identifier, DEFAULT_APP_IDENTIFIER);
        assert_eq!(config.wire.max_frame_size, 16 * 1024 * 1024);
        assert!(config.wire.heartbeat_interval().is_none());
        assert_eq!(config.log.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: MeshConfig = toml::from_str(
            r#"
            [wire]
            app_identifier = "bank"
            heartbeat_interval_ms = 500

            [log]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.wire.app_identifier, "bank");
        assert_eq!(config.wire.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
        assert_eq!(
            config.wire.heartbeat_interval(),
            Some(std::time::Duration::from_millis(500))
        );
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut wire = WireConfig::default();
        wire.max_frame_size = 0;
        assert!(matches!(wire.validate(), Err(TypeError::InvalidConfig(_))));

        let mut wire = WireConfig::default();
        wire.app_identifier.clear();
        assert!(wire.validate().is_err());
    }
}
