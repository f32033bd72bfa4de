//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `hub.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - ServerConfig: bind address and port for the relay API.
//!     - SessionsConfig: staleness threshold for ready measurements.
//!     - LoggingConfig: log level for the tracing subscriber.
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct HubConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// file the configuration was loaded from, if any
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionsConfig {
    /// a ready measurement older than this is reported as stale
    pub stale_after_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

impl HubConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let mut config: HubConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;

        config.source = Some(path.as_ref().to_path_buf());
        Ok(config)
    }

    /// Load with default fallback
    pub fn load_or_default() -> Self {
        let paths = [
            PathBuf::from("config").join("hub.toml"),
            PathBuf::from("hub.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => return config,
                    Err(e) => {
                        eprintln!("[CONFIG] Warning: Failed to load {}: {}", path.display(), e)
                    }
                }
            }
        }

        Self::default()
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.sessions.stale_after_seconds)
    }

    /// Log a configuration summary (call after the subscriber is up)
    pub fn log_summary(&self) {
        match &self.source {
            Some(path) => info!(path = %path.display(), "configuration loaded"),
            None => info!("no config file found, using defaults"),
        }
        info!(
            bind = %self.server.bind,
            port = self.server.port,
            stale_after_seconds = self.sessions.stale_after_seconds,
            level = %self.logging.level,
            "relay configuration"
        );
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            sessions: SessionsConfig::default(),
            logging: LoggingConfig::default(),
            source: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            stale_after_seconds: 300,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_thresholds() {
        let config = HubConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.stale_after(), Duration::from_secs(300));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config: HubConfig = toml::from_str(
            r#"
            [sessions]
            stale_after_seconds = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.sessions.stale_after_seconds, 60);
        assert_eq!(config.server.bind, "0.0.0.0");
    }
}
