//! Server configuration management

use anyhow::{Context, Result, anyhow};
use protocol::SERVER_PORT;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Address the command server binds to
    #[serde(default = "ServerSettings::default_bind_addr")]
    pub bind_addr: String,
    /// TCP port of the command server
    #[serde(default = "ServerSettings::default_port")]
    pub port: u16,
    #[serde(default = "ServerSettings::default_log_level")]
    pub log_level: String,
}

impl ServerSettings {
    fn default_bind_addr() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        SERVER_PORT
    }

    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                bind_addr: ServerSettings::default_bind_addr(),
                port: ServerSettings::default_port(),
                log_level: ServerSettings::default_log_level(),
            },
        }
    }
}

impl ServerConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/usb-remote/server.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: ServerConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usb-remote").join("server.toml")
        } else {
            PathBuf::from(".config/usb-remote/server.toml")
        }
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.server.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.server.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.server.port == 0 {
            return Err(anyhow!("Server port must be non-zero"));
        }

        Ok(())
    }
}

/// Load a configuration from a tilde-style path
#[allow(dead_code)]
pub fn load_config(path: &str) -> Result<ServerConfig> {
    let path_buf = PathBuf::from(shellexpand::tilde(path).as_ref());
    ServerConfig::load(Some(path_buf))
}
