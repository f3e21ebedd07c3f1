//! Client configuration management

use anyhow::{Context, Result, anyhow};
use protocol::{CLIENT_PORT, SERVER_PORT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub client: ClientSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Server hosts scanned in order when no explicit host is given
    #[serde(default)]
    pub servers: Vec<String>,
    /// TCP port the server daemons listen on
    #[serde(default = "ClientSettings::default_server_port")]
    pub server_port: u16,
    /// Address the local client service binds to
    #[serde(default = "ClientSettings::default_service_bind")]
    pub service_bind: String,
    /// TCP port of the local client service
    #[serde(default = "ClientSettings::default_service_port")]
    pub service_port: u16,
    /// Per-host connect/read timeout for server requests, in seconds
    #[serde(default = "ClientSettings::default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Polling attempts while waiting for an attached port to materialize
    #[serde(default = "ClientSettings::default_attach_retries")]
    pub attach_retries: u32,
    #[serde(default = "ClientSettings::default_log_level")]
    pub log_level: String,
}

impl ClientSettings {
    fn default_server_port() -> u16 {
        SERVER_PORT
    }

    fn default_service_bind() -> String {
        // The client service takes local attach/detach commands only
        "127.0.0.1".to_string()
    }

    fn default_service_port() -> u16 {
        CLIENT_PORT
    }

    fn default_connect_timeout_secs() -> u64 {
        5
    }

    fn default_attach_retries() -> u32 {
        20
    }

    fn default_log_level() -> String {
        "info".to_string()
    }

    /// Per-host request timeout as a Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client: ClientSettings {
                servers: Vec::new(),
                server_port: ClientSettings::default_server_port(),
                service_bind: ClientSettings::default_service_bind(),
                service_port: ClientSettings::default_service_port(),
                connect_timeout_secs: ClientSettings::default_connect_timeout_secs(),
                attach_retries: ClientSettings::default_attach_retries(),
                log_level: ClientSettings::default_log_level(),
            },
        }
    }
}

impl ClientConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/usb-remote/client.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: ClientConfig = toml::from_str(&content)
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
            config_dir.join("usb-remote").join("client.toml")
        } else {
            PathBuf::from(".config/usb-remote/client.toml")
        }
    }

    /// Resolve the host list for a scan
    ///
    /// An explicit host overrides the configured servers; with neither, the
    /// scan falls back to localhost so a single-machine setup works out of
    /// the box.
    pub fn host_list(&self, explicit: Option<&str>) -> Vec<String> {
        if let Some(host) = explicit {
            return vec![host.to_string()];
        }
        if self.client.servers.is_empty() {
            tracing::warn!("No servers configured, defaulting to localhost");
            return vec!["localhost".to_string()];
        }
        self.client.servers.clone()
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.client.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.client.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.client.server_port == 0 || self.client.service_port == 0 {
            return Err(anyhow!("Ports must be non-zero"));
        }

        if self.client.connect_timeout_secs == 0 {
            return Err(anyhow!("connect_timeout_secs must be non-zero"));
        }

        Ok(())
    }
}

/// Load a configuration from a tilde-style path
#[allow(dead_code)]
pub fn load_config(path: &str) -> Result<ClientConfig> {
    let path_buf = PathBuf::from(shellexpand::tilde(path).as_ref());
    ClientConfig::load(Some(path_buf))
}
