//! Configuration file handling.
//!
//! Reads from `~/.config/vaultlink/vaultlink.toml`

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the vault CLI binary.
    #[serde(default = "default_cli_path")]
    pub cli_path: PathBuf,
    /// Port the spawned API server listens on.
    #[serde(default = "default_serve_port")]
    pub serve_port: u16,
    /// App-data directory handed to the spawned CLI; deleted on logout.
    #[serde(default = "default_app_data_dir")]
    pub app_data_dir: PathBuf,
    /// URL of the release manifest used for `vaultlink update`.
    #[serde(default)]
    pub update_manifest_url: Option<String>,
    /// Whether to re-lock the vault after every operation.
    #[serde(default = "default_auto_lock")]
    pub auto_lock: bool,
    /// URI scheme used for item back-references.
    #[serde(default = "default_marker_scheme")]
    pub marker_scheme: String,
    /// Field name used for back-references on non-login items.
    #[serde(default = "default_marker_field")]
    pub marker_field: String,
}

fn vaultlink_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vaultlink")
}

fn default_cli_path() -> PathBuf {
    vaultlink_data_dir().join("bw")
}

fn default_serve_port() -> u16 {
    8087
}

fn default_app_data_dir() -> PathBuf {
    vaultlink_data_dir().join("cli-data")
}

fn default_auto_lock() -> bool {
    true
}

fn default_marker_scheme() -> String {
    vaultlink_core::reconcile::DEFAULT_SCHEME.to_string()
}

fn default_marker_field() -> String {
    vaultlink_core::reconcile::DEFAULT_MARKER_FIELD.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cli_path: default_cli_path(),
            serve_port: default_serve_port(),
            app_data_dir: default_app_data_dir(),
            update_manifest_url: None,
            auto_lock: default_auto_lock(),
            marker_scheme: default_marker_scheme(),
            marker_field: default_marker_field(),
        }
    }
}

impl Config {
    /// Load configuration from the config file.
    ///
    /// If `custom_path` is provided, load from that path.
    /// Otherwise, load from the default XDG config location.
    /// Creates a default config file if it doesn't exist (only for default path).
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self> {
        let is_custom = custom_path.is_some();
        let config_path = match custom_path {
            Some(path) => path,
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            // Only create default config for the default path
            if !is_custom {
                let config = Config::default();
                config.save()?;
                tracing::info!("Created default config: {:?}", config);
                return Ok(config);
            } else {
                anyhow::bail!("Config file not found: {}", config_path.display());
            }
        }

        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        tracing::debug!("Loaded config from {}", config_path.display());
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        // Ensure config directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))
    }

    /// Get the path to the config file.
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("vaultlink").join("vaultlink.toml"))
    }
}
