//! parcelcoord configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::coordinator::CoordinatorConfig;
use crate::dispatch::DispatchConfig;
use crate::forward::ForwardConfig;

/// Main parcelcoord configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Execution-privilege settings
    pub coordinator: CoordinatorConfig,

    /// Local dispatch daemon settings
    pub dispatch: DispatchConfig,

    /// Forward queue settings
    pub forwarding: ForwardConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// Identity of this process; derived from the OS pid when unset
    #[serde(rename = "process-id")]
    pub process_id: Option<String>,
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        self.dispatch.validate().context("Invalid dispatch config")?;
        self.forwarding.validate().context("Invalid forwarding config")?;
        if self.process_id.as_deref().is_some_and(str::is_empty) {
            return Err(eyre::eyre!("process-id must not be empty when set"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .parcelcoord.yml
        let local_config = PathBuf::from(".parcelcoord.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/parcelcoord/parcelcoord.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("parcelcoord").join("parcelcoord.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level directive, overridden per target by RUST_LOG
    pub level: String,

    /// Write to a file instead of stderr
    #[serde(rename = "to-file")]
    pub to_file: bool,

    /// Log file path; defaults under the local data dir
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            to_file: false,
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Log file location when writing to a file
    pub fn log_path(&self) -> PathBuf {
        self.file.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("parcelcoord")
                .join("logs")
                .join("parcelcoord.log")
        })
    }
}
