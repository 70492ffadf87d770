//! Tracing subscriber setup

use std::fs;

use eyre::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured level when set. Returns
/// Ok without changes if a subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).context("Invalid log level")?,
    };

    if config.to_file {
        let path = config.log_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create log directory")?;
        }
        let log_file = fs::File::create(&path).context("Failed to create log file")?;

        let installed = tracing_subscriber::fmt()
            .with_writer(log_file)
            .with_ansi(false)
            .with_env_filter(filter)
            .try_init()
            .is_ok();
        if installed {
            tracing::info!("Logging initialized (level: {}, file: {})", config.level, path.display());
        }
    } else {
        let installed = tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .try_init()
            .is_ok();
        if installed {
            tracing::info!("Logging initialized (level: {})", config.level);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LoggingConfig::default();
        assert!(init(&config).is_ok());
        assert!(init(&config).is_ok());
    }

    #[test]
    fn test_file_logging_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            level: "debug".into(),
            to_file: true,
            file: Some(dir.path().join("nested").join("test.log")),
        };
        assert!(init(&config).is_ok());
        assert!(dir.path().join("nested").join("test.log").exists());
    }
}
