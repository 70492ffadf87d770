//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default convergence wait for tasks without node affinity
pub const DEFAULT_CONVERGENCE_WAIT_MS: u64 = 5_000;

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// How long a card must have been registered before an unpinned task may run
    #[serde(rename = "convergence-wait-ms", default = "default_convergence_wait_ms")]
    pub convergence_wait_ms: u64,
}

fn default_convergence_wait_ms() -> u64 {
    debug!("default_convergence_wait_ms: called");
    DEFAULT_CONVERGENCE_WAIT_MS
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        debug!("CoordinatorConfig::default: called");
        Self {
            convergence_wait_ms: DEFAULT_CONVERGENCE_WAIT_MS,
        }
    }
}

impl CoordinatorConfig {
    /// Config with an explicit convergence wait
    pub fn with_convergence_wait(wait: Duration) -> Self {
        Self {
            convergence_wait_ms: wait.as_millis() as u64,
        }
    }

    /// Get the convergence wait as a Duration
    pub fn convergence_wait(&self) -> Duration {
        debug!(convergence_wait_ms = %self.convergence_wait_ms, "CoordinatorConfig::convergence_wait: called");
        Duration::from_millis(self.convergence_wait_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.convergence_wait_ms, 5_000);
    }

    #[test]
    fn test_convergence_wait_duration() {
        let config = CoordinatorConfig::with_convergence_wait(Duration::from_millis(250));
        assert_eq!(config.convergence_wait(), Duration::from_millis(250));
    }

    #[test]
    fn test_missing_field_uses_default() {
        let config: CoordinatorConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, CoordinatorConfig::default());
    }
}
