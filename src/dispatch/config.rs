//! Dispatch daemon configuration

use std::time::Duration;

use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};

/// Dispatch daemon configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Delay before the first pass
    #[serde(rename = "startup-delay-ms")]
    pub startup_delay_ms: u64,

    /// Time between passes
    #[serde(rename = "period-ms")]
    pub period_ms: u64,

    /// Upper bound on iterations within one pass
    #[serde(rename = "max-iterations")]
    pub max_iterations: u32,

    /// Capacity of the assignment channel
    #[serde(rename = "channel-buffer")]
    pub channel_buffer: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            startup_delay_ms: 1_000,
            period_ms: 1_000,
            max_iterations: 5,
            channel_buffer: 256,
        }
    }
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(eyre!("dispatch max-iterations must be at least 1"));
        }
        if self.period_ms == 0 {
            return Err(eyre!("dispatch period-ms must be greater than 0"));
        }
        if self.channel_buffer == 0 {
            return Err(eyre!("dispatch channel-buffer must be greater than 0"));
        }
        Ok(())
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}
