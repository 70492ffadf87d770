//! Forward queue configuration

use std::time::Duration;

use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};

/// How a flush treats delivery failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryPolicy {
    /// Take everything, deliver in order, drop the rest on the first failure
    DrainThenSend,
    /// Deliver the head and remove it only on success
    SendThenRemove,
}

impl std::fmt::Display for DeliveryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DrainThenSend => write!(f, "drain-then-send"),
            Self::SendThenRemove => write!(f, "send-then-remove"),
        }
    }
}

/// Settings for one forward queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(rename = "initial-delay-ms", default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(rename = "period-ms", default = "default_period_ms")]
    pub period_ms: u64,

    pub policy: DeliveryPolicy,

    /// Transport address of the collector
    pub target: String,
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_period_ms() -> u64 {
    5_000
}

impl QueueConfig {
    pub fn new(policy: DeliveryPolicy, target: impl Into<String>) -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            period_ms: default_period_ms(),
            policy,
            target: target.into(),
        }
    }

    pub fn with_timing(mut self, initial_delay_ms: u64, period_ms: u64) -> Self {
        self.initial_delay_ms = initial_delay_ms;
        self.period_ms = period_ms;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.period_ms == 0 {
            return Err(eyre!("forward queue period-ms must be greater than 0"));
        }
        if self.target.is_empty() {
            return Err(eyre!("forward queue target must not be empty"));
        }
        Ok(())
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// Settings for the four standard queues
///
/// Each queue section may be partial; missing keys fall back to that
/// queue's own defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ForwardConfigFile")]
pub struct ForwardConfig {
    pub audit: QueueConfig,
    pub metrics: QueueConfig,
    pub topology: QueueConfig,
    pub subscriptions: QueueConfig,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            audit: QueueConfig::new(DeliveryPolicy::SendThenRemove, "audit-collector"),
            metrics: QueueConfig::new(DeliveryPolicy::DrainThenSend, "metrics-collector"),
            topology: QueueConfig::new(DeliveryPolicy::DrainThenSend, "topology-collector"),
            subscriptions: QueueConfig::new(DeliveryPolicy::DrainThenSend, "subscription-collector"),
        }
    }
}

impl ForwardConfig {
    pub fn validate(&self) -> Result<()> {
        self.audit.validate()?;
        self.metrics.validate()?;
        self.topology.validate()?;
        self.subscriptions.validate()
    }
}

/// Queue section as written in the config file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QueueOverrides {
    #[serde(rename = "initial-delay-ms")]
    initial_delay_ms: Option<u64>,
    #[serde(rename = "period-ms")]
    period_ms: Option<u64>,
    policy: Option<DeliveryPolicy>,
    target: Option<String>,
}

impl QueueOverrides {
    fn apply(self, base: QueueConfig) -> QueueConfig {
        QueueConfig {
            initial_delay_ms: self.initial_delay_ms.unwrap_or(base.initial_delay_ms),
            period_ms: self.period_ms.unwrap_or(base.period_ms),
            policy: self.policy.unwrap_or(base.policy),
            target: self.target.unwrap_or(base.target),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ForwardConfigFile {
    audit: QueueOverrides,
    metrics: QueueOverrides,
    topology: QueueOverrides,
    subscriptions: QueueOverrides,
}

impl From<ForwardConfigFile> for ForwardConfig {
    fn from(file: ForwardConfigFile) -> Self {
        let defaults = Self::default();
        Self {
            audit: file.audit.apply(defaults.audit),
            metrics: file.metrics.apply(defaults.metrics),
            topology: file.topology.apply(defaults.topology),
            subscriptions: file.subscriptions.apply(defaults.subscriptions),
        }
    }
}
