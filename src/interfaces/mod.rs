//! Narrow contracts to external collaborators
//!
//! Transport, payload encoding, persistence, process identity and task
//! execution are supplied by the embedding service.

use async_trait::async_trait;
use eyre::{Context, Result};
use serde_json::Value;
use tracing::debug;

use crate::domain::Task;

/// Sends bytes to a resolved address
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a payload and return the peer's response
    async fn send(&self, target: &str, payload: Vec<u8>) -> Result<Vec<u8>>;
}

/// Opaque payload encoding
pub trait PayloadCodec: Send + Sync {
    fn encode(&self, value: &Value) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<Value>;
}

/// JSON codec
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        serde_json::to_vec(value).context("Failed to encode payload")
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        serde_json::from_slice(bytes).context("Failed to decode payload")
    }
}

/// Writes records to durable storage
#[async_trait]
pub trait PersistenceWriter: Send + Sync {
    /// Persist a record and return its storage id
    async fn write(&self, record: &Value) -> Result<String>;
}

/// Supplies this process's identity for affinity checks
pub trait ProcessIdentity: Send + Sync {
    fn process_id(&self) -> String;
}

/// Fixed process identity
#[derive(Debug, Clone)]
pub struct StaticIdentity(String);

impl StaticIdentity {
    pub fn new(process_id: impl Into<String>) -> Self {
        Self(process_id.into())
    }

    /// Identity derived from the host's process id
    pub fn from_process() -> Self {
        let id = format!("proc-{}", std::process::id());
        debug!(%id, "StaticIdentity::from_process: called");
        Self(id)
    }
}

impl ProcessIdentity for StaticIdentity {
    fn process_id(&self) -> String {
        self.0.clone()
    }
}

/// Executes a task on behalf of a participant
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Run the task and return a short summary
    async fn execute(&self, participant: &str, task: &Task) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_codec_roundtrip() {
        let codec = JsonCodec;
        let value = json!({"kind": "audit", "n": 3});
        let bytes = codec.encode(&value).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), value);
    }

    #[test]
    fn test_json_codec_rejects_garbage() {
        let err = JsonCodec.decode(b"{not json").unwrap_err();
        assert!(err.to_string().contains("decode"));
    }

    #[test]
    fn test_static_identity() {
        assert_eq!(StaticIdentity::new("node-a").process_id(), "node-a");
        assert!(StaticIdentity::from_process().process_id().starts_with("proc-"));
    }
}
