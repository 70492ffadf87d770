//! Delivery step for forward queues

use std::sync::Arc;

use async_trait::async_trait;
use eyre::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::interfaces::{PayloadCodec, PersistenceWriter, Transport};

/// Sends one queued item somewhere
#[async_trait]
pub trait Deliverer<T>: Send + Sync {
    async fn deliver(&self, item: &T) -> Result<()>;
}

/// Encodes items and sends them to a fixed transport target
pub struct TransportDeliverer {
    transport: Arc<dyn Transport>,
    codec: Arc<dyn PayloadCodec>,
    target: String,
}

impl TransportDeliverer {
    pub fn new(transport: Arc<dyn Transport>, codec: Arc<dyn PayloadCodec>, target: impl Into<String>) -> Self {
        Self {
            transport,
            codec,
            target: target.into(),
        }
    }
}

#[async_trait]
impl<T> Deliverer<T> for TransportDeliverer
where
    T: Serialize + Send + Sync,
{
    async fn deliver(&self, item: &T) -> Result<()> {
        let value = serde_json::to_value(item).context("Failed to serialize observation")?;
        let bytes = self.codec.encode(&value)?;
        debug!(target = %self.target, size = bytes.len(), "TransportDeliverer::deliver: sending");
        self.transport
            .send(&self.target, bytes)
            .await
            .with_context(|| format!("Failed to send to {}", self.target))?;
        Ok(())
    }
}

/// Writes items through the persistence collaborator
pub struct PersistenceDeliverer {
    writer: Arc<dyn PersistenceWriter>,
}

impl PersistenceDeliverer {
    pub fn new(writer: Arc<dyn PersistenceWriter>) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl<T> Deliverer<T> for PersistenceDeliverer
where
    T: Serialize + Send + Sync,
{
    async fn deliver(&self, item: &T) -> Result<()> {
        let value = serde_json::to_value(item).context("Failed to serialize record")?;
        let id = self.writer.write(&value).await.context("Failed to persist record")?;
        debug!(%id, "PersistenceDeliverer::deliver: persisted");
        Ok(())
    }
}
