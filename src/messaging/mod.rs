// ============================================================================
// Work Queue - at-least-once message delivery between stages
// ============================================================================
//
// Publishing goes through WorkQueue, consuming through MessageSource.
// Backends:
// - redpanda - Kafka protocol via rdkafka
// - memory   - tokio channels for local runs and tests
//
// ============================================================================

mod memory;
mod redpanda;

use async_trait::async_trait;

use crate::health::ComponentHealth;
use crate::utils::CircuitState;

pub use memory::{InMemoryQueue, InMemorySource};
pub use redpanda::{RedpandaClient, RedpandaSource};

pub type MessageId = String;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Circuit breaker open for queue {0}")]
    CircuitOpen(String),

    #[error("Failed to publish to {queue}: {reason}")]
    Publish { queue: String, reason: String },

    #[error("Failed to consume: {0}")]
    Consume(String),
}

/// A message handed to a consumer.
///
/// `partition` and `offset` locate the message in a Kafka topic; in-memory
/// deliveries leave them unset.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveredMessage {
    pub message_id: MessageId,
    pub queue: String,
    pub key: Option<String>,
    pub body: Vec<u8>,
    pub partition: Option<i32>,
    pub offset: Option<i64>,
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Publish one message. `key` groups related messages (the order id).
    async fn publish(&self, queue: &str, key: &str, payload: &[u8]) -> Result<MessageId, QueueError>;

    async fn health(&self) -> ComponentHealth;

    /// State of the producer's circuit breaker, when the backend has one.
    async fn circuit_state(&self) -> Option<CircuitState> {
        None
    }
}

#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Wait for up to `max` messages. `Ok(None)` means the source is closed.
    async fn next_batch(&mut self, max: usize) -> Result<Option<Vec<DeliveredMessage>>, QueueError>;

    /// Mark a message processed so it is not delivered again.
    async fn ack(&mut self, message: &DeliveredMessage) -> Result<(), QueueError>;

    /// Arrange for a message to be delivered again.
    async fn redeliver(&mut self, message: &DeliveredMessage) -> Result<(), QueueError>;
}
