use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use super::{DeliveredMessage, MessageId, MessageSource, QueueError, WorkQueue};
use crate::health::{ComponentHealth, HealthStatus};

/// Most recent messages kept per queue for inspection.
pub const RECENT_LOG_LIMIT: usize = 1024;

/// Process-local queue.
///
/// Published messages are fanned out to the sources subscribed to that
/// queue at publish time. Only the last `RECENT_LOG_LIMIT` messages per
/// queue are remembered.
#[derive(Default)]
pub struct InMemoryQueue {
    recent: Mutex<HashMap<String, VecDeque<DeliveredMessage>>>,
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<DeliveredMessage>>>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, queue: &str) -> InMemorySource {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .await
            .entry(queue.to_string())
            .or_default()
            .push(tx.clone());

        InMemorySource { tx, rx }
    }

    /// Recently published messages on `queue`, oldest first.
    pub async fn published(&self, queue: &str) -> Vec<DeliveredMessage> {
        self.recent
            .lock()
            .await
            .get(queue)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl WorkQueue for InMemoryQueue {
    async fn publish(&self, queue: &str, key: &str, payload: &[u8]) -> Result<MessageId, QueueError> {
        let message = DeliveredMessage {
            message_id: Uuid::new_v4().to_string(),
            queue: queue.to_string(),
            key: Some(key.to_string()),
            body: payload.to_vec(),
            partition: None,
            offset: None,
        };

        {
            let mut recent = self.recent.lock().await;
            let log = recent.entry(queue.to_string()).or_default();
            if log.len() == RECENT_LOG_LIMIT {
                log.pop_front();
            }
            log.push_back(message.clone());
        }

        if let Some(subscribers) = self.subscribers.lock().await.get_mut(queue) {
            subscribers.retain(|tx| tx.send(message.clone()).is_ok());
        }

        tracing::debug!(queue = %queue, key = %key, message_id = %message.message_id, "Published in-memory message");
        Ok(message.message_id)
    }

    async fn health(&self) -> ComponentHealth {
        ComponentHealth::new("work_queue", HealthStatus::Healthy).with_details("in-memory")
    }
}

pub struct InMemorySource {
    tx: mpsc::UnboundedSender<DeliveredMessage>,
    rx: mpsc::UnboundedReceiver<DeliveredMessage>,
}

#[async_trait]
impl MessageSource for InMemorySource {
    async fn next_batch(&mut self, max: usize) -> Result<Option<Vec<DeliveredMessage>>, QueueError> {
        let Some(first) = self.rx.recv().await else {
            return Ok(None);
        };

        let mut batch = vec![first];
        while batch.len() < max {
            match self.rx.try_recv() {
                Ok(message) => batch.push(message),
                Err(_) => break,
            }
        }
        Ok(Some(batch))
    }

    async fn ack(&mut self, _message: &DeliveredMessage) -> Result<(), QueueError> {
        Ok(())
    }

    async fn redeliver(&mut self, message: &DeliveredMessage) -> Result<(), QueueError> {
        self.tx
            .send(message.clone())
            .map_err(|e| QueueError::Consume(e.to_string()))
    }
}
