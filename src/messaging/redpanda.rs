use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    message::{Header, Headers, OwnedHeaders},
    producer::{FutureProducer, FutureRecord},
    util::Timeout,
    Message, Offset, TopicPartitionList,
};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use super::{DeliveredMessage, MessageId, MessageSource, QueueError, WorkQueue};
use crate::health::ComponentHealth;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

const MESSAGE_ID_HEADER: &str = "message-id";

// ============================================================================
// Redpanda producer
// ============================================================================

pub struct RedpandaClient {
    producer: FutureProducer,
    circuit_breaker: CircuitBreaker,
    send_timeout: Duration,
}

impl RedpandaClient {
    pub fn new(brokers: &str, send_timeout: Duration) -> Result<Self, QueueError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", send_timeout.as_millis().to_string())
            .create()
            .map_err(|e| QueueError::Publish {
                queue: "*".to_string(),
                reason: format!("failed to create producer: {}", e),
            })?;

        Ok(Self {
            producer,
            circuit_breaker: CircuitBreaker::new("redpanda", CircuitBreakerConfig::default()),
            send_timeout,
        })
    }
}

#[async_trait]
impl WorkQueue for RedpandaClient {
    async fn publish(&self, queue: &str, key: &str, payload: &[u8]) -> Result<MessageId, QueueError> {
        let message_id = Uuid::new_v4().to_string();

        let result = self
            .circuit_breaker
            .call(async {
                let headers = OwnedHeaders::new().insert(Header {
                    key: MESSAGE_ID_HEADER,
                    value: Some(message_id.as_str()),
                });
                let record = FutureRecord::to(queue)
                    .key(key)
                    .payload(payload)
                    .headers(headers);

                self.producer
                    .send(record, Timeout::After(self.send_timeout))
                    .await
                    .map(|_| ())
                    .map_err(|(e, _)| e.to_string())
            })
            .await;

        match result {
            Ok(()) => {
                tracing::info!(
                    topic = %queue,
                    key = %key,
                    message_id = %message_id,
                    "Published to Redpanda"
                );
                Ok(message_id)
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(topic = %queue, "Circuit breaker open - Redpanda unavailable");
                Err(QueueError::CircuitOpen(queue.to_string()))
            }
            Err(CircuitBreakerError::OperationFailed(reason)) => {
                tracing::error!(error = %reason, topic = %queue, "Failed to publish to Redpanda");
                Err(QueueError::Publish {
                    queue: queue.to_string(),
                    reason,
                })
            }
        }
    }

    async fn health(&self) -> ComponentHealth {
        let state = self.circuit_breaker.state().await;
        ComponentHealth::new("work_queue", state.health())
            .with_details(format!("{} circuit {:?}", self.circuit_breaker.name(), state))
    }

    async fn circuit_state(&self) -> Option<CircuitState> {
        Some(self.circuit_breaker.state().await)
    }
}

// ============================================================================
// Redpanda consumer
// ============================================================================
//
// Offsets are committed by hand: a message counts as consumed only after it
// was acked. Redelivery rewinds the partition to the message's offset, and
// until that message is acked no commit on its partition may pass it.
//
// ============================================================================

/// Earliest offset per partition that is waiting to be redelivered.
#[derive(Debug, Default)]
struct RedeliveryHolds {
    lowest: HashMap<(String, i32), i64>,
}

impl RedeliveryHolds {
    /// Record `offset` for redelivery. Returns the offset to seek to, or
    /// `None` when an earlier offset on the partition is already being
    /// replayed and covers this one.
    fn hold(&mut self, topic: &str, partition: i32, offset: i64) -> Option<i64> {
        let key = (topic.to_string(), partition);
        match self.lowest.get(&key) {
            Some(&held) if held < offset => None,
            _ => {
                self.lowest.insert(key, offset);
                Some(offset)
            }
        }
    }

    /// Offset to commit once `offset` is acked, or `None` while an earlier
    /// message on the partition still awaits redelivery.
    fn commit_after_ack(&mut self, topic: &str, partition: i32, offset: i64) -> Option<i64> {
        let key = (topic.to_string(), partition);
        match self.lowest.get(&key).copied() {
            Some(held) if held < offset => None,
            Some(held) if held == offset => {
                self.lowest.remove(&key);
                Some(next_offset(offset))
            }
            _ => Some(next_offset(offset)),
        }
    }
}

/// Kafka commits name the next offset to read.
fn next_offset(offset: i64) -> i64 {
    offset + 1
}

/// The producer's `message-id` header, else `topic/partition/offset`.
fn message_id_or_position(header: Option<&[u8]>, topic: &str, partition: i32, offset: i64) -> MessageId {
    match header {
        Some(value) => String::from_utf8_lossy(value).into_owned(),
        None => format!("{}/{}/{}", topic, partition, offset),
    }
}

fn position(message: &DeliveredMessage) -> Result<(i32, i64), QueueError> {
    match (message.partition, message.offset) {
        (Some(partition), Some(offset)) => Ok((partition, offset)),
        _ => Err(QueueError::Consume(format!(
            "message {} has no partition offset",
            message.message_id
        ))),
    }
}

pub struct RedpandaSource {
    consumer: StreamConsumer,
    topic: String,
    linger: Duration,
    holds: RedeliveryHolds,
}

impl RedpandaSource {
    pub fn subscribe(brokers: &str, group_id: &str, topic: &str) -> Result<Self, QueueError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .map_err(|e| QueueError::Consume(format!("failed to create consumer: {}", e)))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| QueueError::Consume(format!("failed to subscribe to {}: {}", topic, e)))?;

        tracing::info!(topic = %topic, group_id = %group_id, "Subscribed to Redpanda topic");

        Ok(Self {
            consumer,
            topic: topic.to_string(),
            linger: Duration::from_millis(50),
            holds: RedeliveryHolds::default(),
        })
    }

    async fn recv_one(&self) -> Result<DeliveredMessage, QueueError> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| QueueError::Consume(e.to_string()))?;

        let header = message.headers().and_then(|headers| {
            headers
                .iter()
                .find(|header| header.key == MESSAGE_ID_HEADER)
                .and_then(|header| header.value)
        });

        Ok(DeliveredMessage {
            message_id: message_id_or_position(header, message.topic(), message.partition(), message.offset()),
            queue: message.topic().to_string(),
            key: message.key().map(|key| String::from_utf8_lossy(key).into_owned()),
            body: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            partition: Some(message.partition()),
            offset: Some(message.offset()),
        })
    }
}

#[async_trait]
impl MessageSource for RedpandaSource {
    async fn next_batch(&mut self, max: usize) -> Result<Option<Vec<DeliveredMessage>>, QueueError> {
        let mut batch = vec![self.recv_one().await?];

        while batch.len() < max {
            match tokio::time::timeout(self.linger, self.recv_one()).await {
                Ok(Ok(message)) => batch.push(message),
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, topic = %self.topic, "Receive failed while filling batch");
                    break;
                }
                Err(_) => break,
            }
        }

        Ok(Some(batch))
    }

    async fn ack(&mut self, message: &DeliveredMessage) -> Result<(), QueueError> {
        let (partition, offset) = position(message)?;

        let Some(commit) = self.holds.commit_after_ack(&message.queue, partition, offset) else {
            tracing::debug!(
                topic = %message.queue,
                partition = partition,
                offset = offset,
                "Commit held back behind a pending redelivery"
            );
            return Ok(());
        };

        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&message.queue, partition, Offset::Offset(commit))
            .map_err(|e| QueueError::Consume(e.to_string()))?;

        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| QueueError::Consume(e.to_string()))
    }

    async fn redeliver(&mut self, message: &DeliveredMessage) -> Result<(), QueueError> {
        let (partition, offset) = position(message)?;

        let Some(seek_to) = self.holds.hold(&message.queue, partition, offset) else {
            return Ok(());
        };

        tracing::warn!(
            topic = %message.queue,
            partition = partition,
            offset = seek_to,
            message_id = %message.message_id,
            "Rewinding partition for redelivery"
        );

        self.consumer
            .seek(
                &message.queue,
                partition,
                Offset::Offset(seek_to),
                Timeout::After(Duration::from_secs(5)),
            )
            .map_err(|e| QueueError::Consume(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPIC: &str = "prepared-orders";

    #[test]
    fn test_commit_moves_past_acked_offset() {
        let mut holds = RedeliveryHolds::default();
        assert_eq!(holds.commit_after_ack(TOPIC, 0, 41), Some(42));
    }

    #[test]
    fn test_commit_never_passes_pending_redelivery() {
        // batch [m0 ok, m1 storage error, m2 ok] on one partition
        let mut holds = RedeliveryHolds::default();

        assert_eq!(holds.commit_after_ack(TOPIC, 0, 10), Some(11));
        assert_eq!(holds.hold(TOPIC, 0, 11), Some(11));
        assert_eq!(holds.commit_after_ack(TOPIC, 0, 12), None);

        // replay: m1 now succeeds, then m2 again
        assert_eq!(holds.commit_after_ack(TOPIC, 0, 11), Some(12));
        assert_eq!(holds.commit_after_ack(TOPIC, 0, 12), Some(13));
    }

    #[test]
    fn test_later_failure_does_not_seek_past_earlier_one() {
        let mut holds = RedeliveryHolds::default();

        assert_eq!(holds.hold(TOPIC, 0, 5), Some(5));
        assert_eq!(holds.hold(TOPIC, 0, 8), None);
        assert_eq!(holds.commit_after_ack(TOPIC, 0, 8), None);
    }

    #[test]
    fn test_repeated_failure_seeks_again() {
        let mut holds = RedeliveryHolds::default();

        assert_eq!(holds.hold(TOPIC, 0, 5), Some(5));
        assert_eq!(holds.hold(TOPIC, 0, 5), Some(5));
    }

    #[test]
    fn test_earlier_failure_moves_the_hold_back() {
        let mut holds = RedeliveryHolds::default();

        assert_eq!(holds.hold(TOPIC, 0, 8), Some(8));
        assert_eq!(holds.hold(TOPIC, 0, 5), Some(5));
        assert_eq!(holds.commit_after_ack(TOPIC, 0, 6), None);
    }

    #[test]
    fn test_holds_are_per_partition() {
        let mut holds = RedeliveryHolds::default();

        holds.hold(TOPIC, 0, 3);
        assert_eq!(holds.commit_after_ack(TOPIC, 1, 9), Some(10));
        assert_eq!(holds.commit_after_ack("pending-orders", 0, 9), Some(10));
        assert_eq!(holds.commit_after_ack(TOPIC, 0, 9), None);
    }

    #[test]
    fn test_message_id_prefers_header() {
        assert_eq!(message_id_or_position(Some(&b"abc-123"[..]), TOPIC, 2, 7), "abc-123");
        assert_eq!(message_id_or_position(None, TOPIC, 2, 7), "prepared-orders/2/7");
    }

    #[test]
    fn test_position_requires_partition_and_offset() {
        let mut message = DeliveredMessage {
            message_id: "m".to_string(),
            queue: TOPIC.to_string(),
            key: None,
            body: Vec::new(),
            partition: Some(3),
            offset: Some(99),
        };
        assert_eq!(position(&message).unwrap(), (3, 99));

        message.offset = None;
        assert!(matches!(position(&message), Err(QueueError::Consume(_))));
    }
}
