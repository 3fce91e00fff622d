use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use crate::domain::order::{MessageOutcome, OrderController, OrderServiceError};
use crate::messaging::{DeliveredMessage, MessageId, MessageSource};
use crate::metrics::Metrics;

// ============================================================================
// Queue Workers - consume a queue and drive the order lifecycle
// ============================================================================
//
// One worker per consumed queue:
// - pending orders      → PREPARING
// - preparation events  → COMPLETED
//
// Per message, after the controller has handled it:
// - success             → ack
// - already advanced    → ack (a late pending message for a finished order)
// - transient failure   → redeliver, then back off before the next batch
// - permanent failure   → publish to the dead-letter queue, then ack; if
//                         that publish fails the message is redelivered
//
// ============================================================================

const SOURCE_ERROR_BACKOFF_SECS: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    PendingOrders,
    PreparationEvents,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub batch_size: usize,
    pub dead_letter_queue: String,
    /// Pause after the first batch with a redelivery; doubles per
    /// consecutive such batch up to `max_retry_backoff`.
    pub retry_backoff: Duration,
    pub max_retry_backoff: Duration,
}

/// What the worker did with one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Acked,
    Redelivered,
    DeadLettered,
}

impl Disposition {
    fn as_str(&self) -> &'static str {
        match self {
            Disposition::Acked => "acked",
            Disposition::Redelivered => "redelivered",
            Disposition::DeadLettered => "dead_lettered",
        }
    }
}

/// Record published to the dead-letter queue for manual follow-up.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub message_id: MessageId,
    pub source_queue: String,
    pub key: Option<String>,
    pub payload: String,
    pub error_kind: &'static str,
    pub error_message: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    fn new(message: &DeliveredMessage, error: &OrderServiceError) -> Self {
        Self {
            message_id: message.message_id.clone(),
            source_queue: message.queue.clone(),
            key: message.key.clone(),
            payload: String::from_utf8_lossy(&message.body).into_owned(),
            error_kind: error.kind(),
            error_message: error.to_string(),
            failed_at: Utc::now(),
        }
    }
}

/// Pause before the next batch after `streak` consecutive batches that
/// needed a redelivery.
fn retry_delay(streak: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(streak.saturating_sub(1));
    base.saturating_mul(factor).min(max)
}

pub struct QueueWorker {
    name: String,
    kind: WorkerKind,
    source: Box<dyn MessageSource>,
    controller: Arc<OrderController>,
    metrics: Arc<Metrics>,
    settings: WorkerSettings,
}

impl QueueWorker {
    pub fn new(
        name: impl Into<String>,
        kind: WorkerKind,
        source: Box<dyn MessageSource>,
        controller: Arc<OrderController>,
        metrics: Arc<Metrics>,
        mut settings: WorkerSettings,
    ) -> Self {
        settings.batch_size = settings.batch_size.max(1);
        Self {
            name: name.into(),
            kind,
            source,
            controller,
            metrics,
            settings,
        }
    }

    /// Consume until the source closes.
    pub async fn run(mut self) {
        tracing::info!(
            worker = %self.name,
            batch_size = self.settings.batch_size,
            dead_letter_queue = %self.settings.dead_letter_queue,
            "🔄 Worker started"
        );

        let mut redelivery_streak = 0u32;

        loop {
            let batch = match self.source.next_batch(self.settings.batch_size).await {
                Ok(Some(batch)) => batch,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(worker = %self.name, error = %e, "Failed to receive batch, backing off");
                    sleep(Duration::from_secs(SOURCE_ERROR_BACKOFF_SECS)).await;
                    continue;
                }
            };

            tracing::debug!(worker = %self.name, message_count = batch.len(), "📬 Received batch");

            let outcomes = match self.kind {
                WorkerKind::PendingOrders => self.controller.handle_pending_batch(&batch).await,
                WorkerKind::PreparationEvents => self.controller.handle_preparation_batch(&batch).await,
            };

            let mut redelivered = false;
            for (message, outcome) in batch.iter().zip(outcomes) {
                let disposition = self.settle(message, outcome).await;
                redelivered |= disposition == Disposition::Redelivered;
                self.metrics.record_worker_message(&self.name, disposition.as_str());
            }

            if redelivered {
                redelivery_streak = redelivery_streak.saturating_add(1);
                let delay = retry_delay(
                    redelivery_streak,
                    self.settings.retry_backoff,
                    self.settings.max_retry_backoff,
                );
                tracing::warn!(
                    worker = %self.name,
                    streak = redelivery_streak,
                    delay_ms = delay.as_millis() as u64,
                    "Backing off before redelivery"
                );
                sleep(delay).await;
            } else {
                redelivery_streak = 0;
            }
        }

        tracing::info!(worker = %self.name, "Worker stopped, source closed");
    }

    async fn settle(&mut self, message: &DeliveredMessage, outcome: MessageOutcome) -> Disposition {
        let disposition = match outcome.result {
            Ok(_) => Disposition::Acked,
            Err(OrderServiceError::InvalidTransition { order_id, from, to }) => {
                tracing::info!(
                    worker = %self.name,
                    message_id = %outcome.message_id,
                    order_id = %order_id,
                    current = %from,
                    requested = %to,
                    "Order already advanced, message needs no work"
                );
                Disposition::Acked
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    worker = %self.name,
                    message_id = %outcome.message_id,
                    error = %e,
                    "Transient failure, message will be redelivered"
                );
                Disposition::Redelivered
            }
            Err(e) => self.dead_letter(message, &e).await,
        };

        let settled = match disposition {
            Disposition::Redelivered => self.source.redeliver(message).await,
            Disposition::Acked | Disposition::DeadLettered => self.source.ack(message).await,
        };

        if let Err(e) = settled {
            tracing::error!(
                worker = %self.name,
                message_id = %message.message_id,
                error = %e,
                "Failed to settle message"
            );
        }

        disposition
    }

    /// Park a message that can never succeed. Falls back to redelivery when
    /// the dead-letter queue cannot take it.
    async fn dead_letter(&self, message: &DeliveredMessage, error: &OrderServiceError) -> Disposition {
        let queue = &self.settings.dead_letter_queue;
        let record = DeadLetter::new(message, error);

        let published = match serde_json::to_vec(&record) {
            Ok(payload) => {
                let key = message.key.as_deref().unwrap_or(&message.message_id);
                self.controller
                    .dependencies()
                    .queue
                    .publish(queue, key, &payload)
                    .await
                    .map_err(|e| e.to_string())
            }
            Err(e) => Err(e.to_string()),
        };
        self.metrics.record_publish(queue, published.is_ok());

        match published {
            Ok(dead_letter_id) => {
                tracing::error!(
                    worker = %self.name,
                    message_id = %message.message_id,
                    dead_letter_id = %dead_letter_id,
                    dead_letter_queue = %queue,
                    error = %error,
                    "❌ Message can never succeed, moved to dead-letter queue"
                );
                Disposition::DeadLettered
            }
            Err(e) => {
                tracing::error!(
                    worker = %self.name,
                    message_id = %message.message_id,
                    dead_letter_queue = %queue,
                    error = %e,
                    "Dead-letter publish failed, message will be redelivered"
                );
                Disposition::Redelivered
            }
        }
    }
}
