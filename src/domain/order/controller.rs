use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::aggregate::Order;
use super::commands::DispatchOrder;
use super::errors::OrderServiceError;
use super::events::OrderRef;
use super::value_objects::OrderStatus;
use crate::messaging::{DeliveredMessage, MessageId, WorkQueue};
use crate::metrics::Metrics;
use crate::store::OrderStore;

// ============================================================================
// Order Lifecycle Controller
// ============================================================================
//
// Orchestrates: request/message → Order Store → Work Queue
//
// Stateless apart from its injected dependencies. Never retries and never
// reads-then-writes a status: transitions are conditional updates inside
// the store.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct QueueNames {
    /// Orders waiting for preparation
    pub pending: String,
    /// Orders handed off to fulfillment
    pub outbound: String,
}

/// Everything the controller talks to, built once at startup.
#[derive(Clone)]
pub struct Dependencies {
    pub store: Arc<dyn OrderStore>,
    pub queue: Arc<dyn WorkQueue>,
    pub queues: QueueNames,
    pub metrics: Arc<Metrics>,
}

/// Outcome of one message in a delivered batch.
#[derive(Debug)]
pub struct MessageOutcome {
    pub message_id: MessageId,
    pub result: Result<Order, OrderServiceError>,
}

pub struct OrderController {
    deps: Dependencies,
}

impl OrderController {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }

    pub fn dependencies(&self) -> &Dependencies {
        &self.deps
    }

    /// Persist a new PENDING order, then enqueue it for preparation.
    ///
    /// A publish failure leaves the stored order in place; the caller still
    /// gets `QueuePublish`.
    pub async fn create_order(&self, body: &[u8]) -> Result<Order, OrderServiceError> {
        let order = Order::from_payload(body).inspect_err(|e| {
            tracing::warn!(operation = "create_order", error = %e, "Rejected order payload");
            self.deps.metrics.record_failure("create_order", e.kind());
        })?;

        tracing::info!(
            order_id = %order.order_id,
            customer_id = ?order.customer_id(),
            item = ?order.item(),
            "Creating new order"
        );

        self.timed("put", self.deps.store.put(&order))
            .await
            .map_err(|e| self.failed("create_order", order.order_id, e.into()))?;
        self.deps.metrics.orders_created.inc();

        let payload = order
            .to_json()
            .map_err(|e| self.failed("create_order", order.order_id, OrderServiceError::Storage(e.to_string())))?;

        let message_id = self
            .publish(&self.deps.queues.pending, order.order_id, &payload)
            .await
            .map_err(|e| {
                tracing::error!(
                    order_id = %order.order_id,
                    queue = %self.deps.queues.pending,
                    "Order stored as PENDING but never entered the processing pipeline"
                );
                self.failed("create_order", order.order_id, e)
            })?;

        tracing::info!(
            order_id = %order.order_id,
            message_id = %message_id,
            "✅ Order placed"
        );

        Ok(order)
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Order, OrderServiceError> {
        // A string that is not a UUID cannot name a stored order
        let Ok(id) = Uuid::parse_str(order_id) else {
            tracing::debug!(order_id = %order_id, "Lookup with malformed order id");
            self.deps.metrics.record_failure("get_order", "not_found");
            return Err(OrderServiceError::NotFound(order_id.to_string()));
        };

        self.timed("get", self.deps.store.get(id))
            .await
            .map_err(|e| self.failed("get_order", id, e.into()))
    }

    /// Forward an order reference to the outbound queue. The store is not touched.
    pub async fn dispatch_order(&self, order: DispatchOrder) -> Result<DispatchOrder, OrderServiceError> {
        tracing::info!(
            order_id = %order.order_id,
            customer_id = %order.customer_id,
            "Dispatching order"
        );

        let payload = serde_json::to_vec(&order)
            .map_err(|e| OrderServiceError::InvalidInput(e.to_string()))?;

        self.publish(&self.deps.queues.outbound, order.order_id, &payload)
            .await
            .map_err(|e| self.failed("dispatch_order", order.order_id, e))?;

        Ok(order)
    }

    /// Mark the referenced order COMPLETED. Safe to apply more than once.
    pub async fn handle_preparation_event(
        &self,
        message: &DeliveredMessage,
    ) -> Result<Order, OrderServiceError> {
        self.advance(message, OrderStatus::Completed, "handle_preparation_event")
            .await
    }

    /// Mark the referenced order PREPARING as it is picked off the pending queue.
    pub async fn handle_pending_order(
        &self,
        message: &DeliveredMessage,
    ) -> Result<Order, OrderServiceError> {
        self.advance(message, OrderStatus::Preparing, "handle_pending_order")
            .await
    }

    /// Every message in the batch is handled on its own; one failure does
    /// not affect the rest.
    pub async fn handle_preparation_batch(&self, batch: &[DeliveredMessage]) -> Vec<MessageOutcome> {
        let mut outcomes = Vec::with_capacity(batch.len());
        for message in batch {
            outcomes.push(MessageOutcome {
                message_id: message.message_id.clone(),
                result: self.handle_preparation_event(message).await,
            });
        }
        outcomes
    }

    pub async fn handle_pending_batch(&self, batch: &[DeliveredMessage]) -> Vec<MessageOutcome> {
        let mut outcomes = Vec::with_capacity(batch.len());
        for message in batch {
            outcomes.push(MessageOutcome {
                message_id: message.message_id.clone(),
                result: self.handle_pending_order(message).await,
            });
        }
        outcomes
    }

    async fn advance(
        &self,
        message: &DeliveredMessage,
        status: OrderStatus,
        operation: &'static str,
    ) -> Result<Order, OrderServiceError> {
        let event = OrderRef::from_slice(&message.body).inspect_err(|e| {
            tracing::error!(
                operation = operation,
                message_id = %message.message_id,
                error = %e,
                "Undecodable queue message"
            );
            self.deps.metrics.record_failure(operation, e.kind());
        })?;

        let order = self
            .timed("update_status", self.deps.store.update_status(event.order_id, status))
            .await
            .map_err(|e| self.failed(operation, event.order_id, e.into()))?;

        self.deps.metrics.record_status(status);
        tracing::info!(
            order_id = %order.order_id,
            status = %order.status,
            message_id = %message.message_id,
            "Order status updated"
        );
        if order.status.is_terminal() {
            tracing::info!(order_id = %order.order_id, "✅ Order completed");
        }

        Ok(order)
    }

    async fn publish(
        &self,
        queue: &str,
        order_id: Uuid,
        payload: &[u8],
    ) -> Result<MessageId, OrderServiceError> {
        let result = self
            .deps
            .queue
            .publish(queue, &order_id.to_string(), payload)
            .await;
        self.deps.metrics.record_publish(queue, result.is_ok());
        Ok(result?)
    }

    async fn timed<T>(&self, operation: &str, call: impl Future<Output = T>) -> T {
        let started = Instant::now();
        let result = call.await;
        self.deps
            .metrics
            .record_store_call(operation, started.elapsed().as_secs_f64());
        result
    }

    /// Log and count a failure before it leaves the controller.
    fn failed(&self, operation: &str, order_id: Uuid, err: OrderServiceError) -> OrderServiceError {
        match &err {
            OrderServiceError::NotFound(_) | OrderServiceError::InvalidTransition { .. } => {
                tracing::warn!(operation = operation, order_id = %order_id, error = %err, "Order operation rejected");
            }
            _ => {
                tracing::error!(operation = operation, order_id = %order_id, error = %err, "Order operation failed");
            }
        }
        self.deps.metrics.record_failure(operation, err.kind());
        err
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
