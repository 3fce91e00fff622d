use uuid::Uuid;

use super::value_objects::OrderStatus;
use crate::messaging::QueueError;
use crate::store::StoreError;

// ============================================================================
// Order Service Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderServiceError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Queue publish error: {0}")]
    QueuePublish(String),
}

impl OrderServiceError {
    /// Transient failures may succeed when the whole request or message is retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, OrderServiceError::Storage(_) | OrderServiceError::QueuePublish(_))
    }

    /// Stable label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            OrderServiceError::InvalidInput(_) => "invalid_input",
            OrderServiceError::NotFound(_) => "not_found",
            OrderServiceError::InvalidTransition { .. } => "invalid_transition",
            OrderServiceError::Storage(_) => "storage",
            OrderServiceError::QueuePublish(_) => "queue_publish",
        }
    }
}

impl From<StoreError> for OrderServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(order_id) => OrderServiceError::NotFound(order_id.to_string()),
            StoreError::InvalidTransition { order_id, from, to } => {
                OrderServiceError::InvalidTransition { order_id, from, to }
            }
            other => OrderServiceError::Storage(other.to_string()),
        }
    }
}

impl From<QueueError> for OrderServiceError {
    fn from(err: QueueError) -> Self {
        OrderServiceError::QueuePublish(err.to_string())
    }
}
