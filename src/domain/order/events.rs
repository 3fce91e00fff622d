use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::OrderServiceError;

// ============================================================================
// Order Events - queue-delivered messages that advance an order
// ============================================================================

/// Body of a message that refers to an existing order.
///
/// Used for both the pending-order queue (whose messages are full order
/// records) and the preparation-event queue (whose messages may carry only
/// the id). Only `orderId` is read; everything else is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRef {
    pub order_id: Uuid,
}

impl OrderRef {
    pub fn from_slice(body: &[u8]) -> Result<Self, OrderServiceError> {
        serde_json::from_slice(body)
            .map_err(|e| OrderServiceError::InvalidInput(format!("invalid order event: {}", e)))
    }
}
