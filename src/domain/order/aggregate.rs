use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::errors::OrderServiceError;
use super::value_objects::OrderStatus;

// ============================================================================
// Order - the stored record
// ============================================================================
//
// Service-owned fields are typed. Everything the caller sent at creation is
// kept verbatim in `details` and flattened back into the JSON record.
//
// ============================================================================

/// Keys the service owns; callers cannot set them.
pub const RESERVED_FIELDS: [&str; 3] = ["orderId", "status", "createdAt"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl Order {
    /// Build a fresh PENDING order from a raw creation payload.
    ///
    /// The payload must be a JSON object. Reserved keys are dropped.
    pub fn from_payload(body: &[u8]) -> Result<Self, OrderServiceError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| OrderServiceError::InvalidInput(format!("malformed JSON: {}", e)))?;

        let Value::Object(mut details) = value else {
            return Err(OrderServiceError::InvalidInput(
                "order payload must be a JSON object".to_string(),
            ));
        };

        for key in RESERVED_FIELDS {
            if details.remove(key).is_some() {
                tracing::debug!(field = key, "Dropping reserved field from order payload");
            }
        }

        Ok(Self::new(details))
    }

    pub fn new(details: Map<String, Value>) -> Self {
        Self {
            order_id: Uuid::new_v4(),
            status: OrderStatus::Pending,
            // Stores keep millisecond precision
            created_at: Utc::now().trunc_subsecs(3),
            details,
        }
    }

    pub fn customer_id(&self) -> Option<&str> {
        self.details.get("customerId").and_then(Value::as_str)
    }

    pub fn item(&self) -> Option<&Value> {
        self.details.get("item")
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
