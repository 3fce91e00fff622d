use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::errors::OrderServiceError;

// ============================================================================
// Order Commands - inbound requests that carry their own order data
// ============================================================================

/// Hand-off of an order to the external fulfillment actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOrder {
    pub order_id: Uuid,
    pub item: Value,
    pub customer_id: String,
}

impl DispatchOrder {
    pub fn from_slice(body: &[u8]) -> Result<Self, OrderServiceError> {
        serde_json::from_slice(body)
            .map_err(|e| OrderServiceError::InvalidInput(format!("invalid dispatch request: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_request_parses_camel_case() {
        let id = Uuid::new_v4();
        let body = format!(r#"{{"orderId": "{}", "item": "Margherita", "customerId": "42"}}"#, id);

        let dispatch = DispatchOrder::from_slice(body.as_bytes()).unwrap();
        assert_eq!(dispatch.order_id, id);
        assert_eq!(dispatch.item, Value::String("Margherita".to_string()));
        assert_eq!(dispatch.customer_id, "42");
    }

    #[test]
    fn test_dispatch_request_requires_all_fields() {
        let body = br#"{"item": "Margherita", "customerId": "42"}"#;
        assert!(matches!(
            DispatchOrder::from_slice(body),
            Err(OrderServiceError::InvalidInput(_))
        ));
    }
}
