// ============================================================================
// Order Store - durable persistence for order records
// ============================================================================
//
// The controller only sees the OrderStore trait. Backends:
// - scylla  - ScyllaDB table, conditional writes via lightweight transactions
// - memory  - process-local map for local runs and tests
//
// ============================================================================

mod memory;
mod scylla_store;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::order::{Order, OrderStatus};
use crate::health::ComponentHealth;

pub use self::memory::InMemoryOrderStore;
pub use self::scylla_store::ScyllaOrderStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Order not found: {0}")]
    NotFound(Uuid),

    #[error("Order already exists: {0}")]
    AlreadyExists(Uuid),

    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Persistence contract for order records.
///
/// Implementations guarantee read-after-write visibility for a single caller.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order. Never overwrites an existing id.
    async fn put(&self, order: &Order) -> Result<(), StoreError>;

    async fn get(&self, order_id: Uuid) -> Result<Order, StoreError>;

    /// Set the status of an existing order in one atomic conditional update.
    ///
    /// Applies only when the stored status may advance to `status`. A missing
    /// order is `NotFound`; the record is never created here.
    async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<Order, StoreError>;

    async fn health(&self) -> ComponentHealth;
}
