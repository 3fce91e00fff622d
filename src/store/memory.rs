use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{OrderStore, StoreError};
use crate::domain::order::{Order, OrderStatus};
use crate::health::{ComponentHealth, HealthStatus};

/// Process-local order store.
///
/// Each operation holds the lock for its whole check-and-write, which gives
/// the same atomicity the Scylla backend gets from lightweight transactions.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn put(&self, order: &Order) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.order_id) {
            return Err(StoreError::AlreadyExists(order.order_id));
        }
        orders.insert(order.order_id, order.clone());
        Ok(())
    }

    async fn get(&self, order_id: Uuid) -> Result<Order, StoreError> {
        let orders = self.orders.read().await;
        orders.get(&order_id).cloned().ok_or(StoreError::NotFound(order_id))
    }

    async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<Order, StoreError> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(&order_id).ok_or(StoreError::NotFound(order_id))?;

        if !order.status.can_advance_to(status) {
            return Err(StoreError::InvalidTransition {
                order_id,
                from: order.status,
                to: status,
            });
        }

        order.status = status;
        Ok(order.clone())
    }

    async fn health(&self) -> ComponentHealth {
        ComponentHealth::new("order_store", HealthStatus::Healthy).with_details("in-memory")
    }
}
