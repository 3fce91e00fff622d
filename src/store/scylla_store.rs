use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::response::query_result::QueryResult;
use scylla::value::{CqlValue, Row};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{OrderStore, StoreError};
use crate::domain::order::{Order, OrderStatus};
use crate::health::{ComponentHealth, HealthStatus};

// ============================================================================
// ScyllaDB Order Store
// ============================================================================
//
// One row per order:
//
//   order_id uuid PRIMARY KEY, status text, details text, created_at timestamp
//
// `details` holds the caller-supplied fields as a JSON object. Inserts and
// status updates are lightweight transactions so that:
// - an existing order is never overwritten
// - a status update never creates a row and never moves backwards
//
// ============================================================================

pub struct ScyllaOrderStore {
    session: Session,
    table: String,
}

type OrderRow = (Uuid, String, String, DateTime<Utc>);

fn backend<E: std::fmt::Display>(err: E) -> StoreError {
    StoreError::Backend(err.to_string())
}

impl ScyllaOrderStore {
    /// Connect, then make sure the keyspace and orders table exist.
    pub async fn connect(nodes: &[String], keyspace: &str, table: &str) -> anyhow::Result<Self> {
        tracing::info!(nodes = ?nodes, keyspace = %keyspace, "Connecting to ScyllaDB");

        let session: Session = SessionBuilder::new().known_nodes(nodes).build().await?;

        session
            .query_unpaged(
                format!(
                    "CREATE KEYSPACE IF NOT EXISTS {} WITH REPLICATION = \
                     {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
                    keyspace
                ),
                &[],
            )
            .await?;

        session.use_keyspace(keyspace, false).await?;

        session
            .query_unpaged(
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        order_id uuid PRIMARY KEY,
                        status text,
                        details text,
                        created_at timestamp
                    )",
                    table
                ),
                &[],
            )
            .await?;

        tracing::info!(keyspace = %keyspace, table = %table, "✅ Order table ready");

        Ok(Self {
            session,
            table: table.to_string(),
        })
    }

    fn insert_cql(&self) -> String {
        format!(
            "INSERT INTO {} (order_id, status, details, created_at) VALUES (?, ?, ?, ?) IF NOT EXISTS",
            self.table
        )
    }

    fn select_cql(&self) -> String {
        format!(
            "SELECT order_id, status, details, created_at FROM {} WHERE order_id = ?",
            self.table
        )
    }

    fn update_status_cql(&self, status: OrderStatus) -> String {
        format!(
            "UPDATE {} SET status = ? WHERE order_id = ? IF status IN ({})",
            self.table,
            status_condition(status)
        )
    }
}

/// CQL literal list of statuses an order may hold for a move to `target`.
fn status_condition(target: OrderStatus) -> String {
    OrderStatus::predecessors(target)
        .iter()
        .map(|status| format!("'{}'", status.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn decode_row((order_id, status, details, created_at): OrderRow) -> Result<Order, StoreError> {
    let status = status
        .parse::<OrderStatus>()
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let details: Map<String, Value> =
        serde_json::from_str(&details).map_err(|e| StoreError::Serialization(e.to_string()))?;

    Ok(Order {
        order_id,
        status,
        created_at,
        details,
    })
}

/// Outcome of a lightweight transaction: `[applied]` plus the current
/// `status` column when the server returned it.
fn conditional_outcome(result: QueryResult) -> Result<(bool, Option<String>), StoreError> {
    let rows = result.into_rows_result().map_err(backend)?;
    let status_index = rows
        .column_specs()
        .iter()
        .position(|spec| spec.name() == "status");

    let row = rows
        .maybe_first_row::<Row>()
        .map_err(backend)?
        .ok_or_else(|| StoreError::Backend("empty lightweight transaction result".to_string()))?;

    let applied = matches!(row.columns.first(), Some(Some(CqlValue::Boolean(true))));
    let current = status_index
        .and_then(|index| row.columns.get(index).cloned().flatten())
        .and_then(|value| value.as_text().cloned());

    Ok((applied, current))
}

#[async_trait]
impl OrderStore for ScyllaOrderStore {
    async fn put(&self, order: &Order) -> Result<(), StoreError> {
        let details = serde_json::to_string(&order.details)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let result = self
            .session
            .query_unpaged(
                self.insert_cql(),
                (order.order_id, order.status.as_str(), details, order.created_at),
            )
            .await
            .map_err(backend)?;

        let (applied, _) = conditional_outcome(result)?;
        if !applied {
            return Err(StoreError::AlreadyExists(order.order_id));
        }

        tracing::debug!(order_id = %order.order_id, table = %self.table, "Inserted order row");
        Ok(())
    }

    async fn get(&self, order_id: Uuid) -> Result<Order, StoreError> {
        let result = self
            .session
            .query_unpaged(self.select_cql(), (order_id,))
            .await
            .map_err(backend)?;

        let rows = result.into_rows_result().map_err(backend)?;
        match rows.maybe_first_row::<OrderRow>().map_err(backend)? {
            Some(row) => decode_row(row),
            None => Err(StoreError::NotFound(order_id)),
        }
    }

    async fn update_status(&self, order_id: Uuid, status: OrderStatus) -> Result<Order, StoreError> {
        let result = self
            .session
            .query_unpaged(self.update_status_cql(status), (status.as_str(), order_id))
            .await
            .map_err(backend)?;

        match conditional_outcome(result)? {
            (true, _) => {}
            (false, None) => return Err(StoreError::NotFound(order_id)),
            (false, Some(current)) => {
                let from = current
                    .parse::<OrderStatus>()
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                return Err(StoreError::InvalidTransition {
                    order_id,
                    from,
                    to: status,
                });
            }
        }

        tracing::debug!(order_id = %order_id, status = %status, "Updated order status");
        self.get(order_id).await
    }

    async fn health(&self) -> ComponentHealth {
        match self
            .session
            .query_unpaged("SELECT release_version FROM system.local", &[])
            .await
        {
            Ok(_) => ComponentHealth::new("order_store", HealthStatus::Healthy).with_details("scylla"),
            Err(e) => ComponentHealth::new("order_store", HealthStatus::Unhealthy(e.to_string())),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
//
// Statements against a live cluster are exercised by running the service
// with ORDERS_STORE_BACKEND=scylla; these tests cover the pure helpers.
//
// ============================================================================
