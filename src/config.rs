use anyhow::{bail, Result};
use config::{Config, Environment};
use serde::Deserialize;
use std::time::Duration;

use crate::workers::WorkerSettings;

// ============================================================================
// Service Configuration
// ============================================================================
//
// Read from ORDERS_* environment variables on top of local defaults, e.g.
//
//   ORDERS_STORE_BACKEND=memory ORDERS_QUEUE_BACKEND=memory cargo run
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Scylla,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    Redpanda,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub http_host: String,
    pub http_port: u16,

    pub store_backend: StoreBackend,
    /// Comma separated host:port list
    pub scylla_nodes: String,
    pub keyspace: String,
    pub orders_table: String,

    pub queue_backend: QueueBackend,
    pub brokers: String,
    pub consumer_group: String,
    pub pending_order_queue: String,
    pub outbound_order_queue: String,
    pub preparation_event_queue: String,
    /// Messages that can never be processed are parked here
    pub dead_letter_queue: String,
    pub publish_timeout_ms: u64,
    pub worker_batch_size: usize,
    pub worker_retry_backoff_ms: u64,
    pub worker_max_retry_backoff_ms: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::from_source(Environment::with_prefix("ORDERS").try_parsing(true))
    }

    fn from_source(env: Environment) -> Result<Self> {
        let config: AppConfig = Config::builder()
            .set_default("http_host", "0.0.0.0")?
            .set_default("http_port", 8080)?
            .set_default("store_backend", "scylla")?
            .set_default("scylla_nodes", "127.0.0.1:9042")?
            .set_default("keyspace", "orders_ks")?
            .set_default("orders_table", "orders")?
            .set_default("queue_backend", "redpanda")?
            .set_default("brokers", "127.0.0.1:9092")?
            .set_default("consumer_group", "order-service")?
            .set_default("pending_order_queue", "pending-orders")?
            .set_default("outbound_order_queue", "orders-to-send")?
            .set_default("preparation_event_queue", "prepared-orders")?
            .set_default("dead_letter_queue", "orders-dead-letter")?
            .set_default("publish_timeout_ms", 5000)?
            .set_default("worker_batch_size", 10)?
            .set_default("worker_retry_backoff_ms", 100)?
            .set_default("worker_max_retry_backoff_ms", 5000)?
            .add_source(env)
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("keyspace", &self.keyspace), ("orders_table", &self.orders_table)] {
            if !is_cql_identifier(value) {
                bail!("{} must be a plain CQL identifier, got {:?}", name, value);
            }
        }

        for (name, value) in [
            ("pending_order_queue", &self.pending_order_queue),
            ("outbound_order_queue", &self.outbound_order_queue),
            ("preparation_event_queue", &self.preparation_event_queue),
            ("dead_letter_queue", &self.dead_letter_queue),
        ] {
            if value.trim().is_empty() {
                bail!("{} must not be empty", name);
            }
        }

        if self.worker_batch_size == 0 {
            bail!("worker_batch_size must be at least 1");
        }

        if self.worker_retry_backoff_ms > self.worker_max_retry_backoff_ms {
            bail!(
                "worker_retry_backoff_ms ({}) exceeds worker_max_retry_backoff_ms ({})",
                self.worker_retry_backoff_ms,
                self.worker_max_retry_backoff_ms
            );
        }

        Ok(())
    }

    pub fn scylla_nodes(&self) -> Vec<String> {
        self.scylla_nodes
            .split(',')
            .map(str::trim)
            .filter(|node| !node.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            batch_size: self.worker_batch_size,
            dead_letter_queue: self.dead_letter_queue.clone(),
            retry_backoff: Duration::from_millis(self.worker_retry_backoff_ms),
            max_retry_backoff: Duration::from_millis(self.worker_max_retry_backoff_ms),
        }
    }
}

/// Table and keyspace names are spliced into CQL text, so only plain
/// identifiers are accepted.
fn is_cql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= 48
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load_with(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        AppConfig::from_source(
            Environment::with_prefix("ORDERS")
                .try_parsing(true)
                .source(Some(source)),
        )
    }

    #[test]
    fn test_defaults() {
        let config = load_with(&[]).unwrap();

        assert_eq!(config.http_port, 8080);
        assert_eq!(config.store_backend, StoreBackend::Scylla);
        assert_eq!(config.queue_backend, QueueBackend::Redpanda);
        assert_eq!(config.pending_order_queue, "pending-orders");
        assert_eq!(config.outbound_order_queue, "orders-to-send");
        assert_eq!(config.preparation_event_queue, "prepared-orders");
        assert_eq!(config.publish_timeout(), Duration::from_secs(5));

        let settings = config.worker_settings();
        assert_eq!(settings.dead_letter_queue, "orders-dead-letter");
        assert_eq!(settings.retry_backoff, Duration::from_millis(100));
        assert_eq!(settings.max_retry_backoff, Duration::from_secs(5));
    }

    #[test]
    fn test_dead_letter_queue_override() {
        let config = load_with(&[("ORDERS_DEAD_LETTER_QUEUE", "parked-orders")]).unwrap();
        assert_eq!(config.worker_settings().dead_letter_queue, "parked-orders");
    }

    #[test]
    fn test_rejects_backoff_above_cap() {
        let result = load_with(&[
            ("ORDERS_WORKER_RETRY_BACKOFF_MS", "10000"),
            ("ORDERS_WORKER_MAX_RETRY_BACKOFF_MS", "5000"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_environment_overrides() {
        let config = load_with(&[
            ("ORDERS_STORE_BACKEND", "memory"),
            ("ORDERS_QUEUE_BACKEND", "memory"),
            ("ORDERS_HTTP_PORT", "9000"),
            ("ORDERS_ORDERS_TABLE", "pizza_orders"),
        ])
        .unwrap();

        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.queue_backend, QueueBackend::Memory);
        assert_eq!(config.http_port, 9000);
        assert_eq!(config.orders_table, "pizza_orders");
    }

    #[test]
    fn test_rejects_unsafe_table_name() {
        let result = load_with(&[("ORDERS_ORDERS_TABLE", "orders; DROP TABLE x")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let result = load_with(&[("ORDERS_WORKER_BATCH_SIZE", "0")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_scylla_node_list() {
        let config = load_with(&[("ORDERS_SCYLLA_NODES", "10.0.0.1:9042, 10.0.0.2:9042,")]).unwrap();
        assert_eq!(config.scylla_nodes(), vec!["10.0.0.1:9042", "10.0.0.2:9042"]);
    }

    #[test]
    fn test_cql_identifier() {
        assert!(is_cql_identifier("orders"));
        assert!(is_cql_identifier("orders_2024"));
        assert!(!is_cql_identifier("2orders"));
        assert!(!is_cql_identifier("orders-table"));
        assert!(!is_cql_identifier(""));
    }
}
