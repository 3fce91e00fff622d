use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

use crate::domain::order::OrderStatus;

// ============================================================================
// Metrics Module - Prometheus metrics for the order lifecycle
// ============================================================================
//
// Covers:
// - orders created and status transitions
// - queue publishes per queue and outcome
// - store operation latency
// - worker message outcomes
// - queue circuit breaker state
//
// Exposed as text at GET /metrics.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub orders_created: IntCounter,
    pub status_transitions: IntCounterVec,
    pub request_failures: IntCounterVec,

    pub queue_publishes: IntCounterVec,

    pub store_duration: HistogramVec,

    pub worker_messages: IntCounterVec,

    pub circuit_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounter::new("orders_created_total", "Orders persisted by CreateOrder")?;
        registry.register(Box::new(orders_created.clone()))?;

        let status_transitions = IntCounterVec::new(
            Opts::new("order_status_transitions_total", "Applied order status updates"),
            &["status"],
        )?;
        registry.register(Box::new(status_transitions.clone()))?;

        let request_failures = IntCounterVec::new(
            Opts::new("order_operation_failures_total", "Failed lifecycle operations"),
            &["operation", "error"],
        )?;
        registry.register(Box::new(request_failures.clone()))?;

        let queue_publishes = IntCounterVec::new(
            Opts::new("queue_publishes_total", "Messages published to work queues"),
            &["queue", "outcome"],
        )?;
        registry.register(Box::new(queue_publishes.clone()))?;

        let store_duration = HistogramVec::new(
            HistogramOpts::new("order_store_duration_seconds", "Order store operation duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(store_duration.clone()))?;

        let worker_messages = IntCounterVec::new(
            Opts::new("worker_messages_total", "Queue messages handled by workers"),
            &["worker", "outcome"],
        )?;
        registry.register(Box::new(worker_messages.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Queue circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            status_transitions,
            request_failures,
            queue_publishes,
            store_duration,
            worker_messages,
            circuit_breaker_state,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> anyhow::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }

    pub fn record_status(&self, status: OrderStatus) {
        self.status_transitions.with_label_values(&[status.as_str()]).inc();
    }

    pub fn record_failure(&self, operation: &str, error: &str) {
        self.request_failures.with_label_values(&[operation, error]).inc();
    }

    pub fn record_publish(&self, queue: &str, success: bool) {
        let outcome = if success { "ok" } else { "error" };
        self.queue_publishes.with_label_values(&[queue, outcome]).inc();
    }

    pub fn record_store_call(&self, operation: &str, duration_secs: f64) {
        self.store_duration.with_label_values(&[operation]).observe(duration_secs);
    }

    pub fn record_worker_message(&self, worker: &str, outcome: &str) {
        self.worker_messages.with_label_values(&[worker, outcome]).inc();
    }

    pub fn update_circuit_breaker_state(&self, state: i64) {
        self.circuit_breaker_state.set(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_record_status_transitions() {
        let metrics = Metrics::new().unwrap();
        metrics.record_status(OrderStatus::Completed);
        metrics.record_status(OrderStatus::Completed);
        metrics.record_status(OrderStatus::Preparing);

        let gathered = metrics.registry.gather();
        let transitions = gathered
            .iter()
            .find(|m| m.name() == "order_status_transitions_total")
            .unwrap();
        assert_eq!(transitions.metric.len(), 2);
    }

    #[test]
    fn test_record_publish_outcomes() {
        let metrics = Metrics::new().unwrap();
        metrics.record_publish("pending-orders", true);
        metrics.record_publish("pending-orders", false);

        assert_eq!(
            metrics.queue_publishes.with_label_values(&["pending-orders", "ok"]).get(),
            1
        );
        assert_eq!(
            metrics.queue_publishes.with_label_values(&["pending-orders", "error"]).get(),
            1
        );
    }

    #[test]
    fn test_render_text_format() {
        let metrics = Metrics::new().unwrap();
        metrics.orders_created.inc();

        let text = String::from_utf8(metrics.render().unwrap()).unwrap();
        assert!(text.contains("orders_created_total 1"));
    }

    #[test]
    fn test_circuit_breaker_gauge() {
        let metrics = Metrics::new().unwrap();
        metrics.update_circuit_breaker_state(1);
        assert_eq!(metrics.circuit_breaker_state.get(), 1);
    }
}
