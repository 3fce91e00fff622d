use actix_web::{web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;
mod domain;
mod health;
mod messaging;
mod metrics;
mod store;
mod utils;
mod workers;

use crate::config::{AppConfig, QueueBackend, StoreBackend};
use crate::domain::order::{Dependencies, OrderController, QueueNames};
use crate::messaging::{InMemoryQueue, MessageSource, RedpandaClient, RedpandaSource, WorkQueue};
use crate::store::{InMemoryOrderStore, OrderStore, ScyllaOrderStore};
use crate::workers::{QueueWorker, WorkerKind};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_lifecycle=debug")),
        )
        .init();

    tracing::info!("🚀 Starting order lifecycle service");

    let config = AppConfig::load().context("invalid configuration")?;
    tracing::info!(
        store = ?config.store_backend,
        queue = ?config.queue_backend,
        "Configuration loaded"
    );

    // === 1. Metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 2. Order store ===
    let store: Arc<dyn OrderStore> = match config.store_backend {
        StoreBackend::Scylla => {
            tracing::info!(nodes = %config.scylla_nodes, "Connecting to ScyllaDB...");
            Arc::new(
                ScyllaOrderStore::connect(&config.scylla_nodes(), &config.keyspace, &config.orders_table)
                    .await?,
            )
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory order store, orders are lost on restart");
            Arc::new(InMemoryOrderStore::new())
        }
    };

    // === 3. Work queue and consumers ===
    let (queue, pending_source, prepared_source): (
        Arc<dyn WorkQueue>,
        Box<dyn MessageSource>,
        Box<dyn MessageSource>,
    ) = match config.queue_backend {
        QueueBackend::Redpanda => {
            tracing::info!(brokers = %config.brokers, "Connecting to Redpanda...");
            let client = RedpandaClient::new(&config.brokers, config.publish_timeout())?;
            let pending = RedpandaSource::subscribe(
                &config.brokers,
                &config.consumer_group,
                &config.pending_order_queue,
            )?;
            let prepared = RedpandaSource::subscribe(
                &config.brokers,
                &config.consumer_group,
                &config.preparation_event_queue,
            )?;
            let queue: Arc<dyn WorkQueue> = Arc::new(client);
            let pending: Box<dyn MessageSource> = Box::new(pending);
            let prepared: Box<dyn MessageSource> = Box::new(prepared);
            (queue, pending, prepared)
        }
        QueueBackend::Memory => {
            tracing::warn!("Using in-memory work queue");
            let memory = Arc::new(InMemoryQueue::new());
            let pending: Box<dyn MessageSource> =
                Box::new(memory.subscribe(&config.pending_order_queue).await);
            let prepared: Box<dyn MessageSource> =
                Box::new(memory.subscribe(&config.preparation_event_queue).await);
            let queue: Arc<dyn WorkQueue> = memory;
            (queue, pending, prepared)
        }
    };

    // === 4. Controller ===
    let controller = Arc::new(OrderController::new(Dependencies {
        store,
        queue,
        queues: QueueNames {
            pending: config.pending_order_queue.clone(),
            outbound: config.outbound_order_queue.clone(),
        },
        metrics: metrics.clone(),
    }));

    // === 5. Workers ===
    let pending_worker = QueueWorker::new(
        config.pending_order_queue.clone(),
        WorkerKind::PendingOrders,
        pending_source,
        controller.clone(),
        metrics.clone(),
        config.worker_settings(),
    );
    let prepared_worker = QueueWorker::new(
        config.preparation_event_queue.clone(),
        WorkerKind::PreparationEvents,
        prepared_source,
        controller.clone(),
        metrics.clone(),
        config.worker_settings(),
    );
    let worker_handles = vec![
        tokio::spawn(pending_worker.run()),
        tokio::spawn(prepared_worker.run()),
    ];

    // === 6. HTTP server ===
    tracing::info!(
        "✅ Listening on http://{}:{} (orders, /health, /metrics)",
        config.http_host,
        config.http_port
    );

    let state = web::Data::new(api::AppState {
        controller,
        metrics,
    });

    HttpServer::new(move || App::new().app_data(state.clone()).configure(api::routes))
        .bind((config.http_host.as_str(), config.http_port))?
        .run()
        .await?;

    tracing::info!("Shutting down workers...");
    for handle in worker_handles {
        handle.abort();
    }

    tracing::info!("✅ Shutdown complete");
    Ok(())
}
