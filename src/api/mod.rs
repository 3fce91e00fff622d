use actix_web::{http::StatusCode, web, HttpResponse, Responder, ResponseError};
use serde::Serialize;
use std::sync::Arc;

use crate::domain::order::{DispatchOrder, Order, OrderController, OrderServiceError};
use crate::health::SystemHealth;
use crate::metrics::Metrics;

// ============================================================================
// HTTP API
// ============================================================================
//
//   POST /order            → CreateOrder
//   GET  /order/{orderId}  → GetOrder
//   POST /order/send       → DispatchOrder
//   GET  /health           → store and queue health
//   GET  /metrics          → Prometheus text format
//
// ============================================================================

pub struct AppState {
    pub controller: Arc<OrderController>,
    pub metrics: Arc<Metrics>,
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/order", web::post().to(create_order))
        .route("/order/send", web::post().to(dispatch_order))
        .route("/order/{order_id}", web::get().to(get_order))
        .route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics));
}

#[derive(Serialize)]
struct Placed<T> {
    message: &'static str,
    order: T,
}

#[derive(Serialize)]
struct ErrorBody {
    message: &'static str,
}

impl ResponseError for OrderServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            OrderServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            OrderServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            OrderServiceError::InvalidTransition { .. } => StatusCode::CONFLICT,
            OrderServiceError::Storage(_) | OrderServiceError::QueuePublish(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    // Internal detail stays in the logs
    fn error_response(&self) -> HttpResponse {
        let message = match self {
            OrderServiceError::InvalidInput(_) => "Invalid order data",
            OrderServiceError::NotFound(_) => "Order not found",
            OrderServiceError::InvalidTransition { .. } => "Order status cannot be changed",
            OrderServiceError::Storage(_) => "Order storage is unavailable",
            OrderServiceError::QueuePublish(_) => "Order could not be sent to the queue",
        };
        HttpResponse::build(self.status_code()).json(ErrorBody { message })
    }
}

async fn create_order(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, OrderServiceError> {
    let order: Order = state.controller.create_order(&body).await?;

    Ok(HttpResponse::Ok().json(Placed {
        message: "Order successfully placed",
        order,
    }))
}

async fn get_order(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, OrderServiceError> {
    let order = state.controller.get_order(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(order))
}

async fn dispatch_order(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, OrderServiceError> {
    let command = DispatchOrder::from_slice(&body)?;
    let order = state.controller.dispatch_order(command).await?;

    Ok(HttpResponse::Ok().json(Placed {
        message: "Order successfully sent",
        order,
    }))
}

async fn health(state: web::Data<AppState>) -> impl Responder {
    let deps = state.controller.dependencies();
    let report = SystemHealth::from_components(vec![
        deps.store.health().await,
        deps.queue.health().await,
    ]);

    if report.overall_status.is_unhealthy() {
        tracing::warn!(status = ?report.overall_status, "Health check failed");
        HttpResponse::ServiceUnavailable().json(report)
    } else {
        HttpResponse::Ok().json(report)
    }
}

async fn metrics(state: web::Data<AppState>) -> impl Responder {
    if let Some(circuit) = state.controller.dependencies().queue.circuit_state().await {
        state.metrics.update_circuit_breaker_state(circuit.as_gauge());
    }

    match state.metrics.render() {
        Ok(buffer) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(buffer),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::controller::tests::{controller_with, harness, BrokenQueue, BrokenStore};
    use crate::domain::order::OrderStatus;
    use crate::messaging::InMemoryQueue;
    use crate::store::{InMemoryOrderStore, OrderStore};
    use actix_web::{test, App};
    use serde_json::{json, Value};
    use uuid::Uuid;

    fn state(controller: OrderController) -> web::Data<AppState> {
        let metrics = controller.dependencies().metrics.clone();
        web::Data::new(AppState {
            controller: Arc::new(controller),
            metrics,
        })
    }

    #[actix_web::test]
    async fn test_create_then_get_order() {
        let h = harness();
        let app = test::init_service(App::new().app_data(state(h.controller)).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/order")
            .set_payload(r#"{"customerId": "12345", "item": "Pepperoni"}"#)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Order successfully placed");
        assert_eq!(body["order"]["status"], "PENDING");
        assert_eq!(body["order"]["item"], "Pepperoni");
        let order_id = body["order"]["orderId"].as_str().unwrap().to_string();

        let req = test::TestRequest::get().uri(&format!("/order/{}", order_id)).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let fetched: Value = test::read_body_json(resp).await;
        assert_eq!(fetched, body["order"]);
    }

    #[actix_web::test]
    async fn test_create_with_malformed_body_is_bad_request() {
        let h = harness();
        let store = h.store.clone();
        let app = test::init_service(App::new().app_data(state(h.controller)).configure(routes)).await;

        let req = test::TestRequest::post().uri("/order").set_payload("{\"item\":").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"message": "Invalid order data"}));
        assert_eq!(store.len().await, 0);
    }

    #[actix_web::test]
    async fn test_get_unknown_order_is_not_found() {
        let h = harness();
        let app = test::init_service(App::new().app_data(state(h.controller)).configure(routes)).await;

        for uri in [format!("/order/{}", Uuid::new_v4()), "/order/not-a-uuid".to_string()] {
            let req = test::TestRequest::get().uri(&uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        }
    }

    #[actix_web::test]
    async fn test_storage_failure_is_internal_error() {
        let controller = controller_with(Arc::new(BrokenStore), Arc::new(InMemoryQueue::new()));
        let app = test::init_service(App::new().app_data(state(controller)).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/order")
            .set_payload(r#"{"item": "Pepperoni"}"#)
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Order storage is unavailable");
    }

    #[actix_web::test]
    async fn test_publish_failure_is_internal_error() {
        let store = Arc::new(InMemoryOrderStore::new());
        let controller = controller_with(store.clone(), Arc::new(BrokenQueue));
        let app = test::init_service(App::new().app_data(state(controller)).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/order")
            .set_payload(r#"{"item": "Pepperoni"}"#)
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(store.len().await, 1);
    }

    #[actix_web::test]
    async fn test_dispatch_order() {
        let h = harness();
        let queue = h.queue.clone();
        let app = test::init_service(App::new().app_data(state(h.controller)).configure(routes)).await;
        let order_id = Uuid::new_v4();

        let req = test::TestRequest::post()
            .uri("/order/send")
            .set_json(json!({"orderId": order_id, "item": "Pepperoni", "customerId": "12345"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Order successfully sent");
        assert_eq!(body["order"]["orderId"], json!(order_id));
        assert_eq!(queue.published(crate::domain::order::controller::tests::OUTBOUND).await.len(), 1);
    }

    #[actix_web::test]
    async fn test_dispatch_without_order_id_is_bad_request() {
        let h = harness();
        let app = test::init_service(App::new().app_data(state(h.controller)).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/order/send")
            .set_json(json!({"item": "Pepperoni", "customerId": "12345"}))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_completed_order_is_visible_over_http() {
        let h = harness();
        let order = h.controller.create_order(br#"{"item": "Pepperoni"}"#).await.unwrap();
        h.store.update_status(order.order_id, OrderStatus::Completed).await.unwrap();
        let app = test::init_service(App::new().app_data(state(h.controller)).configure(routes)).await;

        let req = test::TestRequest::get().uri(&format!("/order/{}", order.order_id)).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["status"], "COMPLETED");
    }

    #[actix_web::test]
    async fn test_health_reports_components() {
        let h = harness();
        let app = test::init_service(App::new().app_data(state(h.controller)).configure(routes)).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["components"].as_array().unwrap().len(), 2);
    }

    #[actix_web::test]
    async fn test_health_unavailable_when_queue_is_down() {
        let controller = controller_with(Arc::new(InMemoryOrderStore::new()), Arc::new(BrokenQueue));
        let app = test::init_service(App::new().app_data(state(controller)).configure(routes)).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn test_metrics_endpoint() {
        let h = harness();
        let app = test::init_service(App::new().app_data(state(h.controller)).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/order")
            .set_payload(r#"{"item": "Pepperoni"}"#)
            .to_request();
        test::call_service(&app, req).await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let text = String::from_utf8(body.to_vec()).unwrap();

        assert!(text.contains("orders_created_total 1"));
    }
}
