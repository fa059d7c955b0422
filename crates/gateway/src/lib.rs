//! HTTP gateway for the order-fulfillment saga.
//!
//! Every route submits a workflow to the [`Orchestrator`] and, apart from
//! `/order/start`, waits for its result. Promise resolution and instance
//! inspection go straight to the engine. Structured logging uses tracing
//! and metrics are exported in Prometheus format.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use durable_store::DurableStore;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{LocalTransport, Orchestrator, Services, workflows};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub orchestrator: Orchestrator,
    /// Storage services behind the worker nodes.
    pub services: Services,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(
    state: Arc<AppState>,
    metrics_handle: PrometheusHandle,
    config: &Config,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/customer/create", post(routes::customers::create))
        .route("/products/add", post(routes::products::add))
        .route("/products/remove", post(routes::products::remove))
        .route("/cart/get", post(routes::cart::get))
        .route("/cart/add", post(routes::cart::add))
        .route("/cart/remove", post(routes::cart::remove))
        .route("/order/start", post(routes::orders::start))
        .route("/order/resolve-promise", post(routes::orders::resolve_promise))
        .route("/order/reject-promise", post(routes::orders::reject_promise))
        .route(
            "/orders/get-in-progress-orders",
            get(routes::orders::in_progress),
        )
        .route("/views/customer", post(routes::views::customer))
        .route("/views/restaurant", get(routes::views::restaurant))
        .route("/views/driver", post(routes::views::driver))
        .route("/workflows/{id}", get(routes::workflows::get))
        .route("/workflows/{id}/plan", get(routes::workflows::plan))
        .with_state(state)
        .merge(metrics_router)
        .layer(cors(&config.cors_origin))
        .layer(TraceLayer::new_for_http())
}

fn cors(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match origin.parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            tracing::warn!(origin, "invalid CORS origin, allowing any");
            layer.allow_origin(Any)
        }
    }
}

/// Creates the application state: storage services registered on an
/// in-process transport and an orchestrator over `store` with every
/// gateway workflow.
pub async fn create_default_state(
    store: Arc<dyn DurableStore>,
    config: &Config,
) -> Arc<AppState> {
    let transport = LocalTransport::new(config.retry_policy());
    let services = Services::new();
    let nodes = services.register(&transport, config.worker_replicas).await;
    tracing::info!(nodes = nodes.len(), "worker nodes registered");

    let orchestrator = Orchestrator::builder(store, Arc::new(transport))
        .registry(workflows::registry())
        .build();

    Arc::new(AppState {
        orchestrator,
        services,
    })
}
