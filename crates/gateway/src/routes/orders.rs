//! Order endpoints: starting the fulfillment saga and resolving its gates.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use common::{PromiseId, WorkflowId};
use saga::SagaError;
use saga::workflows::order_fulfillment;
use serde_json::{Value, json};

use super::{id_part, request_id, require, run};
use crate::AppState;
use crate::error::ApiError;

/// POST /order/start: starts the fulfillment saga without waiting for it.
///
/// The workflow id is derived from the customer and order, so starting the
/// same order twice attaches to the first run.
#[tracing::instrument(skip(state, body))]
pub async fn start(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    require(
        &body,
        &["customer_email", "order_id"],
        "missing 'customer_email' or 'order_id' in request data",
    )?;
    let id = WorkflowId::new(format!(
        "start-order-workflow-{}-order-{}",
        id_part(&body["customer_email"]),
        id_part(&body["order_id"])
    ));

    let handle = state
        .orchestrator
        .submit(id, order_fulfillment::NAME, body)
        .await?;
    tracing::info!(workflow_id = %handle.id(), "order workflow started");

    Ok(Json(json!({
        "message": "order workflow started",
        "workflow_id": handle.id(),
    })))
}

/// POST /order/resolve-promise: completes one of the saga's gates.
///
/// Resolving a gate twice is harmless; the first value stands.
#[tracing::instrument(skip(state, body))]
pub async fn resolve_promise(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    require(&body, &["promise_id"], "promise_id required")?;
    let id = PromiseId::new(id_part(&body["promise_id"]));
    let value = body.get("data").cloned().unwrap_or(Value::Null);

    match state.orchestrator.resolve_promise(&id, value).await {
        Ok(_) => Ok(Json(json!("Promise resolved."))),
        Err(SagaError::AlreadyCompleted(_)) => {
            tracing::info!(promise_id = %id, "promise was already completed");
            Ok(Json(json!("Promise already completed.")))
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /order/reject-promise: fails one of the saga's gates, which fails
/// the order workflow waiting on it.
#[tracing::instrument(skip(state, body))]
pub async fn reject_promise(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    require(&body, &["promise_id"], "promise_id required")?;
    let id = PromiseId::new(id_part(&body["promise_id"]));
    let error = body
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("promise rejected");

    state.orchestrator.reject_promise(&id, error).await?;
    Ok(Json(json!("Promise rejected.")))
}

/// GET /orders/get-in-progress-orders
#[tracing::instrument(skip(state))]
pub async fn in_progress(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    run(
        &state,
        request_id("get-in-progress-orders"),
        "dispatch_get_in_progress_orders",
        Value::Null,
    )
    .await
}
