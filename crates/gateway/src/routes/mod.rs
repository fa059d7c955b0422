//! Route handlers, grouped by the part of the storefront they serve.

pub mod cart;
pub mod customers;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;
pub mod views;
pub mod workflows;

use axum::Json;
use chrono::Utc;
use common::WorkflowId;
use serde_json::Value;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;

/// Submits `workflow` under `id` and waits for its result.
async fn run(
    state: &AppState,
    id: String,
    workflow: &'static str,
    input: Value,
) -> Result<Json<Value>, ApiError> {
    ::metrics::counter!("gateway_workflow_requests_total", "workflow" => workflow).increment(1);
    let handle = state
        .orchestrator
        .submit(WorkflowId::new(id), workflow, input)
        .await?;
    Ok(Json(handle.result().await?))
}

/// Workflow id of a one-off request. The uuid suffix keeps two requests
/// within the same second apart.
fn request_id(prefix: &str) -> String {
    format!(
        "{prefix}-{}-{}",
        Utc::now().timestamp(),
        Uuid::new_v4().simple()
    )
}

/// Renders a JSON scalar as it should appear inside an id.
fn id_part(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Rejects the request with `message` unless every field is present.
fn require(body: &Value, fields: &[&str], message: &str) -> Result<(), ApiError> {
    if fields
        .iter()
        .all(|field| body.get(*field).is_some_and(|v| !v.is_null()))
    {
        Ok(())
    } else {
        Err(ApiError::BadRequest(message.to_string()))
    }
}
