//! Product catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde_json::Value;

use super::{request_id, require, run};
use crate::AppState;
use crate::error::ApiError;

/// POST /products/add
#[tracing::instrument(skip(state, body))]
pub async fn add(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    run(&state, request_id("add-product"), "dispatch_add_product", body).await
}

/// POST /products/remove
#[tracing::instrument(skip(state, body))]
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    require(&body, &["product_name"], "product_name required")?;
    run(
        &state,
        request_id("remove-product"),
        "dispatch_remove_product",
        body,
    )
    .await
}
