//! Aggregated views for the customer, restaurant and driver screens.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde_json::Value;

use super::{id_part, request_id, require, run};
use crate::AppState;
use crate::error::ApiError;

/// POST /views/customer
#[tracing::instrument(skip(state, body))]
pub async fn customer(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    require(
        &body,
        &["customer_email"],
        "Missing 'customer_email' in request data",
    )?;
    let email = body["customer_email"].clone();
    let id = request_id(&format!("get-customer-view-{}", id_part(&email)));
    run(&state, id, "get_customer_view_workflow", email).await
}

/// GET /views/restaurant
#[tracing::instrument(skip(state))]
pub async fn restaurant(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    run(
        &state,
        request_id("get-restaurant-view"),
        "get_restaurant_view_workflow",
        Value::Null,
    )
    .await
}

/// POST /views/driver
#[tracing::instrument(skip(state))]
pub async fn driver(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    run(
        &state,
        request_id("get-driver-view"),
        "get_driver_view_workflow",
        Value::Null,
    )
    .await
}
