//! Cart endpoints. Carts live on the order nodes.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde_json::Value;

use super::{id_part, request_id, require, run};
use crate::AppState;
use crate::error::ApiError;

/// POST /cart/get: the customer's open cart, created on first use.
#[tracing::instrument(skip(state, body))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    require(&body, &["customer_email"], "customer_email required")?;
    let id = request_id(&format!(
        "get-customer-cart-{}",
        id_part(&body["customer_email"])
    ));
    run(&state, id, "dispatch_get_customer_cart", body).await
}

/// POST /cart/add
#[tracing::instrument(skip(state, body))]
pub async fn add(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    require(
        &body,
        &["customer_email", "product", "order_id"],
        "'customer_email', 'product', and 'order_id' required",
    )?;
    let id = request_id(&format!("add-to-cart-{}", id_part(&body["customer_email"])));
    run(&state, id, "dispatch_add_to_cart", body).await
}

/// POST /cart/remove
#[tracing::instrument(skip(state, body))]
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    require(&body, &["customer_email"], "'customer_email' required")?;
    let id = request_id(&format!(
        "remove-from-cart-{}",
        id_part(&body["customer_email"])
    ));
    run(&state, id, "dispatch_remove_from_cart", body).await
}
