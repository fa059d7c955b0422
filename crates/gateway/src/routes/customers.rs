//! Customer endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde_json::Value;

use super::{id_part, request_id, require, run};
use crate::AppState;
use crate::error::ApiError;

/// POST /customer/create: registers a customer through the customer nodes.
#[tracing::instrument(skip(state, body))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    require(&body, &["customer_email"], "'customer_email' required")?;
    let id = request_id(&format!(
        "create-customer-{}",
        id_part(&body["customer_email"])
    ));
    run(&state, id, "create_customer_workflow", body).await
}
