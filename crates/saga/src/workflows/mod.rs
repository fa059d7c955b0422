//! Workflow definitions served by the gateway.

pub mod forward;
pub mod order_fulfillment;
pub mod views;

use serde_json::{Map, Value};

use crate::error::{SagaError, StepError};
use crate::registry::WorkflowRegistry;

pub use forward::Forward;
pub use order_fulfillment::OrderWorkflow;
pub use views::{CustomerViewWorkflow, DriverViewWorkflow, RestaurantViewWorkflow};

/// Registry holding every definition in this module.
pub fn registry() -> WorkflowRegistry {
    WorkflowRegistry::builder()
        .register(OrderWorkflow)
        .register(CustomerViewWorkflow)
        .register(RestaurantViewWorkflow)
        .register(DriverViewWorkflow)
        .register(Forward::create_customer())
        .register(Forward::add_product())
        .register(Forward::remove_product())
        .register(Forward::get_customer_cart())
        .register(Forward::add_to_cart())
        .register(Forward::remove_from_cart())
        .register(Forward::get_in_progress_orders())
        .build()
}

/// Unwraps a `{success, message, ...}` reply, failing the step with the
/// reply's message when `success` is not true.
pub(crate) fn expect_success(reply: &Value) -> Result<(), StepError> {
    if reply.get("success").and_then(Value::as_bool) == Some(true) {
        return Ok(());
    }
    let message = reply
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("remote call reported failure");
    Err(StepError::new(message))
}

/// Takes `key` out of a reply.
pub(crate) fn take(reply: &mut Value, key: &str) -> Result<Value, StepError> {
    reply
        .get_mut(key)
        .map(Value::take)
        .ok_or_else(|| StepError::new(format!("reply is missing '{key}'")))
}

pub(crate) fn into_object(value: Value, what: &str) -> Result<Map<String, Value>, StepError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(StepError::new(format!("{what} is not an object"))),
    }
}

/// Reads a string passed bare or as `field` of an object.
pub(crate) fn string_input(input: &Value, field: &str) -> Option<String> {
    match input {
        Value::String(s) => Some(s.clone()),
        other => other.get(field).and_then(Value::as_str).map(str::to_string),
    }
}

pub(crate) fn require_string(input: &Value, field: &str) -> Result<(), SagaError> {
    match string_input(input, field) {
        Some(s) if !s.is_empty() => Ok(()),
        _ => Err(SagaError::Validation(format!("'{field}' required"))),
    }
}
