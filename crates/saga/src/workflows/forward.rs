//! Single-call forwarding workflows.
//!
//! Each forwards its input to one remote function with `rfc` and returns
//! the reply unchanged, so the call is journaled and deduplicated like any
//! other step.

use async_trait::async_trait;
use serde_json::Value;

use super::{require_string, string_input};
use crate::context::{Flow, WorkflowContext};
use crate::dispatch::RemoteCall;
use crate::error::{Result, SagaError};
use crate::registry::Workflow;
use crate::services::{CUSTOMERS, ORDERS, PRODUCTS};

/// A workflow whose only step is one remote call.
#[derive(Debug, Clone)]
pub struct Forward {
    name: &'static str,
    target: &'static str,
    function: &'static str,
    /// Forward only this field of an object input, as a bare value.
    pluck: Option<&'static str>,
    /// Fields the input must carry.
    required: &'static [&'static str],
    /// Prefix for failure messages.
    context: Option<&'static str>,
}

impl Forward {
    pub fn create_customer() -> Self {
        Self {
            name: "create_customer_workflow",
            target: CUSTOMERS,
            function: "create_customer",
            pluck: None,
            required: &["customer_email"],
            context: Some("Error in Create Customer Workflow"),
        }
    }

    pub fn add_product() -> Self {
        Self {
            name: "dispatch_add_product",
            target: PRODUCTS,
            function: "add_product",
            pluck: None,
            required: &[],
            context: None,
        }
    }

    pub fn remove_product() -> Self {
        Self {
            name: "dispatch_remove_product",
            target: PRODUCTS,
            function: "remove_product",
            pluck: Some("product_name"),
            required: &["product_name"],
            context: None,
        }
    }

    pub fn get_customer_cart() -> Self {
        Self {
            name: "dispatch_get_customer_cart",
            target: ORDERS,
            function: "get_or_create_cart",
            pluck: Some("customer_email"),
            required: &["customer_email"],
            context: None,
        }
    }

    pub fn add_to_cart() -> Self {
        Self {
            name: "dispatch_add_to_cart",
            target: ORDERS,
            function: "add_to_cart",
            pluck: None,
            required: &["customer_email", "order_id", "product"],
            context: Some("error in dispatch_add_to_cart"),
        }
    }

    pub fn remove_from_cart() -> Self {
        Self {
            name: "dispatch_remove_from_cart",
            target: ORDERS,
            function: "remove_from_cart",
            pluck: None,
            required: &["customer_email", "order_id", "item"],
            context: Some("error in dispatch_remove_from_cart"),
        }
    }

    pub fn get_in_progress_orders() -> Self {
        Self {
            name: "dispatch_get_in_progress_orders",
            target: ORDERS,
            function: "get_in_progress_orders",
            pluck: None,
            required: &[],
            context: None,
        }
    }

    fn argument(&self, input: Value) -> Value {
        match self.pluck {
            Some(field) => string_input(&input, field)
                .map(Value::String)
                .unwrap_or(input),
            None => input,
        }
    }
}

#[async_trait]
impl Workflow for Forward {
    fn name(&self) -> &str {
        self.name
    }

    fn validate(&self, input: &Value) -> Result<()> {
        if let Some(field) = self.pluck {
            return require_string(input, field);
        }
        for field in self.required {
            if input.get(*field).is_none_or(Value::is_null) {
                return Err(SagaError::Validation(format!("'{field}' required")));
            }
        }
        Ok(())
    }

    async fn run(&self, ctx: &mut WorkflowContext, input: Value) -> Flow<Value> {
        let call = RemoteCall::new(self.target, self.function, self.argument(input));
        let result = ctx.rfc(call).await;
        match self.context {
            Some(prefix) => result.map_err(|e| e.context(prefix)),
            None => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pluck_forwards_bare_value() {
        let forward = Forward::remove_product();
        assert_eq!(
            forward.argument(json!({"product_name": "pizza", "extra": 1})),
            json!("pizza")
        );
        assert_eq!(forward.argument(json!("pizza")), json!("pizza"));
    }

    #[test]
    fn validation_names_missing_field() {
        let err = Forward::add_to_cart()
            .validate(&json!({"customer_email": "a@example.com", "order_id": 1}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Validation error: 'product' required");

        assert!(Forward::get_customer_cart().validate(&json!({})).is_err());
        assert!(Forward::get_in_progress_orders().validate(&Value::Null).is_ok());
    }
}
