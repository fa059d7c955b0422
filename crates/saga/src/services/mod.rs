//! Storage services exposed as remote functions on worker groups.
//!
//! Each service wraps an in-memory store from the `domain` crate and answers
//! with the envelope `{ "success": bool, "message": String, ... }`. A
//! `success: false` envelope is a normal reply (e.g. "Customer not found");
//! a returned [`StepError`] is an application failure of the call.

pub mod customers;
pub mod orders;
pub mod products;

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::StepError;
use crate::transport::LocalTransport;
use crate::worker::{RemoteFunction, ServiceNode};

pub use customers::CustomersService;
pub use orders::OrdersService;
pub use products::ProductsService;

/// Target group of the customer service nodes.
pub const CUSTOMERS: &str = "customers-service-nodes";
/// Target group of the product catalog nodes.
pub const PRODUCTS: &str = "products-service-nodes";
/// Target group of the cart and order nodes.
pub const ORDERS: &str = "orders-service-nodes";

/// The three storage services, sharing their stores across every node
/// built from them.
#[derive(Clone, Default)]
pub struct Services {
    pub customers: CustomersService,
    pub products: ProductsService,
    pub orders: OrdersService,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `replicas` nodes per service group on `transport` and
    /// returns them, customers first.
    pub async fn register(
        &self,
        transport: &LocalTransport,
        replicas: usize,
    ) -> Vec<Arc<ServiceNode>> {
        let mut nodes = Vec::with_capacity(replicas * 3);
        for n in 1..=replicas.max(1) {
            nodes.push(Arc::new(self.customers.node(format!("customers-{n}"))));
            nodes.push(Arc::new(self.products.node(format!("products-{n}"))));
            nodes.push(Arc::new(self.orders.node(format!("orders-{n}"))));
        }
        for node in &nodes {
            transport.register(node.clone()).await;
        }
        nodes
    }
}

/// Adapts a service method to a [`RemoteFunction`] bound to a clone of the
/// service.
pub(crate) fn bind<S, F, Fut>(service: &S, method: F) -> impl RemoteFunction + 'static
where
    S: Clone + Send + Sync + 'static,
    F: Fn(S, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, StepError>> + Send + 'static,
{
    let service = service.clone();
    move |args: Value| method(service.clone(), args)
}

/// Reads a string argument passed either bare or as `field` of an object.
pub(crate) fn string_arg(args: &Value, field: &str) -> Result<String, StepError> {
    match args {
        Value::String(s) => Ok(s.clone()),
        Value::Object(map) => map
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StepError::new(format!("{field} is required"))),
        _ => Err(StepError::new(format!("{field} is required"))),
    }
}

/// Reads an integer argument passed either bare or as `field` of an object.
/// Numeric strings are accepted.
pub(crate) fn int_arg(args: &Value, field: &str) -> Result<i64, StepError> {
    let value = match args {
        Value::Object(map) => map
            .get(field)
            .ok_or_else(|| StepError::new(format!("{field} is required")))?,
        other => other,
    };
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| StepError::new(format!("{field} must be an integer")))
}

pub(crate) fn decode_arg<T: DeserializeOwned>(args: Value) -> Result<T, StepError> {
    serde_json::from_value(args).map_err(|e| StepError::new(e.to_string()))
}
