//! Read-only aggregate views for the customer, restaurant and driver UIs.
//!
//! The customer and restaurant views fan out their independent reads with
//! `rfi` and fan them back in with `await_promise`.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::{expect_success, require_string, string_input, take};
use crate::context::{Flow, WorkflowContext};
use crate::dispatch::RemoteCall;
use crate::error::{Result, StepError};
use crate::promise::PromiseHandle;
use crate::registry::Workflow;
use crate::services::{CUSTOMERS, ORDERS, PRODUCTS};

/// Customer, cart, order history and catalog for one customer.
///
/// Input is the customer email, bare or as `customer_email`. An unknown
/// customer returns the unsuccessful `get_customer` reply as the result.
pub struct CustomerViewWorkflow;

#[async_trait]
impl Workflow for CustomerViewWorkflow {
    fn name(&self) -> &str {
        "get_customer_view_workflow"
    }

    fn validate(&self, input: &Value) -> Result<()> {
        require_string(input, "customer_email")
    }

    async fn run(&self, ctx: &mut WorkflowContext, input: Value) -> Flow<Value> {
        customer_view(ctx, input)
            .await
            .map_err(|e| e.context("error in Get Customer View Workflow"))
    }
}

async fn customer_view(ctx: &mut WorkflowContext, input: Value) -> Flow<Value> {
    let email = string_input(&input, "customer_email")
        .ok_or_else(|| StepError::new("customer_email is required"))?;

    let mut reply: Value = ctx
        .rfc(RemoteCall::new(CUSTOMERS, "get_customer", json!(email)))
        .await?;
    if expect_success(&reply).is_err() {
        return Ok(reply);
    }

    let mut view = Map::new();
    view.insert("customer".into(), take(&mut reply, "customer")?);

    let cart = ctx
        .rfi(RemoteCall::new(ORDERS, "get_or_create_cart", json!(email)))
        .await?;
    let orders = ctx
        .rfi(RemoteCall::new(ORDERS, "get_customer_orders", json!(email)))
        .await?;
    let products = ctx
        .rfi(RemoteCall::new(PRODUCTS, "get_products", Value::Null))
        .await?;

    view.insert("cart".into(), fan_in(ctx, &cart, "cart").await?);
    view.insert("orders".into(), fan_in(ctx, &orders, "orders").await?);
    view.insert("products".into(), fan_in(ctx, &products, "products").await?);

    Ok(json!({
        "success": true,
        "customer_view": view,
        "message": "customer view retrieved successfully",
    }))
}

/// Orders in progress, customers and catalog.
pub struct RestaurantViewWorkflow;

#[async_trait]
impl Workflow for RestaurantViewWorkflow {
    fn name(&self) -> &str {
        "get_restaurant_view_workflow"
    }

    async fn run(&self, ctx: &mut WorkflowContext, _input: Value) -> Flow<Value> {
        restaurant_view(ctx)
            .await
            .map_err(|e| e.context("error in Get Restaurant View Workflow"))
    }
}

async fn restaurant_view(ctx: &mut WorkflowContext) -> Flow<Value> {
    tracing::info!(workflow_id = %ctx.workflow_id(), "getting restaurant view");

    let orders = ctx
        .rfi(RemoteCall::new(ORDERS, "get_in_progress_orders", Value::Null))
        .await?;
    let customers = ctx
        .rfi(RemoteCall::new(CUSTOMERS, "get_customers", Value::Null))
        .await?;
    let products = ctx
        .rfi(RemoteCall::new(PRODUCTS, "get_products", Value::Null))
        .await?;

    let mut view = Map::new();
    view.insert("in_progress_orders".into(), fan_in(ctx, &orders, "orders").await?);
    view.insert("customers".into(), fan_in(ctx, &customers, "customers").await?);
    view.insert("products".into(), fan_in(ctx, &products, "products").await?);

    Ok(json!({
        "success": true,
        "restaurant_view": view,
        "message": "restaurant view retrieved successfully",
    }))
}

/// Orders a driver can pick up or is delivering.
pub struct DriverViewWorkflow;

#[async_trait]
impl Workflow for DriverViewWorkflow {
    fn name(&self) -> &str {
        "get_driver_view_workflow"
    }

    async fn run(&self, ctx: &mut WorkflowContext, _input: Value) -> Flow<Value> {
        driver_view(ctx)
            .await
            .map_err(|e| e.context("error in Get Driver View Workflow"))
    }
}

async fn driver_view(ctx: &mut WorkflowContext) -> Flow<Value> {
    let mut reply: Value = ctx
        .rfc(RemoteCall::new(ORDERS, "get_deliverable_orders", Value::Null))
        .await?;
    expect_success(&reply)?;

    Ok(json!({
        "success": true,
        "driver_view": { "deliveries": take(&mut reply, "orders")? },
        "message": "driver view retrieved successfully",
    }))
}

/// Awaits a fanned-out read and extracts `key` from its reply.
async fn fan_in(ctx: &mut WorkflowContext, handle: &PromiseHandle, key: &str) -> Flow<Value> {
    let mut reply: Value = ctx.await_promise(handle).await?;
    expect_success(&reply)?;
    if let Some(message) = reply.get("message").and_then(Value::as_str) {
        tracing::debug!(key, reply = message, "fan-in reply");
    }
    Ok(take(&mut reply, key)?)
}
