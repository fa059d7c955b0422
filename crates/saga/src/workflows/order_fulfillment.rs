//! The order fulfillment saga.
//!
//! ```text
//! get_order_by_id ─► get_customer ─► 6 × promise ─► update(payment_required)
//!   └─► for each gate: await promise ─► update(next status)
//! ```
//!
//! The order walks `payment_required → payment_complete →
//! restaurant_confirmed → driver_confirmed → ready_for_pickup →
//! out_for_delivery → delivered`, one status per resolved gate.

use std::collections::HashMap;

use async_trait::async_trait;
use domain::OrderGate;
use serde_json::{Map, Value, json};

use super::{expect_success, into_object, take};
use crate::context::{Flow, WorkflowContext};
use crate::dispatch::RemoteCall;
use crate::error::{Result, SagaError, StepError};
use crate::registry::Workflow;
use crate::services::{CUSTOMERS, ORDERS};

pub const NAME: &str = "order_workflow";

/// Takes a placed cart through payment, restaurant, driver and delivery.
pub struct OrderWorkflow;

#[async_trait]
impl Workflow for OrderWorkflow {
    fn name(&self) -> &str {
        NAME
    }

    fn validate(&self, input: &Value) -> Result<()> {
        match input.get("order_id") {
            Some(Value::Number(n)) if n.is_i64() => Ok(()),
            Some(Value::String(s)) if s.parse::<i64>().is_ok() => Ok(()),
            Some(_) => Err(SagaError::Validation("'order_id' must be an integer".into())),
            None => Err(SagaError::Validation("'order_id' required".into())),
        }
    }

    async fn run(&self, ctx: &mut WorkflowContext, input: Value) -> Flow<Value> {
        fulfil(ctx, input)
            .await
            .map_err(|e| e.context("Error in Order Workflow"))
    }
}

async fn fulfil(ctx: &mut WorkflowContext, input: Value) -> Flow<Value> {
    let order_id = input.get("order_id").cloned().unwrap_or(Value::Null);
    tracing::info!(workflow_id = %ctx.workflow_id(), %order_id, "order workflow started");

    let mut reply: Value = ctx
        .rfc(RemoteCall::new(ORDERS, "get_order_by_id", order_id.clone()))
        .await?;
    expect_success(&reply)?;
    let mut order = into_object(take(&mut reply, "order")?, "order")?;

    let email = order
        .get("customer_email")
        .cloned()
        .ok_or_else(|| StepError::new("order has no customer_email"))?;
    let mut reply: Value = ctx
        .rfc(RemoteCall::new(CUSTOMERS, "get_customer", email))
        .await?;
    expect_success(&reply)?;
    let customer = take(&mut reply, "customer")?;

    order.insert("order_status".into(), json!("payment_required"));
    for field in ["customer_name", "customer_delivery_address"] {
        order.insert(field.into(), customer.get(field).cloned().unwrap_or(Value::Null));
    }

    let mut gates = HashMap::new();
    for gate in OrderGate::ALL {
        let handle = ctx.promise(None).await?;
        order.insert(gate.field().into(), json!(handle.id));
        gates.insert(gate, handle);
    }
    update(ctx, &order).await?;

    for gate in OrderGate::WAIT_ORDER {
        let handle = gates
            .remove(&gate)
            .ok_or_else(|| StepError::new(format!("no promise for {}", gate.field())))?;
        tracing::info!(%order_id, promise_id = %handle.id, gate = gate.field(), "waiting on gate");
        let _: Value = ctx.await_promise(&handle).await?;

        let status = gate.status_on_resolve();
        tracing::info!(%order_id, %status, "gate resolved");
        order.insert("order_status".into(), json!(status));
        update(ctx, &order).await?;
    }

    tracing::info!(%order_id, "order workflow complete");
    Ok(json!({
        "success": true,
        "message": format!("Order workflow complete for order {order_id}"),
        "order_id": order_id,
    }))
}

async fn update(ctx: &mut WorkflowContext, order: &Map<String, Value>) -> Flow<()> {
    let reply: Value = ctx
        .rfc(RemoteCall::new(
            ORDERS,
            "update_order_by_id",
            Value::Object(order.clone()),
        ))
        .await?;
    expect_success(&reply)?;
    Ok(())
}
