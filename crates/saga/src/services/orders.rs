//! Cart and order storage service.

use domain::{DomainError, NewOrderItem, Order, OrderStore};
use serde_json::{Value, json};

use super::{ORDERS, bind, decode_arg, int_arg, string_arg};
use crate::error::StepError;
use crate::worker::ServiceNode;

/// Remote functions over an [`OrderStore`].
#[derive(Clone, Default)]
pub struct OrdersService {
    store: OrderStore,
}

impl OrdersService {
    pub fn new(store: OrderStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &OrderStore {
        &self.store
    }

    /// Builds a node serving this service on the orders group.
    pub fn node(&self, name: impl Into<String>) -> ServiceNode {
        ServiceNode::builder(name, ORDERS)
            .function(
                "get_or_create_cart",
                bind(self, |s: Self, args| async move { s.get_or_create_cart(args).await }),
            )
            .function(
                "add_to_cart",
                bind(self, |s: Self, args| async move { s.add_to_cart(args).await }),
            )
            .function(
                "remove_from_cart",
                bind(self, |s: Self, args| async move { s.remove_from_cart(args).await }),
            )
            .function(
                "get_order_by_id",
                bind(self, |s: Self, args| async move { s.get_order_by_id(args).await }),
            )
            .function(
                "update_order_by_id",
                bind(self, |s: Self, args| async move { s.update_order_by_id(args).await }),
            )
            .function(
                "get_customer_orders",
                bind(self, |s: Self, args| async move { s.get_customer_orders(args).await }),
            )
            .function(
                "get_in_progress_orders",
                bind(self, |s: Self, _args| async move { s.get_in_progress_orders().await }),
            )
            .function(
                "get_deliverable_orders",
                bind(self, |s: Self, _args| async move { s.get_deliverable_orders().await }),
            )
            .build()
    }

    pub async fn get_or_create_cart(&self, args: Value) -> Result<Value, StepError> {
        let email = string_arg(&args, "customer_email")
            .map_err(|e| e.context("error retrieving or creating cart"))?;

        let (cart, created) = self
            .store
            .get_or_create_cart(&email)
            .await
            .map_err(|e| StepError::new(format!("error retrieving or creating cart: {e}")))?;

        let message = if created {
            "Cart created successfully."
        } else {
            "cart retrieved successfully"
        };
        Ok(json!({
            "success": true,
            "message": message,
            "cart": cart_json(&cart)?,
        }))
    }

    /// Adds `product` to the cart `order_id` and refreshes its totals.
    pub async fn add_to_cart(&self, args: Value) -> Result<Value, StepError> {
        let fail = |e: StepError| e.context("error adding product to cart");
        let order_id = int_arg(&args, "order_id").map_err(fail)?;
        let product = args
            .get("product")
            .cloned()
            .ok_or_else(|| StepError::new("product is required"))
            .and_then(decode_arg::<NewOrderItem>)
            .map_err(fail)?;
        tracing::info!(order_id, product = %product.product_name, "adding product to cart");

        let cart = self
            .store
            .add_item(order_id, product)
            .await
            .map_err(|e| fail(StepError::new(e.to_string())))?;

        Ok(json!({
            "success": true,
            "message": "Product added to cart successfully",
            "cart": cart_json(&cart)?,
        }))
    }

    /// Removes `item.item_id` (or `item_id`) from the cart `order_id`.
    pub async fn remove_from_cart(&self, args: Value) -> Result<Value, StepError> {
        let fail = |e: StepError| e.context("error removing product from cart");
        let order_id = int_arg(&args, "order_id").map_err(fail)?;
        let item = args.get("item").unwrap_or(&args);
        let item_id = int_arg(item, "item_id").map_err(fail)?;
        tracing::info!(order_id, item_id, "removing item from cart");

        let cart = self
            .store
            .remove_item(order_id, item_id)
            .await
            .map_err(|e| fail(StepError::new(e.to_string())))?;

        Ok(json!({
            "success": true,
            "message": "Product removed from cart successfully",
            "cart": cart_json(&cart)?,
        }))
    }

    /// Fetches an order with its items. An unknown id is a
    /// `success: false` reply.
    pub async fn get_order_by_id(&self, args: Value) -> Result<Value, StepError> {
        let order_id = int_arg(&args, "order_id")
            .map_err(|e| e.context("error fetching order"))?;
        tracing::info!(order_id, "fetching order");

        Ok(match self.store.get(order_id).await {
            Some(order) => json!({
                "success": true,
                "message": "order retrieved successfully",
                "order": order,
            }),
            None => json!({
                "success": false,
                "message": format!("order with ID {order_id} not found"),
            }),
        })
    }

    /// Applies a partial field map keyed by its `order_id`.
    pub async fn update_order_by_id(&self, args: Value) -> Result<Value, StepError> {
        let Value::Object(patch) = args else {
            return Err(StepError::new("order_id is required to update an order"));
        };

        match self.store.update(&patch).await {
            Ok(order) => {
                tracing::info!(order_id = order.order_id, status = %order.order_status, "order updated");
                Ok(json!({
                    "success": true,
                    "message": format!("Order with order_id {} updated successfully", order.order_id),
                }))
            }
            Err(DomainError::MissingField("order_id")) => {
                Err(StepError::new("order_id is required to update an order"))
            }
            Err(e) => {
                tracing::error!(error = %e, "order update rejected");
                Err(StepError::new(format!("error updating order: {e}")))
            }
        }
    }

    pub async fn get_customer_orders(&self, args: Value) -> Result<Value, StepError> {
        let email = string_arg(&args, "customer_email")
            .map_err(|e| e.context("Error retrieving order history"))?;
        Ok(json!({
            "success": true,
            "message": "Order history retrieved successfully.",
            "orders": self.store.customer_orders(&email).await,
        }))
    }

    pub async fn get_in_progress_orders(&self) -> Result<Value, StepError> {
        Ok(json!({
            "success": true,
            "message": "In-progress orders retrieved successfully.",
            "orders": self.store.in_progress().await,
        }))
    }

    pub async fn get_deliverable_orders(&self) -> Result<Value, StepError> {
        Ok(json!({
            "success": true,
            "message": "Deliverable orders retrieved successfully",
            "orders": self.store.deliverable().await,
        }))
    }
}

/// A cart as JSON, with its item count.
fn cart_json(cart: &Order) -> Result<Value, StepError> {
    let mut value = serde_json::to_value(cart)?;
    if let Value::Object(map) = &mut value {
        map.insert("cart_item_count".into(), json!(cart.items.len()));
    }
    Ok(value)
}
