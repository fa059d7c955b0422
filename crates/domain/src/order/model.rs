//! Orders, their items and partial updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{OrderGate, OrderStatus};
use crate::error::{DomainError, Result};

/// Delivery fee charged when an order does not specify one.
pub const DEFAULT_DELIVERY_FEE: i64 = 5;

/// A product line in an order. Product fields are a snapshot taken when the
/// item was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub item_id: i64,
    pub order_id: i64,
    pub product_name: String,
    pub product_display: String,
    pub product_price: i64,
    pub product_image: Option<String>,
}

/// Input for adding a product to a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_name: String,
    pub product_display: String,
    pub product_price: i64,
    #[serde(default)]
    pub product_image: Option<String>,
}

/// A cart or a placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: i64,
    pub order_status: OrderStatus,
    pub order_total: i64,
    pub order_delivery_fee: i64,
    pub order_items_total: i64,
    pub customer_email: String,
    pub customer_name: Option<String>,
    pub customer_delivery_address: Option<String>,
    pub order_date: DateTime<Utc>,
    pub payment_confirmation_promise_id: Option<String>,
    pub restaurant_confirmation_promise_id: Option<String>,
    pub ready_for_pickup_promise_id: Option<String>,
    pub driver_confirmation_promise_id: Option<String>,
    pub out_for_delivery_promise_id: Option<String>,
    pub delivery_confirmation_promise_id: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

impl Order {
    /// A fresh empty cart.
    pub fn cart(order_id: i64, customer_email: impl Into<String>) -> Self {
        Self {
            order_id,
            order_status: OrderStatus::Cart,
            order_total: 0,
            order_delivery_fee: DEFAULT_DELIVERY_FEE,
            order_items_total: 0,
            customer_email: customer_email.into(),
            customer_name: None,
            customer_delivery_address: None,
            order_date: Utc::now(),
            payment_confirmation_promise_id: None,
            restaurant_confirmation_promise_id: None,
            ready_for_pickup_promise_id: None,
            driver_confirmation_promise_id: None,
            out_for_delivery_promise_id: None,
            delivery_confirmation_promise_id: None,
            items: Vec::new(),
        }
    }

    /// Returns the promise id recorded for `gate`, if any.
    pub fn gate_promise(&self, gate: OrderGate) -> Option<&str> {
        match gate {
            OrderGate::PaymentConfirmation => self.payment_confirmation_promise_id.as_deref(),
            OrderGate::RestaurantConfirmation => {
                self.restaurant_confirmation_promise_id.as_deref()
            }
            OrderGate::ReadyForPickup => self.ready_for_pickup_promise_id.as_deref(),
            OrderGate::DriverConfirmation => self.driver_confirmation_promise_id.as_deref(),
            OrderGate::OutForDelivery => self.out_for_delivery_promise_id.as_deref(),
            OrderGate::DeliveryConfirmation => self.delivery_confirmation_promise_id.as_deref(),
        }
    }

    fn gate_promise_mut(&mut self, gate: OrderGate) -> &mut Option<String> {
        match gate {
            OrderGate::PaymentConfirmation => &mut self.payment_confirmation_promise_id,
            OrderGate::RestaurantConfirmation => &mut self.restaurant_confirmation_promise_id,
            OrderGate::ReadyForPickup => &mut self.ready_for_pickup_promise_id,
            OrderGate::DriverConfirmation => &mut self.driver_confirmation_promise_id,
            OrderGate::OutForDelivery => &mut self.out_for_delivery_promise_id,
            OrderGate::DeliveryConfirmation => &mut self.delivery_confirmation_promise_id,
        }
    }

    /// Recomputes item and order totals from the current items.
    pub fn recompute_totals(&mut self) {
        self.order_items_total = self.items.iter().map(|item| item.product_price).sum();
        self.order_total = self.order_items_total + self.order_delivery_fee;
    }

    /// Applies a partial field map to the order.
    ///
    /// `order_id`, `items` and `cart_item_count` are accepted and ignored.
    /// Unknown fields and ill-typed values are rejected, and `order_status`
    /// may only stay put or advance one stage. Either every field applies or
    /// none does.
    pub fn apply_patch(&mut self, patch: &Map<String, Value>) -> Result<()> {
        let mut next = self.clone();

        for (field, value) in patch {
            match field.as_str() {
                "order_id" | "items" | "cart_item_count" => {}
                "order_status" => {
                    let to: OrderStatus = decode(field, value)?;
                    if !self.order_status.can_transition_to(to) {
                        return Err(DomainError::InvalidStatusTransition {
                            order_id: self.order_id,
                            from: self.order_status,
                            to,
                        });
                    }
                    next.order_status = to;
                }
                "order_total" => next.order_total = decode(field, value)?,
                "order_delivery_fee" => next.order_delivery_fee = decode(field, value)?,
                "order_items_total" => next.order_items_total = decode(field, value)?,
                "customer_email" => next.customer_email = decode(field, value)?,
                "customer_name" => next.customer_name = decode(field, value)?,
                "customer_delivery_address" => {
                    next.customer_delivery_address = decode(field, value)?
                }
                "order_date" => next.order_date = decode(field, value)?,
                other => match OrderGate::from_field(other) {
                    Some(gate) => *next.gate_promise_mut(gate) = decode(field, value)?,
                    None => return Err(DomainError::invalid_field(other, "unknown order field")),
                },
            }
        }

        *self = next;
        Ok(())
    }
}

fn decode<T: serde::de::DeserializeOwned>(field: &str, value: &Value) -> Result<T> {
    T::deserialize(value).map_err(|e| DomainError::invalid_field(field, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("patch must be an object"),
        }
    }

    fn item(price: i64) -> OrderItem {
        OrderItem {
            item_id: price,
            order_id: 1,
            product_name: format!("p{price}"),
            product_display: format!("P{price}"),
            product_price: price,
            product_image: None,
        }
    }

    #[test]
    fn totals_include_delivery_fee() {
        let mut order = Order::cart(1, "a@example.com");
        order.items = vec![item(10), item(7)];
        order.recompute_totals();
        assert_eq!(order.order_items_total, 17);
        assert_eq!(order.order_total, 22);
    }

    #[test]
    fn patch_sets_fields_and_ignores_bookkeeping_keys() {
        let mut order = Order::cart(1, "a@example.com");
        order
            .apply_patch(&patch(json!({
                "order_id": 1,
                "order_status": "payment_required",
                "customer_name": "Alice",
                "payment_confirmation_promise_id": "wf.2",
                "items": [],
                "cart_item_count": 0,
            })))
            .unwrap();

        assert_eq!(order.order_status, OrderStatus::PaymentRequired);
        assert_eq!(order.customer_name.as_deref(), Some("Alice"));
        assert_eq!(order.gate_promise(OrderGate::PaymentConfirmation), Some("wf.2"));
    }

    #[test]
    fn patch_rejects_skipped_status_without_partial_apply() {
        let mut order = Order::cart(1, "a@example.com");
        let result = order.apply_patch(&patch(json!({
            "customer_name": "Alice",
            "order_status": "delivered",
        })));

        assert!(matches!(
            result,
            Err(DomainError::InvalidStatusTransition { .. })
        ));
        assert_eq!(order.customer_name, None);
        assert_eq!(order.order_status, OrderStatus::Cart);
    }

    #[test]
    fn patch_rejects_unknown_and_ill_typed_fields() {
        let mut order = Order::cart(1, "a@example.com");
        assert!(matches!(
            order.apply_patch(&patch(json!({"favourite_colour": "red"}))),
            Err(DomainError::InvalidField { .. })
        ));
        assert!(matches!(
            order.apply_patch(&patch(json!({"order_total": "lots"}))),
            Err(DomainError::InvalidField { .. })
        ));
    }

    #[test]
    fn order_roundtrips_through_json() {
        let order = Order::cart(9, "a@example.com");
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["order_status"], "cart");
        assert_eq!(json["order_delivery_fee"], 5);
        let back: Order = serde_json::from_value(json).unwrap();
        assert_eq!(back, order);
    }
}
