//! In-memory order storage.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::{NewOrderItem, Order, OrderItem, OrderStatus};
use crate::error::{DomainError, Result};

#[derive(Default)]
struct OrderTable {
    orders: BTreeMap<i64, Order>,
    history: HashMap<i64, Vec<OrderStatus>>,
    last_order_id: i64,
    last_item_id: i64,
}

impl OrderTable {
    fn order_mut(&mut self, order_id: i64) -> Result<&mut Order> {
        self.orders
            .get_mut(&order_id)
            .ok_or_else(|| DomainError::not_found("Order", order_id))
    }

    fn insert(&mut self, order: Order) {
        self.last_order_id = self.last_order_id.max(order.order_id);
        self.history
            .entry(order.order_id)
            .or_default()
            .push(order.order_status);
        self.orders.insert(order.order_id, order);
    }
}

/// In-memory store of carts and orders.
///
/// Every status change is appended to a per-order history so callers can
/// check that an order walked its lifecycle without skipping stages.
#[derive(Clone, Default)]
pub struct OrderStore {
    table: Arc<RwLock<OrderTable>>,
}

impl OrderStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully formed order, e.g. a cart imported from elsewhere.
    ///
    /// Later carts are numbered after the highest id seen so far.
    pub async fn insert(&self, order: Order) -> Result<Order> {
        let mut table = self.table.write().await;
        if table.orders.contains_key(&order.order_id) {
            return Err(DomainError::conflict("Order", order.order_id));
        }
        table.insert(order.clone());
        Ok(order)
    }

    /// Returns the customer's open cart, creating one if none exists.
    ///
    /// The flag is true when a new cart was created.
    #[tracing::instrument(skip(self))]
    pub async fn get_or_create_cart(&self, customer_email: &str) -> Result<(Order, bool)> {
        let mut table = self.table.write().await;
        if let Some(cart) = table.orders.values().find(|o| {
            o.customer_email == customer_email && o.order_status == OrderStatus::Cart
        }) {
            return Ok((cart.clone(), false));
        }

        let cart = Order::cart(table.last_order_id + 1, customer_email);
        table.insert(cart.clone());
        tracing::info!(order_id = cart.order_id, "cart created");
        Ok((cart, true))
    }

    /// Adds an item to a cart and refreshes the cart totals.
    #[tracing::instrument(skip(self, item), fields(product = %item.product_name))]
    pub async fn add_item(&self, order_id: i64, item: NewOrderItem) -> Result<Order> {
        let mut table = self.table.write().await;
        table.last_item_id += 1;
        let item_id = table.last_item_id;

        let order = table.order_mut(order_id)?;
        if !order.order_status.can_modify_items() {
            return Err(DomainError::OrderLocked {
                order_id,
                status: order.order_status,
            });
        }
        order.items.push(OrderItem {
            item_id,
            order_id,
            product_name: item.product_name,
            product_display: item.product_display,
            product_price: item.product_price,
            product_image: item.product_image,
        });
        order.recompute_totals();
        Ok(order.clone())
    }

    /// Removes an item from a cart and refreshes the cart totals.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, order_id: i64, item_id: i64) -> Result<Order> {
        let mut table = self.table.write().await;
        let order = table.order_mut(order_id)?;
        if !order.order_status.can_modify_items() {
            return Err(DomainError::OrderLocked {
                order_id,
                status: order.order_status,
            });
        }

        let before = order.items.len();
        order.items.retain(|item| item.item_id != item_id);
        if order.items.len() == before {
            return Err(DomainError::not_found("Order item", item_id));
        }
        order.recompute_totals();
        Ok(order.clone())
    }

    /// Looks up an order with its items.
    pub async fn get(&self, order_id: i64) -> Option<Order> {
        self.table.read().await.orders.get(&order_id).cloned()
    }

    /// Applies a partial update keyed by the patch's `order_id`.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update(&self, patch: &Map<String, Value>) -> Result<Order> {
        let order_id = patch
            .get("order_id")
            .ok_or(DomainError::MissingField("order_id"))?
            .as_i64()
            .ok_or_else(|| DomainError::invalid_field("order_id", "must be an integer"))?;

        let mut table = self.table.write().await;
        let order = table.order_mut(order_id)?;
        let from = order.order_status;
        order.apply_patch(patch)?;
        let updated = order.clone();

        if updated.order_status != from {
            tracing::info!(order_id, %from, to = %updated.order_status, "order status changed");
            table
                .history
                .entry(order_id)
                .or_default()
                .push(updated.order_status);
        }
        Ok(updated)
    }

    /// Every status the order has held, oldest first.
    pub async fn status_history(&self, order_id: i64) -> Vec<OrderStatus> {
        self.table
            .read()
            .await
            .history
            .get(&order_id)
            .cloned()
            .unwrap_or_default()
    }

    /// A customer's placed orders, newest first. Carts are excluded.
    pub async fn customer_orders(&self, customer_email: &str) -> Vec<Order> {
        let mut orders = self
            .select(|o| o.customer_email == customer_email && o.order_status != OrderStatus::Cart)
            .await;
        orders.sort_by(|a, b| {
            b.order_date
                .cmp(&a.order_date)
                .then(b.order_id.cmp(&a.order_id))
        });
        orders
    }

    /// Orders the restaurant is working on.
    pub async fn in_progress(&self) -> Vec<Order> {
        self.select(|o| o.order_status.is_in_progress()).await
    }

    /// Orders a driver can pick up or is delivering.
    pub async fn deliverable(&self) -> Vec<Order> {
        self.select(|o| o.order_status.is_deliverable()).await
    }

    async fn select(&self, predicate: impl Fn(&Order) -> bool) -> Vec<Order> {
        self.table
            .read()
            .await
            .orders
            .values()
            .filter(|o| predicate(o))
            .cloned()
            .collect()
    }
}
