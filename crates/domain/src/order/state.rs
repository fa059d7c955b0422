//! Order lifecycle and the promise gates that advance it.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The status of an order in its lifecycle.
///
/// Status transitions are strictly linear; an order never skips a stage and
/// never moves backward:
/// ```text
/// Cart ──► PaymentRequired ──► PaymentComplete ──► RestaurantConfirmed
///      ──► DriverConfirmed ──► ReadyForPickup ──► OutForDelivery ──► Delivered
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Items can be added and removed.
    #[default]
    Cart,
    /// Checkout started, waiting for payment.
    PaymentRequired,
    PaymentComplete,
    RestaurantConfirmed,
    DriverConfirmed,
    ReadyForPickup,
    OutForDelivery,
    /// Terminal state.
    Delivered,
}

impl OrderStatus {
    /// Every stage in lifecycle order.
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Cart,
        OrderStatus::PaymentRequired,
        OrderStatus::PaymentComplete,
        OrderStatus::RestaurantConfirmed,
        OrderStatus::DriverConfirmed,
        OrderStatus::ReadyForPickup,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
    ];

    /// Returns the following stage, or `None` once delivered.
    pub fn next(&self) -> Option<OrderStatus> {
        let position = Self::ALL.iter().position(|s| s == self)?;
        Self::ALL.get(position + 1).copied()
    }

    /// An update may keep the current status or advance exactly one stage.
    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        *self == to || self.next() == Some(to)
    }

    /// Returns true if items can be modified in this state.
    pub fn can_modify_items(&self) -> bool {
        matches!(self, OrderStatus::Cart)
    }

    /// Paid for and not yet delivered.
    pub fn is_in_progress(&self) -> bool {
        !matches!(
            self,
            OrderStatus::Cart | OrderStatus::PaymentRequired | OrderStatus::Delivered
        )
    }

    /// Accepted by the restaurant and not yet delivered.
    pub fn is_deliverable(&self) -> bool {
        matches!(
            self,
            OrderStatus::RestaurantConfirmed
                | OrderStatus::DriverConfirmed
                | OrderStatus::ReadyForPickup
                | OrderStatus::OutForDelivery
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered)
    }

    /// Returns the status name as stored and sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Cart => "cart",
            OrderStatus::PaymentRequired => "payment_required",
            OrderStatus::PaymentComplete => "payment_complete",
            OrderStatus::RestaurantConfirmed => "restaurant_confirmed",
            OrderStatus::DriverConfirmed => "driver_confirmed",
            OrderStatus::ReadyForPickup => "ready_for_pickup",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                DomainError::invalid_field("order_status", format!("unknown status '{s}'"))
            })
    }
}

/// An externally-resolved signal the fulfillment saga waits on.
///
/// Each gate owns one promise-id field on the order; resolving the promise
/// moves the order to [`OrderGate::status_on_resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderGate {
    PaymentConfirmation,
    RestaurantConfirmation,
    ReadyForPickup,
    DriverConfirmation,
    OutForDelivery,
    DeliveryConfirmation,
}

impl OrderGate {
    /// Order in which the saga creates the gate promises.
    pub const ALL: [OrderGate; 6] = [
        OrderGate::PaymentConfirmation,
        OrderGate::RestaurantConfirmation,
        OrderGate::ReadyForPickup,
        OrderGate::DriverConfirmation,
        OrderGate::OutForDelivery,
        OrderGate::DeliveryConfirmation,
    ];

    /// Order in which the saga waits on them.
    ///
    /// Differs from [`OrderGate::ALL`]: a driver is confirmed before the food
    /// is ready for pickup.
    pub const WAIT_ORDER: [OrderGate; 6] = [
        OrderGate::PaymentConfirmation,
        OrderGate::RestaurantConfirmation,
        OrderGate::DriverConfirmation,
        OrderGate::ReadyForPickup,
        OrderGate::OutForDelivery,
        OrderGate::DeliveryConfirmation,
    ];

    /// Name of the order field holding this gate's promise id.
    pub fn field(&self) -> &'static str {
        match self {
            OrderGate::PaymentConfirmation => "payment_confirmation_promise_id",
            OrderGate::RestaurantConfirmation => "restaurant_confirmation_promise_id",
            OrderGate::ReadyForPickup => "ready_for_pickup_promise_id",
            OrderGate::DriverConfirmation => "driver_confirmation_promise_id",
            OrderGate::OutForDelivery => "out_for_delivery_promise_id",
            OrderGate::DeliveryConfirmation => "delivery_confirmation_promise_id",
        }
    }

    /// Status the order takes once this gate's promise resolves.
    pub fn status_on_resolve(&self) -> OrderStatus {
        match self {
            OrderGate::PaymentConfirmation => OrderStatus::PaymentComplete,
            OrderGate::RestaurantConfirmation => OrderStatus::RestaurantConfirmed,
            OrderGate::DriverConfirmation => OrderStatus::DriverConfirmed,
            OrderGate::ReadyForPickup => OrderStatus::ReadyForPickup,
            OrderGate::OutForDelivery => OrderStatus::OutForDelivery,
            OrderGate::DeliveryConfirmation => OrderStatus::Delivered,
        }
    }

    /// Looks a gate up by its order field name.
    pub fn from_field(field: &str) -> Option<OrderGate> {
        Self::ALL.into_iter().find(|gate| gate.field() == field)
    }
}
