//! Orders and carts.

mod model;
mod state;
mod store;

pub use model::{DEFAULT_DELIVERY_FEE, NewOrderItem, Order, OrderItem};
pub use state::{OrderGate, OrderStatus};
pub use store::OrderStore;
