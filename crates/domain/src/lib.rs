//! Storage collaborators of the fulfillment saga.
//!
//! This crate provides:
//! - `CustomerStore` keyed by customer email
//! - `ProductStore` keyed by product name
//! - `OrderStore` holding carts, orders and their items, with the
//!   eight-stage `OrderStatus` lifecycle enforced on every update

pub mod customer;
pub mod error;
pub mod order;
pub mod product;

pub use customer::{Customer, CustomerStore, NewCustomer};
pub use error::{DomainError, Result};
pub use order::{NewOrderItem, Order, OrderGate, OrderItem, OrderStatus, OrderStore};
pub use product::{NewProduct, Product, ProductStore};
