//! Domain error types.

use thiserror::Error;

use crate::order::OrderStatus;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The record does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A record with the same natural key already exists.
    #[error("{entity} {key} already exists")]
    Conflict { entity: &'static str, key: String },

    /// A required input field is absent.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// A field has the wrong type or an unknown name.
    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    /// The order status may only stay put or advance to the next stage.
    #[error("Invalid status transition for order {order_id}: {from} -> {to}")]
    InvalidStatusTransition {
        order_id: i64,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// Items can only change while the order is still a cart.
    #[error("Order {order_id} is no longer a cart (status {status})")]
    OrderLocked { order_id: i64, status: OrderStatus },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    pub(crate) fn not_found(entity: &'static str, key: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub(crate) fn conflict(entity: &'static str, key: impl ToString) -> Self {
        DomainError::Conflict {
            entity,
            key: key.to_string(),
        }
    }

    pub(crate) fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        DomainError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
