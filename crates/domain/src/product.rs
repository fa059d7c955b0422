//! Product catalog keyed by product name.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{DomainError, Result};

/// A catalog entry. Prices are whole currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub product_name: String,
    pub product_display: String,
    pub product_price: i64,
    pub product_image: String,
}

/// Input for adding a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub product_name: String,
    pub product_display: String,
    pub product_price: i64,
    pub product_image: String,
}

#[derive(Default)]
struct ProductTable {
    rows: Vec<Product>,
    next_id: i64,
}

/// In-memory product catalog with unique product names.
#[derive(Clone, Default)]
pub struct ProductStore {
    table: Arc<RwLock<ProductTable>>,
}

impl ProductStore {
    /// Creates a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    #[tracing::instrument(skip(self, product), fields(name = %product.product_name))]
    pub async fn add(&self, product: NewProduct) -> Result<Product> {
        if product.product_price < 0 {
            return Err(DomainError::invalid_field(
                "product_price",
                "must not be negative",
            ));
        }

        let mut table = self.table.write().await;
        if table
            .rows
            .iter()
            .any(|p| p.product_name == product.product_name)
        {
            return Err(DomainError::conflict("Product", &product.product_name));
        }

        table.next_id += 1;
        let added = Product {
            id: table.next_id,
            product_name: product.product_name,
            product_display: product.product_display,
            product_price: product.product_price,
            product_image: product.product_image,
        };
        table.rows.push(added.clone());
        Ok(added)
    }

    /// All products in insertion order.
    pub async fn list(&self) -> Vec<Product> {
        self.table.read().await.rows.clone()
    }

    /// Removes a product by name. Returns whether anything was removed.
    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, product_name: &str) -> bool {
        let mut table = self.table.write().await;
        let before = table.rows.len();
        table.rows.retain(|p| p.product_name != product_name);
        table.rows.len() != before
    }
}
