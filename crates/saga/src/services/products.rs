//! Product catalog service.

use domain::{NewProduct, ProductStore};
use serde_json::{Value, json};

use super::{PRODUCTS, bind, decode_arg, string_arg};
use crate::error::StepError;
use crate::worker::ServiceNode;

/// Remote functions over a [`ProductStore`].
#[derive(Clone, Default)]
pub struct ProductsService {
    store: ProductStore,
}

impl ProductsService {
    pub fn new(store: ProductStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ProductStore {
        &self.store
    }

    /// Builds a node serving this service on the products group.
    pub fn node(&self, name: impl Into<String>) -> ServiceNode {
        ServiceNode::builder(name, PRODUCTS)
            .function(
                "add_product",
                bind(self, |s: Self, args| async move { s.add_product(args).await }),
            )
            .function(
                "get_products",
                bind(self, |s: Self, _args| async move { s.get_products().await }),
            )
            .function(
                "remove_product",
                bind(self, |s: Self, args| async move { s.remove_product(args).await }),
            )
            .build()
    }

    /// Adds a product. Duplicate names and malformed input fail the call.
    pub async fn add_product(&self, args: Value) -> Result<Value, StepError> {
        let product: NewProduct =
            decode_arg(args).map_err(|e| e.context("Error adding product"))?;

        let product = self
            .store
            .add(product)
            .await
            .map_err(|e| StepError::new(format!("Error adding product: {e}")))?;
        tracing::info!(product = %product.product_name, "product added");

        Ok(json!({
            "success": true,
            "message": "product added successfully",
            "product": product,
        }))
    }

    pub async fn get_products(&self) -> Result<Value, StepError> {
        Ok(json!({
            "success": true,
            "message": "products retrieved successfully",
            "products": self.store.list().await,
        }))
    }

    /// Removes a product by name. Removing an absent product succeeds.
    pub async fn remove_product(&self, args: Value) -> Result<Value, StepError> {
        let name = string_arg(&args, "product_name")
            .map_err(|e| e.context("Error removing product"))?;
        let removed = self.store.remove(&name).await;
        tracing::info!(product = %name, removed, "product removal");

        Ok(json!({
            "success": true,
            "message": "product removed successfully",
            "removed": removed,
        }))
    }
}
