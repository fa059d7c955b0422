//! Customer records service.

use domain::{CustomerStore, DomainError, NewCustomer};
use serde_json::{Value, json};

use super::{CUSTOMERS, bind, decode_arg, string_arg};
use crate::error::StepError;
use crate::worker::ServiceNode;

/// Remote functions over a [`CustomerStore`].
#[derive(Clone, Default)]
pub struct CustomersService {
    store: CustomerStore,
}

impl CustomersService {
    pub fn new(store: CustomerStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &CustomerStore {
        &self.store
    }

    /// Builds a node serving this service on the customers group.
    pub fn node(&self, name: impl Into<String>) -> ServiceNode {
        ServiceNode::builder(name, CUSTOMERS)
            .function(
                "get_customer",
                bind(self, |s: Self, args| async move { s.get_customer(args).await }),
            )
            .function(
                "create_customer",
                bind(self, |s: Self, args| async move { s.create_customer(args).await }),
            )
            .function(
                "get_customers",
                bind(self, |s: Self, _args| async move { s.get_customers().await }),
            )
            .build()
    }

    /// Looks a customer up by email. An unknown email is a
    /// `success: false` reply, not a failure.
    pub async fn get_customer(&self, args: Value) -> Result<Value, StepError> {
        let email = string_arg(&args, "customer_email")?;
        tracing::info!(%email, "getting customer");

        Ok(match self.store.get_by_email(&email).await {
            Some(customer) => json!({
                "success": true,
                "customer": customer,
                "message": "Customer found",
            }),
            None => json!({
                "success": false,
                "message": "Customer not found",
            }),
        })
    }

    pub async fn create_customer(&self, args: Value) -> Result<Value, StepError> {
        let customer: NewCustomer = decode_arg(args)
            .map_err(|e| e.context("Error inserting into customers"))?;
        tracing::info!(email = %customer.customer_email, "creating customer");

        let email = customer.customer_email.clone();
        match self.store.create(customer).await {
            Ok(_) => Ok(json!({
                "success": true,
                "message": "Customer created successfully.",
            })),
            Err(DomainError::Conflict { .. }) => {
                let message = format!("Customer with email {email} already exists.");
                tracing::warn!("{message}");
                Ok(json!({ "success": false, "message": message }))
            }
            Err(e) => Err(StepError::new(format!("Error inserting into customers: {e}"))),
        }
    }

    pub async fn get_customers(&self) -> Result<Value, StepError> {
        Ok(json!({
            "success": true,
            "message": "customers retrieved successfully",
            "customers": self.store.list().await,
        }))
    }
}
