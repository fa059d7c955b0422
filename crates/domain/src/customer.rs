//! Customer records keyed by email.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{DomainError, Result};

/// A registered customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub customer_email: String,
    pub customer_name: String,
    pub customer_delivery_address: String,
}

/// Input for creating a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub customer_email: String,
    pub customer_name: String,
    pub customer_delivery_address: String,
}

#[derive(Default)]
struct CustomerTable {
    rows: Vec<Customer>,
    next_id: i64,
}

/// In-memory customer store.
///
/// Emails are unique; a second registration with the same email is a
/// [`DomainError::Conflict`].
#[derive(Clone, Default)]
pub struct CustomerStore {
    table: Arc<RwLock<CustomerTable>>,
}

impl CustomerStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    #[tracing::instrument(skip(self, customer), fields(email = %customer.customer_email))]
    pub async fn create(&self, customer: NewCustomer) -> Result<Customer> {
        let mut table = self.table.write().await;
        if table
            .rows
            .iter()
            .any(|c| c.customer_email == customer.customer_email)
        {
            return Err(DomainError::conflict("Customer", &customer.customer_email));
        }

        table.next_id += 1;
        let created = Customer {
            id: table.next_id,
            customer_email: customer.customer_email,
            customer_name: customer.customer_name,
            customer_delivery_address: customer.customer_delivery_address,
        };
        table.rows.push(created.clone());
        tracing::info!(customer_id = created.id, "customer created");
        Ok(created)
    }

    /// Looks up a customer by email.
    pub async fn get_by_email(&self, email: &str) -> Option<Customer> {
        let table = self.table.read().await;
        table.rows.iter().find(|c| c.customer_email == email).cloned()
    }

    /// All customers in registration order.
    pub async fn list(&self) -> Vec<Customer> {
        self.table.read().await.rows.clone()
    }
}
