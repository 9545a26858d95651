//! Customer directory trait and implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::CustomerId;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use store::{PostgresStore, StoreError};

use crate::error::Result;

/// Contact details shown alongside an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Read access to customers.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn get(&self, customer_id: CustomerId) -> Result<Option<Customer>>;
}

/// In-memory customer directory for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCustomerDirectory {
    customers: Arc<RwLock<HashMap<CustomerId, Customer>>>,
}

impl InMemoryCustomerDirectory {
    /// Creates a new empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a customer without contact details.
    pub fn with_customer(self, id: CustomerId, name: impl Into<String>) -> Self {
        self.insert(Customer {
            id,
            name: name.into(),
            phone: None,
            address: None,
        });
        self
    }

    /// Adds or replaces a customer.
    pub fn insert(&self, customer: Customer) {
        super::write(&self.customers).insert(customer.id, customer);
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryCustomerDirectory {
    async fn get(&self, customer_id: CustomerId) -> Result<Option<Customer>> {
        Ok(super::read(&self.customers).get(&customer_id).cloned())
    }
}

#[async_trait]
impl CustomerDirectory for PostgresStore {
    async fn get(&self, customer_id: CustomerId) -> Result<Option<Customer>> {
        let row = sqlx::query("SELECT id, name, phone, address FROM customers WHERE id = $1")
            .bind(customer_id.as_i64())
            .fetch_optional(self.pool())
            .await
            .map_err(StoreError::from)?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Customer {
            id: CustomerId::new(row.try_get("id").map_err(StoreError::from)?),
            name: row.try_get("name").map_err(StoreError::from)?,
            phone: row.try_get("phone").map_err(StoreError::from)?,
            address: row.try_get("address").map_err(StoreError::from)?,
        }))
    }
}
