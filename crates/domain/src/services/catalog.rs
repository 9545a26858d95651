//! Product catalog trait and implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{Money, ProductId};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use store::{PostgresStore, StoreError};

use crate::error::{DomainError, Result};

/// Catalog snapshot of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Purchase cost per unit.
    pub original_price: Money,
}

/// Read access to the product catalog.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get(&self, product_id: ProductId) -> Result<Option<Product>>;

    /// Loads every product in `product_ids`; any unknown id is `NotFound`.
    async fn get_many(&self, product_ids: &[ProductId]) -> Result<HashMap<ProductId, Product>> {
        let mut products = HashMap::with_capacity(product_ids.len());
        for &product_id in product_ids {
            if products.contains_key(&product_id) {
                continue;
            }
            let product = self
                .get(product_id)
                .await?
                .ok_or_else(|| DomainError::not_found("product", product_id))?;
            products.insert(product_id, product);
        }
        Ok(products)
    }
}

/// In-memory product catalog for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductCatalog {
    products: Arc<RwLock<HashMap<ProductId, Product>>>,
}

impl InMemoryProductCatalog {
    /// Creates a new empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a product.
    pub fn with_product(self, id: ProductId, name: impl Into<String>, original_price: Money) -> Self {
        self.insert(Product {
            id,
            name: name.into(),
            original_price,
        });
        self
    }

    /// Adds or replaces a product.
    pub fn insert(&self, product: Product) {
        super::write(&self.products).insert(product.id, product);
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn get(&self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(super::read(&self.products).get(&product_id).cloned())
    }
}

#[async_trait]
impl ProductCatalog for PostgresStore {
    async fn get(&self, product_id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query("SELECT id, name, original_price FROM products WHERE id = $1")
            .bind(product_id.as_i64())
            .fetch_optional(self.pool())
            .await
            .map_err(StoreError::from)?;

        row.map(|row| -> Result<Product> {
            Ok(Product {
                id: ProductId::new(row.try_get("id").map_err(StoreError::from)?),
                name: row.try_get("name").map_err(StoreError::from)?,
                original_price: Money::from_minor(
                    row.try_get("original_price").map_err(StoreError::from)?,
                ),
            })
        })
        .transpose()
    }

    async fn get_many(&self, product_ids: &[ProductId]) -> Result<HashMap<ProductId, Product>> {
        let ids: Vec<i64> = product_ids.iter().map(ProductId::as_i64).collect();
        let rows = sqlx::query("SELECT id, name, original_price FROM products WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(self.pool())
            .await
            .map_err(StoreError::from)?;

        let mut products = HashMap::with_capacity(rows.len());
        for row in rows {
            let id = ProductId::new(row.try_get("id").map_err(StoreError::from)?);
            products.insert(
                id,
                Product {
                    id,
                    name: row.try_get("name").map_err(StoreError::from)?,
                    original_price: Money::from_minor(
                        row.try_get("original_price").map_err(StoreError::from)?,
                    ),
                },
            );
        }

        if let Some(missing) = product_ids.iter().find(|id| !products.contains_key(*id)) {
            return Err(DomainError::not_found("product", missing));
        }
        Ok(products)
    }
}
