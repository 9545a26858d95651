//! Inventory view: current stock plus its movement history.

use chrono::{DateTime, Utc};
use common::{Money, ProductId, VersionToken};
use domain::Product;
use serde::Serialize;
use store::{Inventory, InventoryHistoryEntry};

/// Catalog details shown next to a stock row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductInfo {
    pub name: String,
    pub original_price: Money,
}

/// One row of the stock list.
///
/// `product` is `None` when the catalog has no record of the product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryListEntry {
    pub product_id: ProductId,
    pub quantity: i64,
    pub version: VersionToken,
    pub updated_at: DateTime<Utc>,
    pub product: Option<ProductInfo>,
}

impl InventoryListEntry {
    pub fn new(inventory: Inventory, product: Option<Product>) -> Self {
        Self {
            product_id: inventory.product_id,
            quantity: inventory.quantity,
            version: inventory.version,
            updated_at: inventory.updated_at,
            product: product.map(|p| ProductInfo {
                name: p.name,
                original_price: p.original_price,
            }),
        }
    }
}

/// Stock of one product as shown to clients.
///
/// `version` is the token a client must send back to change this stock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryView {
    pub product_id: ProductId,
    pub product_name: Option<String>,
    pub quantity: i64,
    pub version: VersionToken,
    pub updated_at: DateTime<Utc>,
    pub history: Vec<InventoryHistoryEntry>,
}

impl InventoryView {
    pub fn new(
        inventory: Inventory,
        product_name: Option<String>,
        history: Vec<InventoryHistoryEntry>,
    ) -> Self {
        Self {
            product_id: inventory.product_id,
            product_name,
            quantity: inventory.quantity,
            version: inventory.version,
            updated_at: inventory.updated_at,
            history,
        }
    }

    /// Σ of recorded deltas; equals `quantity` when the ledger is consistent.
    pub fn ledger_total(&self) -> i64 {
        self.history.iter().map(|e| e.quantity).sum()
    }
}
