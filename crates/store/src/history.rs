use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use serde::{Deserialize, Serialize};

use crate::{Result, Session, UnitOfWork};

/// One recorded inventory movement. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryHistoryEntry {
    pub id: i64,
    pub product_id: ProductId,
    /// Signed delta: positive adds stock, negative consumes it.
    pub quantity: i64,
    /// Stock after the delta was applied.
    pub final_quantity: i64,
    pub importer_name: String,
    pub imported_at: DateTime<Utc>,
    pub note: String,
    /// Order that caused the movement, if any.
    pub reference_id: Option<OrderId>,
}

/// Entry to append; id and timestamp are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryEntry {
    pub product_id: ProductId,
    pub quantity: i64,
    pub final_quantity: i64,
    pub importer_name: String,
    pub note: String,
    pub reference_id: Option<OrderId>,
}

/// Append-only inventory history.
#[async_trait]
pub trait HistoryLog: UnitOfWork {
    /// Appends an entry; must share the session of the mutation it records.
    async fn append(
        &self,
        entry: NewHistoryEntry,
        session: &mut Session<'_, Self::Tx>,
    ) -> Result<InventoryHistoryEntry>;

    /// Entries for a product, oldest first.
    async fn list_for_product(&self, product_id: ProductId) -> Result<Vec<InventoryHistoryEntry>>;

    /// Entries referencing an order, oldest first.
    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<InventoryHistoryEntry>>;
}
