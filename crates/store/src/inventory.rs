use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ProductId, VersionToken};
use serde::{Deserialize, Serialize};

use crate::{Result, Session, UnitOfWork};

/// Current stock of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub product_id: ProductId,
    /// On-hand quantity, never negative.
    pub quantity: i64,
    /// Token replaced on every successful mutation.
    pub version: VersionToken,
    pub updated_at: DateTime<Utc>,
}

impl Inventory {
    /// Returns true if `quantity` units can be taken from stock.
    pub fn can_supply(&self, quantity: i64) -> bool {
        self.quantity >= quantity
    }
}

/// A version-checked quantity change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantityUpdate {
    pub product_id: ProductId,
    /// Signed change applied to the stored quantity.
    pub delta: i64,
    /// Version the caller believes is stored.
    pub expected_version: VersionToken,
    /// Version written on success.
    pub new_version: VersionToken,
}

impl QuantityUpdate {
    /// Creates an update that writes a freshly generated version on success.
    pub fn new(product_id: ProductId, delta: i64, expected_version: VersionToken) -> Self {
        Self {
            product_id,
            delta,
            expected_version,
            new_version: VersionToken::new(),
        }
    }
}

/// The inventory ledger: one row per product.
///
/// [`conditional_update_quantity`](InventoryStore::conditional_update_quantity)
/// is the only path that changes `quantity` or `version`.
#[async_trait]
pub trait InventoryStore: UnitOfWork {
    /// Creates the inventory row for a newly registered product with zero
    /// stock and a fresh version.
    async fn create(
        &self,
        product_id: ProductId,
        session: &mut Session<'_, Self::Tx>,
    ) -> Result<Inventory>;

    /// Every inventory row in ascending product id order, unlocked.
    async fn list_all(&self) -> Result<Vec<Inventory>>;

    /// Unlocked point read, for display.
    async fn get_by_product(&self, product_id: ProductId) -> Result<Inventory>;

    /// Reads the row and holds a write lock on it until `tx` ends.
    async fn get_by_product_for_update(
        &self,
        product_id: ProductId,
        tx: &mut Self::Tx,
    ) -> Result<Inventory>;

    /// Locks every existing row among `product_ids` in one round trip.
    ///
    /// Rows are locked in ascending product id order. Products without an
    /// inventory row are absent from the result.
    async fn lock_many(&self, product_ids: &[ProductId], tx: &mut Self::Tx)
    -> Result<Vec<Inventory>>;

    /// Applies `quantity += delta` and `version = new_version` only if the
    /// stored version equals `expected_version`.
    ///
    /// Fails with `VersionMismatch` when no row matched, with
    /// `QuantityNegative` when the result would drop below zero and with
    /// `QuantityOverflow` when it would not fit the column.
    async fn conditional_update_quantity(
        &self,
        update: QuantityUpdate,
        session: &mut Session<'_, Self::Tx>,
    ) -> Result<Inventory>;
}
