//! Manual stock adjustments and inventory reads.

use std::sync::Arc;
use std::time::Instant;

use common::ProductId;
use domain::validation::validate_quantity_update;
use domain::{DomainError, IdentityProvider, Result, UpdateQuantity};
use store::{Inventory, InventoryHistoryEntry, NewHistoryEntry, QuantityUpdate, Session, Store};

use crate::config::FulfillmentConfig;
use crate::tx::{observe, settle};

/// Inventory operations outside of orders.
pub struct InventoryService<S: Store> {
    store: S,
    identity: Arc<dyn IdentityProvider>,
    config: FulfillmentConfig,
}

impl<S: Store> Clone for InventoryService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            identity: Arc::clone(&self.identity),
            config: self.config.clone(),
        }
    }
}

impl<S: Store> InventoryService<S> {
    pub fn new(store: S, identity: Arc<dyn IdentityProvider>, config: FulfillmentConfig) -> Self {
        Self {
            store,
            identity,
            config,
        }
    }

    /// Creates the empty inventory row of a newly registered product.
    #[tracing::instrument(skip(self))]
    pub async fn register_product(&self, product_id: ProductId) -> Result<Inventory> {
        Ok(self
            .store
            .create(product_id, &mut Session::Autonomous)
            .await?)
    }

    /// Applies a signed stock adjustment if the row still carries
    /// `expected_version`, recording it in the history log.
    #[tracing::instrument(skip(self, cmd), fields(product_id = %cmd.product_id, delta = cmd.delta))]
    pub async fn update_quantity(&self, cmd: UpdateQuantity) -> Result<Inventory> {
        let started = Instant::now();
        let result = self.try_update(cmd).await;
        observe("update_quantity", started, &result);
        result
    }

    async fn try_update(&self, cmd: UpdateQuantity) -> Result<Inventory> {
        let actor = validate_quantity_update(&cmd)?;
        let importer_name = self.identity.require_name(actor).await?;

        let mut tx = self.store.begin().await?;
        let result = self.update_in(&mut tx, &cmd, importer_name).await;
        settle(&self.store, tx, result).await
    }

    async fn update_in(
        &self,
        tx: &mut S::Tx,
        cmd: &UpdateQuantity,
        importer_name: String,
    ) -> Result<Inventory> {
        let row = self
            .store
            .get_by_product_for_update(cmd.product_id, tx)
            .await?;
        if row.version != cmd.expected_version {
            return Err(DomainError::VersionMismatch {
                product_id: cmd.product_id,
            });
        }

        let updated = self
            .store
            .conditional_update_quantity(
                QuantityUpdate::new(cmd.product_id, cmd.delta, row.version),
                &mut Session::ambient(tx),
            )
            .await?;

        self.store
            .append(
                NewHistoryEntry {
                    product_id: cmd.product_id,
                    quantity: cmd.delta,
                    final_quantity: updated.quantity,
                    importer_name,
                    note: cmd
                        .note
                        .clone()
                        .unwrap_or_else(|| self.config.adjustment_note.clone()),
                    reference_id: None,
                },
                &mut Session::ambient(tx),
            )
            .await?;

        metrics::counter!("inventory_updates_total", "reason" => "adjustment").increment(1);
        Ok(updated)
    }

    /// Current stock of a product.
    pub async fn get(&self, product_id: ProductId) -> Result<Inventory> {
        Ok(self.store.get_by_product(product_id).await?)
    }

    /// Stock movements of a product, oldest first.
    pub async fn history(&self, product_id: ProductId) -> Result<Vec<InventoryHistoryEntry>> {
        Ok(self.store.list_for_product(product_id).await?)
    }
}
