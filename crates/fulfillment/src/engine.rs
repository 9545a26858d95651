//! Order create/update/delete.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use common::{ExportSource, OrderId, ProductId};
use domain::validation::{validate_create, validate_delete, validate_update};
use domain::{
    CreateOrder, DeleteOrder, DomainError, IdentityProvider, Product, ProductCatalog, Result,
    SourcingMode, UpdateOrder, plan_lines,
};
use store::{
    NewHistoryEntry, NewOrder, Order, OrderItem, OrderUpdate, QuantityUpdate, Session, Store,
};

use crate::config::FulfillmentConfig;
use crate::tx::{observe, settle};

/// An order as committed by [`OrderFulfillment::create_order`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Runs the order operations that move stock.
///
/// Every operation that touches inventory runs in a single store
/// transaction: the stock updates, their history entries and the order rows
/// either all commit or none do.
pub struct OrderFulfillment<S: Store> {
    store: S,
    identity: Arc<dyn IdentityProvider>,
    catalog: Arc<dyn ProductCatalog>,
    config: FulfillmentConfig,
}

impl<S: Store> Clone for OrderFulfillment<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            identity: Arc::clone(&self.identity),
            catalog: Arc::clone(&self.catalog),
            config: self.config.clone(),
        }
    }
}

impl<S: Store> OrderFulfillment<S> {
    /// Creates a new engine.
    pub fn new(
        store: S,
        identity: Arc<dyn IdentityProvider>,
        catalog: Arc<dyn ProductCatalog>,
        config: FulfillmentConfig,
    ) -> Self {
        Self {
            store,
            identity,
            catalog,
            config,
        }
    }

    pub fn config(&self) -> &FulfillmentConfig {
        &self.config
    }

    /// Creates an order, taking stock for its inventory lines.
    ///
    /// Input is validated before any lock is taken. Fails with
    /// `VersionMismatch` when a line's expected version is stale and with
    /// `QuantityExceeded` when stock cannot cover a declared inventory line;
    /// nothing is written in either case.
    #[tracing::instrument(
        skip(self, cmd),
        fields(customer_id = %cmd.customer_id, lines = cmd.lines.len(), mode = %self.config.sourcing_mode)
    )]
    pub async fn create_order(&self, cmd: CreateOrder) -> Result<CreatedOrder> {
        let started = Instant::now();
        let result = self.try_create(cmd).await;
        observe("create_order", started, &result);

        if let Ok(ref created) = result {
            metrics::counter!("orders_created_total").increment(1);
            tracing::info!(order_id = %created.order.id, items = created.items.len(), "order created");
        }
        result
    }

    async fn try_create(&self, cmd: CreateOrder) -> Result<CreatedOrder> {
        let mode = self.config.sourcing_mode;
        let actor = validate_create(&cmd, mode)?;

        let product_ids: Vec<ProductId> = cmd
            .lines
            .iter()
            .map(|l| l.product_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let products = self.catalog.get_many(&product_ids).await?;
        let importer_name = self.identity.require_name(actor).await?;

        let lock_ids: Vec<ProductId> = match mode {
            SourcingMode::Declared => cmd
                .lines
                .iter()
                .filter(|l| l.export_from == ExportSource::Inventory)
                .map(|l| l.product_id)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            SourcingMode::AutoSplit => product_ids,
        };

        let mut tx = self.store.begin().await?;
        let result = self
            .create_in(&mut tx, &cmd, &lock_ids, &products, &importer_name)
            .await;
        settle(&self.store, tx, result).await
    }

    async fn create_in(
        &self,
        tx: &mut S::Tx,
        cmd: &CreateOrder,
        lock_ids: &[ProductId],
        products: &HashMap<ProductId, Product>,
        importer_name: &str,
    ) -> Result<CreatedOrder> {
        let mut stock: HashMap<_, _> = if lock_ids.is_empty() {
            HashMap::new()
        } else {
            self.store
                .lock_many(lock_ids, tx)
                .await?
                .into_iter()
                .map(|row| (row.product_id, row))
                .collect()
        };

        let plan = plan_lines(self.config.sourcing_mode, &cmd.lines, products, &mut stock)?;

        let order = self
            .store
            .insert_order(
                NewOrder {
                    customer_id: cmd.customer_id,
                    order_date: cmd.order_date.unwrap_or_else(Utc::now),
                    delivery_status: cmd.delivery_status,
                    debt_status: cmd.debt_status,
                    additional_cost: cmd.additional_cost,
                    note: cmd.note.clone(),
                    total_original_cost: plan.total_original_cost,
                    total_sales_revenue: plan.total_sales_revenue,
                    image_keys: cmd.image_keys.clone(),
                },
                &mut Session::ambient(tx),
            )
            .await?;

        for movement in &plan.movements {
            let updated = self
                .store
                .conditional_update_quantity(
                    QuantityUpdate::new(
                        movement.product_id,
                        -movement.quantity,
                        movement.expected_version,
                    ),
                    &mut Session::ambient(tx),
                )
                .await?;

            self.store
                .append(
                    NewHistoryEntry {
                        product_id: movement.product_id,
                        quantity: -movement.quantity,
                        final_quantity: updated.quantity,
                        importer_name: importer_name.to_string(),
                        note: format!("{} #{}", self.config.stock_out_note, order.id),
                        reference_id: Some(order.id),
                    },
                    &mut Session::ambient(tx),
                )
                .await?;
            metrics::counter!("inventory_updates_total", "reason" => "order").increment(1);
        }

        let items = self
            .store
            .insert_items(
                order.id,
                plan.lines.into_iter().map(Into::into).collect(),
                &mut Session::ambient(tx),
            )
            .await?;

        Ok(CreatedOrder { order, items })
    }

    /// Changes an order's metadata. Lines and stock are never touched.
    ///
    /// `status_changed_at` is stamped when the delivery status actually
    /// changes.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn update_order(&self, cmd: UpdateOrder) -> Result<Order> {
        let started = Instant::now();
        let result = self.try_update(cmd).await;
        observe("update_order", started, &result);
        result
    }

    async fn try_update(&self, cmd: UpdateOrder) -> Result<Order> {
        validate_update(&cmd)?;

        let mut tx = self.store.begin().await?;
        let result = self.update_in(&mut tx, cmd).await;
        settle(&self.store, tx, result).await
    }

    async fn update_in(&self, tx: &mut S::Tx, cmd: UpdateOrder) -> Result<Order> {
        let current = self
            .store
            .get_order(cmd.order_id, &mut Session::ambient(tx))
            .await?;

        let mut update = OrderUpdate::from_order(&current);
        if let Some(customer_id) = cmd.customer_id {
            update.customer_id = customer_id;
        }
        if let Some(order_date) = cmd.order_date {
            update.order_date = order_date;
        }
        if let Some(status) = cmd.delivery_status
            && status != current.delivery_status
        {
            update.delivery_status = status;
            update.status_changed_at = Some(Utc::now());
        }
        if let Some(debt_status) = cmd.debt_status {
            update.debt_status = Some(debt_status);
        }
        if let Some(cost) = cmd.additional_cost {
            update.additional_cost = cost;
        }
        if let Some(note) = cmd.note {
            update.note = Some(note);
        }
        if let Some(keys) = cmd.image_keys {
            update.image_keys = keys;
        }

        Ok(self
            .store
            .update_order(cmd.order_id, update, &mut Session::ambient(tx))
            .await?)
    }

    /// Deletes an order and returns the stock its inventory lines took.
    ///
    /// An order without inventory lines is deleted on its own. Otherwise the
    /// affected rows are locked, each line's quantity is added back against
    /// the row's current version, a compensating history entry is written
    /// and the order is removed, all in one transaction. If a concurrent
    /// delete already removed the order the transaction rolls back with
    /// `NotFound`, so stock is restored once.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn delete_order(&self, cmd: DeleteOrder) -> Result<()> {
        let started = Instant::now();
        let result = self.try_delete(cmd).await;
        observe("delete_order", started, &result);

        if result.is_ok() {
            metrics::counter!("orders_deleted_total").increment(1);
            tracing::info!(order_id = %cmd.order_id, "order deleted");
        }
        result
    }

    async fn try_delete(&self, cmd: DeleteOrder) -> Result<()> {
        let actor = validate_delete(&cmd)?;
        let importer_name = self.identity.require_name(actor).await?;

        let mut session = Session::Autonomous;
        self.store.get_order(cmd.order_id, &mut session).await?;
        let stock_lines: Vec<OrderItem> = self
            .store
            .get_items(cmd.order_id, &mut session)
            .await?
            .into_iter()
            .filter(|item| item.export_from == ExportSource::Inventory)
            .collect();

        if stock_lines.is_empty() {
            self.store
                .delete_order(cmd.order_id, &mut Session::Autonomous)
                .await?;
            return Ok(());
        }

        let mut tx = self.store.begin().await?;
        let result = self
            .restore_in(&mut tx, cmd.order_id, &stock_lines, &importer_name)
            .await;
        settle(&self.store, tx, result).await
    }

    async fn restore_in(
        &self,
        tx: &mut S::Tx,
        order_id: OrderId,
        lines: &[OrderItem],
        importer_name: &str,
    ) -> Result<()> {
        let product_ids: Vec<ProductId> = lines.iter().map(|l| l.product_id).collect();
        let mut stock: HashMap<_, _> = self
            .store
            .lock_many(&product_ids, tx)
            .await?
            .into_iter()
            .map(|row| (row.product_id, row))
            .collect();

        for line in lines {
            let row = stock
                .get_mut(&line.product_id)
                .ok_or_else(|| DomainError::NotFound {
                    entity: "inventory",
                    id: line.product_id.to_string(),
                })?;

            let updated = self
                .store
                .conditional_update_quantity(
                    QuantityUpdate::new(line.product_id, line.quantity, row.version),
                    &mut Session::ambient(tx),
                )
                .await?;

            self.store
                .append(
                    NewHistoryEntry {
                        product_id: line.product_id,
                        quantity: line.quantity,
                        final_quantity: updated.quantity,
                        importer_name: importer_name.to_string(),
                        note: self.config.restoration_note.clone(),
                        reference_id: None,
                    },
                    &mut Session::ambient(tx),
                )
                .await?;
            metrics::counter!("inventory_updates_total", "reason" => "restore").increment(1);

            *row = updated;
        }

        self.store
            .delete_order(order_id, &mut Session::ambient(tx))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::{ActorId, CustomerId, Money, VersionToken};
    use domain::{ErrorKind, InMemoryIdentityProvider, InMemoryProductCatalog, OrderLine};
    use store::{InMemoryStore, InventoryStore};

    use super::*;

    fn engine(store: &InMemoryStore) -> OrderFulfillment<InMemoryStore> {
        let identity = InMemoryIdentityProvider::new().with_user(ActorId::new(1), "alice");
        let catalog = InMemoryProductCatalog::new().with_product(
            ProductId::new(1),
            "Widget",
            Money::from_minor(100),
        );
        OrderFulfillment::new(
            store.clone(),
            Arc::new(identity),
            Arc::new(catalog),
            FulfillmentConfig::default(),
        )
    }

    #[tokio::test]
    async fn unknown_actor_is_rejected_before_locking() {
        let store = InMemoryStore::new();
        let row = store.seed_inventory(ProductId::new(1), 5).await;
        let cmd = CreateOrder::new(Some(ActorId::new(9)), CustomerId::new(1)).line(
            OrderLine::inventory(ProductId::new(1), 1, Money::from_minor(10), row.version),
        );

        let err = engine(&store).create_order(cmd).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(store.get_by_product(ProductId::new(1)).await.unwrap(), row);
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let store = InMemoryStore::new();
        let cmd = CreateOrder::new(Some(ActorId::new(1)), CustomerId::new(1)).line(
            OrderLine::inventory(ProductId::new(2), 1, Money::from_minor(10), VersionToken::new()),
        );

        let err = engine(&store).create_order(cmd).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn update_stamps_status_change_only_on_change() {
        let store = InMemoryStore::new();
        let engine = engine(&store);
        let created = engine
            .create_order(
                CreateOrder::new(Some(ActorId::new(1)), CustomerId::new(1)).line(
                    OrderLine::external(ProductId::new(1), 1, Money::from_minor(10)),
                ),
            )
            .await
            .unwrap();
        let order_id = created.order.id;

        let same = engine
            .update_order(
                UpdateOrder::new(Some(ActorId::new(1)), order_id)
                    .delivery_status(created.order.delivery_status)
                    .note("call first"),
            )
            .await
            .unwrap();
        assert_eq!(same.status_changed_at, None);
        assert_eq!(same.note.as_deref(), Some("call first"));

        let delivered = engine
            .update_order(
                UpdateOrder::new(Some(ActorId::new(1)), order_id)
                    .delivery_status(common::DeliveryStatus::Delivered),
            )
            .await
            .unwrap();
        assert!(delivered.status_changed_at.is_some());
        assert_eq!(delivered.note.as_deref(), Some("call first"));
    }
}
