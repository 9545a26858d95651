use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, ProductId, VersionToken};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    HistoryLog, Inventory, InventoryHistoryEntry, InventoryStore, NewHistoryEntry, NewOrder,
    NewOrderItem, Order, OrderItem, OrderQuery, OrderStore, OrderUpdate, QuantityUpdate, Result,
    Session, StoreError, UnitOfWork,
};

#[derive(Default)]
struct Tables {
    inventory: BTreeMap<ProductId, Inventory>,
    history: Vec<InventoryHistoryEntry>,
    orders: BTreeMap<OrderId, Order>,
    items: Vec<OrderItem>,
}

#[derive(Default)]
struct Shared {
    tables: RwLock<Tables>,
    row_locks: Mutex<HashMap<ProductId, Arc<Mutex<()>>>>,
    order_seq: AtomicI64,
    item_seq: AtomicI64,
    history_seq: AtomicI64,
}

/// In-memory store implementation for testing.
///
/// Provides the same interface and transactional behaviour as the
/// PostgreSQL implementation: writes made through a [`MemoryTx`] are staged
/// and only become visible on commit, and inventory rows are guarded by
/// per-product locks that a transaction holds until it ends.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

/// Staged writes and held row locks of one in-memory transaction.
#[derive(Default)]
pub struct MemoryTx {
    locks: HashMap<ProductId, OwnedMutexGuard<()>>,
    inventory: HashMap<ProductId, Inventory>,
    history: Vec<InventoryHistoryEntry>,
    orders: BTreeMap<OrderId, Order>,
    items: Vec<OrderItem>,
    deleted_orders: HashSet<OrderId>,
}

impl MemoryTx {
    /// Returns true if this transaction holds the row lock for `product_id`.
    pub fn holds_lock(&self, product_id: ProductId) -> bool {
        self.locks.contains_key(&product_id)
    }
}

fn staged<'s>(session: &'s Session<'_, MemoryTx>) -> Option<&'s MemoryTx> {
    match session {
        Session::Ambient(tx) => Some(&**tx),
        Session::Autonomous => None,
    }
}

fn apply_update(current: Option<Inventory>, update: &QuantityUpdate) -> Result<Inventory> {
    let mut row = match current {
        Some(row) if row.version == update.expected_version => row,
        _ => {
            return Err(StoreError::VersionMismatch {
                product_id: update.product_id,
                expected: update.expected_version,
            });
        }
    };

    let quantity = match row.quantity.checked_add(update.delta) {
        Some(quantity) if quantity >= 0 => quantity,
        Some(_) => {
            return Err(StoreError::QuantityNegative {
                product_id: update.product_id,
            });
        }
        None if update.delta < 0 => {
            return Err(StoreError::QuantityNegative {
                product_id: update.product_id,
            });
        }
        None => {
            return Err(StoreError::QuantityOverflow {
                product_id: update.product_id,
            });
        }
    };

    row.quantity = quantity;
    row.version = update.new_version;
    row.updated_at = Utc::now();
    Ok(row)
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an inventory row holding `quantity` units, recording the
    /// opening stock in the history log so the ledger stays balanced.
    pub async fn seed_inventory(&self, product_id: ProductId, quantity: i64) -> Inventory {
        let row = Inventory {
            product_id,
            quantity,
            version: VersionToken::new(),
            updated_at: Utc::now(),
        };
        let mut tables = self.shared.tables.write().await;
        tables.inventory.insert(product_id, row.clone());
        if quantity != 0 {
            tables.history.push(InventoryHistoryEntry {
                id: self.next_id(&self.shared.history_seq),
                product_id,
                quantity,
                final_quantity: quantity,
                importer_name: "seed".to_string(),
                imported_at: Utc::now(),
                note: "opening stock".to_string(),
                reference_id: None,
            });
        }
        row
    }

    /// Returns every committed inventory row.
    pub async fn inventory_rows(&self) -> Vec<Inventory> {
        self.shared
            .tables
            .read()
            .await
            .inventory
            .values()
            .cloned()
            .collect()
    }

    /// Returns the total number of committed history entries.
    pub async fn history_count(&self) -> usize {
        self.shared.tables.read().await.history.len()
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.shared.tables.read().await.orders.len()
    }

    /// Returns the number of committed order lines.
    pub async fn item_count(&self) -> usize {
        self.shared.tables.read().await.items.len()
    }

    fn next_id(&self, seq: &AtomicI64) -> i64 {
        seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn row_lock(&self, product_id: ProductId) -> Arc<Mutex<()>> {
        self.shared
            .row_locks
            .lock()
            .await
            .entry(product_id)
            .or_default()
            .clone()
    }

    /// Blocks until `tx` holds the row lock for `product_id`.
    async fn lock_row(&self, product_id: ProductId, tx: &mut MemoryTx) {
        if tx.holds_lock(product_id) {
            return;
        }
        let guard = self.row_lock(product_id).await.lock_owned().await;
        tx.locks.insert(product_id, guard);
    }

    async fn visible_inventory(
        &self,
        product_id: ProductId,
        tx: Option<&MemoryTx>,
    ) -> Option<Inventory> {
        if let Some(tx) = tx
            && let Some(row) = tx.inventory.get(&product_id)
        {
            return Some(row.clone());
        }
        self.shared
            .tables
            .read()
            .await
            .inventory
            .get(&product_id)
            .cloned()
    }

    async fn visible_order(&self, order_id: OrderId, tx: Option<&MemoryTx>) -> Option<Order> {
        if let Some(tx) = tx {
            if tx.deleted_orders.contains(&order_id) {
                return None;
            }
            if let Some(order) = tx.orders.get(&order_id) {
                return Some(order.clone());
            }
        }
        self.shared.tables.read().await.orders.get(&order_id).cloned()
    }

    async fn visible_items(&self, order_id: OrderId, tx: Option<&MemoryTx>) -> Vec<OrderItem> {
        if let Some(tx) = tx
            && tx.deleted_orders.contains(&order_id)
        {
            return Vec::new();
        }
        let mut items: Vec<OrderItem> = self
            .shared
            .tables
            .read()
            .await
            .items
            .iter()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect();
        if let Some(tx) = tx {
            items.extend(tx.items.iter().filter(|i| i.order_id == order_id).cloned());
        }
        items.sort_by_key(|i| i.id);
        items
    }
}

#[async_trait]
impl UnitOfWork for InMemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx> {
        Ok(MemoryTx::default())
    }

    async fn commit(&self, tx: MemoryTx) -> Result<()> {
        let MemoryTx {
            locks,
            inventory,
            history,
            orders,
            items,
            deleted_orders,
        } = tx;

        {
            let mut tables = self.shared.tables.write().await;
            tables.inventory.extend(inventory);
            tables.history.extend(history);
            tables.history.sort_by_key(|e| e.id);
            for order_id in &deleted_orders {
                tables.orders.remove(order_id);
            }
            tables
                .items
                .retain(|i| !deleted_orders.contains(&i.order_id));
            tables.orders.extend(orders);
            tables.items.extend(items);
        }

        // Row locks are released only after the writes are visible.
        drop(locks);
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTx) -> Result<()> {
        drop(tx);
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn create(
        &self,
        product_id: ProductId,
        session: &mut Session<'_, MemoryTx>,
    ) -> Result<Inventory> {
        if self
            .visible_inventory(product_id, staged(session))
            .await
            .is_some()
        {
            return Err(StoreError::AlreadyExists {
                entity: "inventory",
                id: product_id.to_string(),
            });
        }

        let row = Inventory {
            product_id,
            quantity: 0,
            version: VersionToken::new(),
            updated_at: Utc::now(),
        };
        match session {
            Session::Ambient(tx) => {
                tx.inventory.insert(product_id, row.clone());
            }
            Session::Autonomous => {
                self.shared
                    .tables
                    .write()
                    .await
                    .inventory
                    .insert(product_id, row.clone());
            }
        }
        Ok(row)
    }

    async fn list_all(&self) -> Result<Vec<Inventory>> {
        Ok(self.inventory_rows().await)
    }

    async fn get_by_product(&self, product_id: ProductId) -> Result<Inventory> {
        self.visible_inventory(product_id, None)
            .await
            .ok_or_else(|| StoreError::not_found("inventory", product_id))
    }

    async fn get_by_product_for_update(
        &self,
        product_id: ProductId,
        tx: &mut MemoryTx,
    ) -> Result<Inventory> {
        if self
            .visible_inventory(product_id, Some(tx))
            .await
            .is_none()
        {
            return Err(StoreError::not_found("inventory", product_id));
        }
        self.lock_row(product_id, tx).await;
        self.visible_inventory(product_id, Some(tx))
            .await
            .ok_or_else(|| StoreError::not_found("inventory", product_id))
    }

    async fn lock_many(
        &self,
        product_ids: &[ProductId],
        tx: &mut MemoryTx,
    ) -> Result<Vec<Inventory>> {
        let mut ids = product_ids.to_vec();
        ids.sort();
        ids.dedup();

        let started = Instant::now();
        let mut rows = Vec::with_capacity(ids.len());
        for product_id in ids {
            if self
                .visible_inventory(product_id, Some(tx))
                .await
                .is_none()
            {
                continue;
            }
            self.lock_row(product_id, tx).await;
            if let Some(row) = self.visible_inventory(product_id, Some(tx)).await {
                rows.push(row);
            }
        }

        metrics::histogram!("inventory_lock_wait_seconds").record(started.elapsed().as_secs_f64());
        Ok(rows)
    }

    async fn conditional_update_quantity(
        &self,
        update: QuantityUpdate,
        session: &mut Session<'_, MemoryTx>,
    ) -> Result<Inventory> {
        let product_id = update.product_id;

        match session {
            Session::Ambient(tx) => {
                self.lock_row(product_id, tx).await;
                let current = self.visible_inventory(product_id, Some(tx)).await;
                let updated = apply_update(current, &update)?;
                tx.inventory.insert(product_id, updated.clone());
                Ok(updated)
            }
            Session::Autonomous => {
                let _guard = self.row_lock(product_id).await.lock_owned().await;
                let mut tables = self.shared.tables.write().await;
                let current = tables.inventory.get(&product_id).cloned();
                let updated = apply_update(current, &update)?;
                tables.inventory.insert(product_id, updated.clone());
                Ok(updated)
            }
        }
    }
}

#[async_trait]
impl HistoryLog for InMemoryStore {
    async fn append(
        &self,
        entry: NewHistoryEntry,
        session: &mut Session<'_, MemoryTx>,
    ) -> Result<InventoryHistoryEntry> {
        let stored = InventoryHistoryEntry {
            id: self.next_id(&self.shared.history_seq),
            product_id: entry.product_id,
            quantity: entry.quantity,
            final_quantity: entry.final_quantity,
            importer_name: entry.importer_name,
            imported_at: Utc::now(),
            note: entry.note,
            reference_id: entry.reference_id,
        };

        match session {
            Session::Ambient(tx) => tx.history.push(stored.clone()),
            Session::Autonomous => self.shared.tables.write().await.history.push(stored.clone()),
        }
        Ok(stored)
    }

    async fn list_for_product(&self, product_id: ProductId) -> Result<Vec<InventoryHistoryEntry>> {
        let tables = self.shared.tables.read().await;
        Ok(tables
            .history
            .iter()
            .filter(|e| e.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<InventoryHistoryEntry>> {
        let tables = self.shared.tables.read().await;
        Ok(tables
            .history
            .iter()
            .filter(|e| e.reference_id == Some(order_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert_order(
        &self,
        order: NewOrder,
        session: &mut Session<'_, MemoryTx>,
    ) -> Result<Order> {
        let stored = Order {
            id: OrderId::new(self.next_id(&self.shared.order_seq)),
            customer_id: order.customer_id,
            order_date: order.order_date,
            delivery_status: order.delivery_status,
            debt_status: order.debt_status,
            status_changed_at: None,
            additional_cost: order.additional_cost,
            note: order.note,
            total_original_cost: order.total_original_cost,
            total_sales_revenue: order.total_sales_revenue,
            image_keys: order.image_keys,
            created_at: Utc::now(),
        };

        match session {
            Session::Ambient(tx) => {
                tx.orders.insert(stored.id, stored.clone());
            }
            Session::Autonomous => {
                self.shared
                    .tables
                    .write()
                    .await
                    .orders
                    .insert(stored.id, stored.clone());
            }
        }
        Ok(stored)
    }

    async fn insert_items(
        &self,
        order_id: OrderId,
        items: Vec<NewOrderItem>,
        session: &mut Session<'_, MemoryTx>,
    ) -> Result<Vec<OrderItem>> {
        let tx = staged(session);
        if self.visible_order(order_id, tx).await.is_none() {
            return Err(StoreError::not_found("order", order_id));
        }

        let mut taken: HashSet<_> = self
            .visible_items(order_id, tx)
            .await
            .into_iter()
            .map(|i| (i.product_id, i.export_from))
            .collect();

        let mut inserted = Vec::with_capacity(items.len());
        for item in items {
            if !taken.insert((item.product_id, item.export_from)) {
                return Err(StoreError::DuplicateOrderItem {
                    order_id,
                    product_id: item.product_id,
                    export_from: item.export_from,
                });
            }
            inserted.push(OrderItem {
                id: self.next_id(&self.shared.item_seq),
                order_id,
                product_id: item.product_id,
                number_of_boxes: item.number_of_boxes,
                spec: item.spec,
                quantity: item.quantity,
                selling_price: item.selling_price,
                original_price: item.original_price,
                discount: item.discount,
                final_amount: Some(item.final_amount),
                export_from: item.export_from,
            });
        }

        match session {
            Session::Ambient(tx) => tx.items.extend(inserted.iter().cloned()),
            Session::Autonomous => self
                .shared
                .tables
                .write()
                .await
                .items
                .extend(inserted.iter().cloned()),
        }
        Ok(inserted)
    }

    async fn get_order(
        &self,
        order_id: OrderId,
        session: &mut Session<'_, MemoryTx>,
    ) -> Result<Order> {
        self.visible_order(order_id, staged(session))
            .await
            .ok_or_else(|| StoreError::not_found("order", order_id))
    }

    async fn get_items(
        &self,
        order_id: OrderId,
        session: &mut Session<'_, MemoryTx>,
    ) -> Result<Vec<OrderItem>> {
        Ok(self.visible_items(order_id, staged(session)).await)
    }

    async fn update_order(
        &self,
        order_id: OrderId,
        update: OrderUpdate,
        session: &mut Session<'_, MemoryTx>,
    ) -> Result<Order> {
        let mut order = self
            .visible_order(order_id, staged(session))
            .await
            .ok_or_else(|| StoreError::not_found("order", order_id))?;

        order.customer_id = update.customer_id;
        order.order_date = update.order_date;
        order.delivery_status = update.delivery_status;
        order.debt_status = update.debt_status;
        order.status_changed_at = update.status_changed_at;
        order.additional_cost = update.additional_cost;
        order.note = update.note;
        order.image_keys = update.image_keys;

        match session {
            Session::Ambient(tx) => {
                tx.orders.insert(order_id, order.clone());
            }
            Session::Autonomous => {
                self.shared
                    .tables
                    .write()
                    .await
                    .orders
                    .insert(order_id, order.clone());
            }
        }
        Ok(order)
    }

    async fn delete_order(
        &self,
        order_id: OrderId,
        session: &mut Session<'_, MemoryTx>,
    ) -> Result<()> {
        match session {
            Session::Ambient(tx) => {
                if self.visible_order(order_id, Some(tx)).await.is_none() {
                    return Err(StoreError::not_found("order", order_id));
                }
                tx.orders.remove(&order_id);
                tx.items.retain(|i| i.order_id != order_id);
                if self
                    .shared
                    .tables
                    .read()
                    .await
                    .orders
                    .contains_key(&order_id)
                {
                    tx.deleted_orders.insert(order_id);
                }
                Ok(())
            }
            Session::Autonomous => {
                let mut tables = self.shared.tables.write().await;
                if tables.orders.remove(&order_id).is_none() {
                    return Err(StoreError::not_found("order", order_id));
                }
                tables.items.retain(|i| i.order_id != order_id);
                Ok(())
            }
        }
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let tables = self.shared.tables.read().await;
        let orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| query.matches(o))
            .cloned()
            .collect();
        Ok(query.arrange(orders))
    }

    async fn items_for_orders(&self, order_ids: &[OrderId]) -> Result<Vec<OrderItem>> {
        let tables = self.shared.tables.read().await;
        let mut items: Vec<OrderItem> = tables
            .items
            .iter()
            .filter(|i| order_ids.contains(&i.order_id))
            .cloned()
            .collect();
        items.sort_by_key(|i| (i.order_id, i.id));
        Ok(items)
    }
}
