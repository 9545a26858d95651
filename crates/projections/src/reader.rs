//! Read model over the store and its lookup collaborators.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{CustomerId, OrderId, ProductId};
use domain::{CustomerDirectory, ObjectStorage, ProductCatalog, Result};
use futures_util::future::try_join_all;
use store::{
    HistoryLog, InventoryStore, Order, OrderItem, OrderQuery, OrderStore, Session, Store,
};

use crate::views::{CustomerInfo, InventoryListEntry, InventoryView, OrderView};

/// Default lifetime of presigned image URLs.
pub const DEFAULT_IMAGE_TTL: Duration = Duration::from_secs(15 * 60);

/// Builds order and inventory views.
///
/// Every read is autonomous: no row is locked and inventory is never written.
pub struct ReadModel<S: Store> {
    store: S,
    catalog: Arc<dyn ProductCatalog>,
    customers: Arc<dyn CustomerDirectory>,
    storage: Arc<dyn ObjectStorage>,
    image_ttl: Duration,
}

impl<S: Store> Clone for ReadModel<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            catalog: Arc::clone(&self.catalog),
            customers: Arc::clone(&self.customers),
            storage: Arc::clone(&self.storage),
            image_ttl: self.image_ttl,
        }
    }
}

impl<S: Store> ReadModel<S> {
    pub fn new(
        store: S,
        catalog: Arc<dyn ProductCatalog>,
        customers: Arc<dyn CustomerDirectory>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            store,
            catalog,
            customers,
            storage,
            image_ttl: DEFAULT_IMAGE_TTL,
        }
    }

    /// Sets how long presigned image URLs stay valid.
    pub fn with_image_ttl(mut self, ttl: Duration) -> Self {
        self.image_ttl = ttl;
        self
    }

    /// Orders matching `query`, in the query's sort order.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<OrderView>> {
        let started = Instant::now();

        let orders = self.store.list_orders(query).await?;
        let ids: Vec<OrderId> = orders.iter().map(|o| o.id).collect();
        let mut items_by_order: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for item in self.store.items_for_orders(&ids).await? {
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        let names = self
            .product_names(items_by_order.values().flatten().map(|i| i.product_id))
            .await?;
        let customers = self
            .customer_infos(orders.iter().map(|o| o.customer_id))
            .await?;

        let mut views = Vec::with_capacity(orders.len());
        for order in orders {
            let items = items_by_order.remove(&order.id).unwrap_or_default();
            let customer = customers
                .get(&order.customer_id)
                .cloned()
                .unwrap_or_else(|| CustomerInfo::new(order.customer_id, None));
            views.push(self.assemble(order, items, customer, &names).await?);
        }

        metrics::histogram!("read_model_duration_seconds", "query" => "list_orders")
            .record(started.elapsed().as_secs_f64());
        tracing::debug!(count = views.len(), "Listed orders");
        Ok(views)
    }

    /// One order with its lines.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<OrderView> {
        let started = Instant::now();

        let order = self
            .store
            .get_order(order_id, &mut Session::Autonomous)
            .await?;
        let items = self
            .store
            .get_items(order_id, &mut Session::Autonomous)
            .await?;

        let names = self.product_names(items.iter().map(|i| i.product_id)).await?;
        let customer = CustomerInfo::new(
            order.customer_id,
            self.customers.get(order.customer_id).await?,
        );
        let view = self.assemble(order, items, customer, &names).await?;

        metrics::histogram!("read_model_duration_seconds", "query" => "get_order")
            .record(started.elapsed().as_secs_f64());
        Ok(view)
    }

    /// Current stock, product name and movement history of a product.
    #[tracing::instrument(skip(self))]
    pub async fn inventory_view(&self, product_id: ProductId) -> Result<InventoryView> {
        let inventory = self.store.get_by_product(product_id).await?;
        let history = self.store.list_for_product(product_id).await?;
        let name = self.catalog.get(product_id).await?.map(|p| p.name);
        Ok(InventoryView::new(inventory, name, history))
    }

    /// Every stock row with its catalog details, by ascending product id.
    ///
    /// Rows whose product is missing from the catalog are still listed.
    #[tracing::instrument(skip(self))]
    pub async fn list_inventory(&self) -> Result<Vec<InventoryListEntry>> {
        let started = Instant::now();

        let rows = self.store.list_all().await?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let product = self.catalog.get(row.product_id).await?;
            if product.is_none() {
                tracing::warn!(product_id = %row.product_id, "Stock row without catalog entry");
            }
            entries.push(InventoryListEntry::new(row, product));
        }

        metrics::histogram!("read_model_duration_seconds", "query" => "list_inventory")
            .record(started.elapsed().as_secs_f64());
        Ok(entries)
    }

    async fn assemble(
        &self,
        order: Order,
        items: Vec<OrderItem>,
        customer: CustomerInfo,
        names: &HashMap<ProductId, String>,
    ) -> Result<OrderView> {
        let image_urls = try_join_all(
            order
                .image_keys
                .iter()
                .map(|key| self.storage.presign(key, self.image_ttl)),
        )
        .await?;
        Ok(OrderView::build(order, items, customer, names, image_urls))
    }

    async fn product_names(
        &self,
        ids: impl Iterator<Item = ProductId>,
    ) -> Result<HashMap<ProductId, String>> {
        let ids: BTreeSet<ProductId> = ids.collect();
        let mut names = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(product) = self.catalog.get(id).await? {
                names.insert(id, product.name);
            }
        }
        Ok(names)
    }

    async fn customer_infos(
        &self,
        ids: impl Iterator<Item = CustomerId>,
    ) -> Result<HashMap<CustomerId, CustomerInfo>> {
        let ids: BTreeSet<CustomerId> = ids.collect();
        let mut infos = HashMap::with_capacity(ids.len());
        for id in ids {
            infos.insert(id, CustomerInfo::new(id, self.customers.get(id).await?));
        }
        Ok(infos)
    }
}
