use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::{CustomerId, Money, OrderId, ProductId, VersionToken};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::{
    HistoryLog, Inventory, InventoryHistoryEntry, InventoryStore, NewHistoryEntry, NewOrder,
    NewOrderItem, Order, OrderItem, OrderQuery, OrderStore, OrderUpdate, QuantityUpdate, Result,
    Session, StoreError, UnitOfWork,
};

/// Open PostgreSQL transaction.
pub type PgTx = Transaction<'static, Postgres>;

const INVENTORY_COLUMNS: &str = "product_id, quantity, version, updated_at";
const HISTORY_COLUMNS: &str =
    "id, product_id, quantity, final_quantity, importer_name, imported_at, note, reference_id";
const ORDER_COLUMNS: &str = "id, customer_id, order_date, delivery_status, debt_status, \
     status_changed_at, additional_cost, note, total_original_cost, total_sales_revenue, \
     image_keys, created_at";
const ITEM_COLUMNS: &str = "id, order_id, product_id, number_of_boxes, spec, quantity, \
     selling_price, original_price, discount, final_amount, export_from";

/// SQLSTATE `numeric_value_out_of_range`.
const NUMERIC_OUT_OF_RANGE: &str = "22003";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

/// A connection borrowed from the ambient transaction or checked out of the
/// pool for one autonomous statement.
enum Conn<'s> {
    Pooled(PoolConnection<Postgres>),
    Ambient(&'s mut PgConnection),
}

impl Deref for Conn<'_> {
    type Target = PgConnection;

    fn deref(&self) -> &PgConnection {
        match self {
            Conn::Pooled(conn) => &**conn,
            Conn::Ambient(conn) => &**conn,
        }
    }
}

impl DerefMut for Conn<'_> {
    fn deref_mut(&mut self) -> &mut PgConnection {
        match self {
            Conn::Pooled(conn) => &mut **conn,
            Conn::Ambient(conn) => &mut **conn,
        }
    }
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool whose sessions give up waiting for row locks after
    /// `lock_timeout`.
    pub async fn connect(url: &str, max_connections: u32, lock_timeout: Duration) -> Result<Self> {
        let options = PgConnectOptions::from_str(url)?
            .options([("lock_timeout", format!("{}ms", lock_timeout.as_millis()))]);
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        tracing::debug!(max_connections, ?lock_timeout, "Connected PostgreSQL pool");
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    async fn conn<'s>(&self, session: &'s mut Session<'_, PgTx>) -> Result<Conn<'s>> {
        match session {
            Session::Autonomous => Ok(Conn::Pooled(self.pool.acquire().await?)),
            Session::Ambient(tx) => Ok(Conn::Ambient(&mut ***tx)),
        }
    }

    fn row_to_inventory(row: PgRow) -> Result<Inventory> {
        Ok(Inventory {
            product_id: ProductId::new(row.try_get("product_id")?),
            quantity: row.try_get("quantity")?,
            version: VersionToken::from_uuid(row.try_get::<Uuid, _>("version")?),
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_history(row: PgRow) -> Result<InventoryHistoryEntry> {
        Ok(InventoryHistoryEntry {
            id: row.try_get("id")?,
            product_id: ProductId::new(row.try_get("product_id")?),
            quantity: row.try_get("quantity")?,
            final_quantity: row.try_get("final_quantity")?,
            importer_name: row.try_get("importer_name")?,
            imported_at: row.try_get("imported_at")?,
            note: row.try_get("note")?,
            reference_id: row
                .try_get::<Option<i64>, _>("reference_id")?
                .map(OrderId::new),
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let debt_status: Option<String> = row.try_get("debt_status")?;

        Ok(Order {
            id: OrderId::new(row.try_get("id")?),
            customer_id: CustomerId::new(row.try_get("customer_id")?),
            order_date: row.try_get("order_date")?,
            delivery_status: row.try_get::<String, _>("delivery_status")?.parse()?,
            debt_status: debt_status.map(|s| s.parse()).transpose()?,
            status_changed_at: row.try_get("status_changed_at")?,
            additional_cost: Money::from_minor(row.try_get("additional_cost")?),
            note: row.try_get("note")?,
            total_original_cost: Money::from_minor(row.try_get("total_original_cost")?),
            total_sales_revenue: Money::from_minor(row.try_get("total_sales_revenue")?),
            image_keys: row.try_get("image_keys")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_item(row: PgRow) -> Result<OrderItem> {
        Ok(OrderItem {
            id: row.try_get("id")?,
            order_id: OrderId::new(row.try_get("order_id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            number_of_boxes: row.try_get("number_of_boxes")?,
            spec: row.try_get("spec")?,
            quantity: row.try_get("quantity")?,
            selling_price: Money::from_minor(row.try_get("selling_price")?),
            original_price: Money::from_minor(row.try_get("original_price")?),
            discount: row.try_get("discount")?,
            final_amount: row
                .try_get::<Option<i64>, _>("final_amount")?
                .map(Money::from_minor),
            export_from: row.try_get::<String, _>("export_from")?.parse()?,
        })
    }
}

#[async_trait]
impl UnitOfWork for PostgresStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: PgTx) -> Result<()> {
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, tx: PgTx) -> Result<()> {
        tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for PostgresStore {
    async fn create(
        &self,
        product_id: ProductId,
        session: &mut Session<'_, PgTx>,
    ) -> Result<Inventory> {
        let mut conn = self.conn(session).await?;

        let row = sqlx::query(&format!(
            "INSERT INTO inventory (product_id, quantity, version) VALUES ($1, 0, $2) \
             RETURNING {INVENTORY_COLUMNS}"
        ))
        .bind(product_id.as_i64())
        .bind(VersionToken::new().as_uuid())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                match db_err.constraint() {
                    Some("inventory_product_id_key") => {
                        return StoreError::AlreadyExists {
                            entity: "inventory",
                            id: product_id.to_string(),
                        };
                    }
                    Some("inventory_product_id_fkey") => {
                        return StoreError::not_found("product", product_id);
                    }
                    _ => {}
                }
            }
            StoreError::Database(e)
        })?;

        Self::row_to_inventory(row)
    }

    async fn list_all(&self) -> Result<Vec<Inventory>> {
        let rows = sqlx::query(&format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory ORDER BY product_id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_inventory).collect()
    }

    async fn get_by_product(&self, product_id: ProductId) -> Result<Inventory> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory WHERE product_id = $1"
        ))
        .bind(product_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_inventory(row),
            None => Err(StoreError::not_found("inventory", product_id)),
        }
    }

    async fn get_by_product_for_update(
        &self,
        product_id: ProductId,
        tx: &mut PgTx,
    ) -> Result<Inventory> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory WHERE product_id = $1 FOR UPDATE"
        ))
        .bind(product_id.as_i64())
        .fetch_optional(&mut **tx)
        .await?;

        match row {
            Some(row) => Self::row_to_inventory(row),
            None => Err(StoreError::not_found("inventory", product_id)),
        }
    }

    async fn lock_many(&self, product_ids: &[ProductId], tx: &mut PgTx) -> Result<Vec<Inventory>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = product_ids.iter().map(ProductId::as_i64).collect();
        let started = Instant::now();

        let rows = sqlx::query(&format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory WHERE product_id = ANY($1) \
             ORDER BY product_id ASC FOR UPDATE"
        ))
        .bind(ids)
        .fetch_all(&mut **tx)
        .await?;

        metrics::histogram!("inventory_lock_wait_seconds").record(started.elapsed().as_secs_f64());
        rows.into_iter().map(Self::row_to_inventory).collect()
    }

    async fn conditional_update_quantity(
        &self,
        update: QuantityUpdate,
        session: &mut Session<'_, PgTx>,
    ) -> Result<Inventory> {
        let product_id = update.product_id;
        let mut conn = self.conn(session).await?;

        let row: Option<PgRow> = sqlx::query(&format!(
            r#"
            UPDATE inventory
            SET quantity = quantity + $2, version = $3, updated_at = NOW()
            WHERE product_id = $1 AND version = $4
            RETURNING {INVENTORY_COLUMNS}
            "#
        ))
        .bind(product_id.as_i64())
        .bind(update.delta)
        .bind(update.new_version.as_uuid())
        .bind(update.expected_version.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.constraint() == Some("inventory_quantity_check") {
                    return StoreError::QuantityNegative { product_id };
                }
                if db_err.code().as_deref() == Some(NUMERIC_OUT_OF_RANGE) {
                    return StoreError::QuantityOverflow { product_id };
                }
            }
            StoreError::Database(e)
        })?;

        match row {
            Some(row) => Self::row_to_inventory(row),
            None => Err(StoreError::VersionMismatch {
                product_id,
                expected: update.expected_version,
            }),
        }
    }
}

#[async_trait]
impl HistoryLog for PostgresStore {
    async fn append(
        &self,
        entry: NewHistoryEntry,
        session: &mut Session<'_, PgTx>,
    ) -> Result<InventoryHistoryEntry> {
        let mut conn = self.conn(session).await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO inventory_histories
                (product_id, quantity, final_quantity, importer_name, note, reference_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {HISTORY_COLUMNS}
            "#
        ))
        .bind(entry.product_id.as_i64())
        .bind(entry.quantity)
        .bind(entry.final_quantity)
        .bind(&entry.importer_name)
        .bind(&entry.note)
        .bind(entry.reference_id.map(|id| id.as_i64()))
        .fetch_one(&mut *conn)
        .await?;

        Self::row_to_history(row)
    }

    async fn list_for_product(&self, product_id: ProductId) -> Result<Vec<InventoryHistoryEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {HISTORY_COLUMNS} FROM inventory_histories WHERE product_id = $1 ORDER BY id ASC"
        ))
        .bind(product_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_history).collect()
    }

    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<InventoryHistoryEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {HISTORY_COLUMNS} FROM inventory_histories WHERE reference_id = $1 ORDER BY id ASC"
        ))
        .bind(order_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_history).collect()
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn insert_order(&self, order: NewOrder, session: &mut Session<'_, PgTx>) -> Result<Order> {
        let mut conn = self.conn(session).await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO orders (customer_id, order_date, delivery_status, debt_status,
                                additional_cost, note, total_original_cost, total_sales_revenue,
                                image_keys)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order.customer_id.as_i64())
        .bind(order.order_date)
        .bind(order.delivery_status.as_str())
        .bind(order.debt_status.map(|s| s.as_str()))
        .bind(order.additional_cost.minor())
        .bind(&order.note)
        .bind(order.total_original_cost.minor())
        .bind(order.total_sales_revenue.minor())
        .bind(&order.image_keys)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("orders_customer_id_fkey")
            {
                return StoreError::not_found("customer", order.customer_id);
            }
            StoreError::Database(e)
        })?;

        Self::row_to_order(row)
    }

    async fn insert_items(
        &self,
        order_id: OrderId,
        items: Vec<NewOrderItem>,
        session: &mut Session<'_, PgTx>,
    ) -> Result<Vec<OrderItem>> {
        let mut conn = self.conn(session).await?;
        let mut inserted = Vec::with_capacity(items.len());

        for item in items {
            let row = sqlx::query(&format!(
                r#"
                INSERT INTO order_items (order_id, product_id, number_of_boxes, spec, quantity,
                                         selling_price, original_price, discount,
                                         final_amount, export_from)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                RETURNING {ITEM_COLUMNS}
                "#
            ))
            .bind(order_id.as_i64())
            .bind(item.product_id.as_i64())
            .bind(item.number_of_boxes)
            .bind(item.spec)
            .bind(item.quantity)
            .bind(item.selling_price.minor())
            .bind(item.original_price.minor())
            .bind(item.discount)
            .bind(item.final_amount.minor())
            .bind(item.export_from.as_str())
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("order_items_source_unique")
                {
                    return StoreError::DuplicateOrderItem {
                        order_id,
                        product_id: item.product_id,
                        export_from: item.export_from,
                    };
                }
                StoreError::Database(e)
            })?;

            inserted.push(Self::row_to_item(row)?);
        }

        Ok(inserted)
    }

    async fn get_order(&self, order_id: OrderId, session: &mut Session<'_, PgTx>) -> Result<Order> {
        let mut conn = self.conn(session).await?;

        let row: Option<PgRow> =
            sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(order_id.as_i64())
                .fetch_optional(&mut *conn)
                .await?;

        match row {
            Some(row) => Self::row_to_order(row),
            None => Err(StoreError::not_found("order", order_id)),
        }
    }

    async fn get_items(
        &self,
        order_id: OrderId,
        session: &mut Session<'_, PgTx>,
    ) -> Result<Vec<OrderItem>> {
        let mut conn = self.conn(session).await?;

        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id ASC"
        ))
        .bind(order_id.as_i64())
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(Self::row_to_item).collect()
    }

    async fn update_order(
        &self,
        order_id: OrderId,
        update: OrderUpdate,
        session: &mut Session<'_, PgTx>,
    ) -> Result<Order> {
        let mut conn = self.conn(session).await?;

        let row: Option<PgRow> = sqlx::query(&format!(
            r#"
            UPDATE orders
            SET customer_id = $2, order_date = $3, delivery_status = $4, debt_status = $5,
                status_changed_at = $6, additional_cost = $7, note = $8, image_keys = $9
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order_id.as_i64())
        .bind(update.customer_id.as_i64())
        .bind(update.order_date)
        .bind(update.delivery_status.as_str())
        .bind(update.debt_status.map(|s| s.as_str()))
        .bind(update.status_changed_at)
        .bind(update.additional_cost.minor())
        .bind(&update.note)
        .bind(&update.image_keys)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("orders_customer_id_fkey")
            {
                return StoreError::not_found("customer", update.customer_id);
            }
            StoreError::Database(e)
        })?;

        match row {
            Some(row) => Self::row_to_order(row),
            None => Err(StoreError::not_found("order", order_id)),
        }
    }

    async fn delete_order(&self, order_id: OrderId, session: &mut Session<'_, PgTx>) -> Result<()> {
        let mut conn = self.conn(session).await?;

        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order_id.as_i64())
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("order", order_id));
        }
        Ok(())
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic query
        if query.customer_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND customer_id = ${param_count}"));
        }
        if query.statuses.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND delivery_status = ANY(${param_count})"));
        }

        sql.push(' ');
        sql.push_str(query.order_by_sql());

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(customer_id) = query.customer_id {
            sqlx_query = sqlx_query.bind(customer_id.as_i64());
        }
        if let Some(ref statuses) = query.statuses {
            let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
            sqlx_query = sqlx_query.bind(statuses);
        }
        // Postgres takes BIGINT; anything larger already means "no bound".
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(i64::try_from(offset).unwrap_or(i64::MAX));
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn items_for_orders(&self, order_ids: &[OrderId]) -> Result<Vec<OrderItem>> {
        if order_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = order_ids.iter().map(OrderId::as_i64).collect();

        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) \
             ORDER BY order_id ASC, id ASC"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_item).collect()
    }
}
