use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, DebtStatus, DeliveryStatus, ExportSource, Money, OrderId, ProductId};
use serde::{Deserialize, Serialize};

use crate::{OrderQuery, Result, Session, UnitOfWork};

/// A persisted order header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub order_date: DateTime<Utc>,
    pub delivery_status: DeliveryStatus,
    pub debt_status: Option<DebtStatus>,
    /// Set whenever `delivery_status` changes.
    pub status_changed_at: Option<DateTime<Utc>>,
    pub additional_cost: Money,
    pub note: Option<String>,
    /// Σ original price × quantity, captured at creation.
    pub total_original_cost: Money,
    /// Σ line final amounts, captured at creation.
    pub total_sales_revenue: Money,
    /// Object-storage keys of attached images.
    pub image_keys: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A persisted order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: OrderId,
    pub product_id: ProductId,
    /// Number of boxes the line is packed in.
    pub number_of_boxes: Option<i64>,
    /// Units per box.
    pub spec: Option<i64>,
    pub quantity: i64,
    pub selling_price: Money,
    /// Product cost snapshot taken when the order was created.
    pub original_price: Money,
    /// Whole-percent discount, `0..=100`.
    pub discount: i64,
    /// Stored line total; absent on rows written before it was recorded.
    pub final_amount: Option<Money>,
    pub export_from: ExportSource,
}

/// Order header to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub customer_id: CustomerId,
    pub order_date: DateTime<Utc>,
    pub delivery_status: DeliveryStatus,
    pub debt_status: Option<DebtStatus>,
    pub additional_cost: Money,
    pub note: Option<String>,
    pub total_original_cost: Money,
    pub total_sales_revenue: Money,
    pub image_keys: Vec<String>,
}

/// Order line to insert under an existing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub number_of_boxes: Option<i64>,
    pub spec: Option<i64>,
    pub quantity: i64,
    pub selling_price: Money,
    pub original_price: Money,
    pub discount: i64,
    pub final_amount: Money,
    pub export_from: ExportSource,
}

/// Replacement values for an order's mutable header fields.
///
/// Totals and lines are fixed at creation and cannot be changed here.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderUpdate {
    pub customer_id: CustomerId,
    pub order_date: DateTime<Utc>,
    pub delivery_status: DeliveryStatus,
    pub debt_status: Option<DebtStatus>,
    pub status_changed_at: Option<DateTime<Utc>>,
    pub additional_cost: Money,
    pub note: Option<String>,
    pub image_keys: Vec<String>,
}

impl OrderUpdate {
    /// Starts from the order's current values.
    pub fn from_order(order: &Order) -> Self {
        Self {
            customer_id: order.customer_id,
            order_date: order.order_date,
            delivery_status: order.delivery_status,
            debt_status: order.debt_status,
            status_changed_at: order.status_changed_at,
            additional_cost: order.additional_cost,
            note: order.note.clone(),
            image_keys: order.image_keys.clone(),
        }
    }
}

/// Orders and their lines.
#[async_trait]
pub trait OrderStore: UnitOfWork {
    /// Inserts an order header and returns it with its assigned id.
    async fn insert_order(&self, order: NewOrder, session: &mut Session<'_, Self::Tx>)
    -> Result<Order>;

    /// Inserts lines under `order_id`.
    ///
    /// Fails with `DuplicateOrderItem` if the order already has a line for the
    /// same product and export source.
    async fn insert_items(
        &self,
        order_id: OrderId,
        items: Vec<NewOrderItem>,
        session: &mut Session<'_, Self::Tx>,
    ) -> Result<Vec<OrderItem>>;

    async fn get_order(&self, order_id: OrderId, session: &mut Session<'_, Self::Tx>)
    -> Result<Order>;

    /// Lines of an order in insertion order.
    async fn get_items(
        &self,
        order_id: OrderId,
        session: &mut Session<'_, Self::Tx>,
    ) -> Result<Vec<OrderItem>>;

    async fn update_order(
        &self,
        order_id: OrderId,
        update: OrderUpdate,
        session: &mut Session<'_, Self::Tx>,
    ) -> Result<Order>;

    /// Deletes an order and, by cascade, its lines. `NotFound` if no row was
    /// deleted.
    async fn delete_order(&self, order_id: OrderId, session: &mut Session<'_, Self::Tx>)
    -> Result<()>;

    /// Lists order headers matching `query`.
    async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>>;

    /// Lines of several orders at once, grouped by order then insertion order.
    async fn items_for_orders(&self, order_ids: &[OrderId]) -> Result<Vec<OrderItem>>;
}
