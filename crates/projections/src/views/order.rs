//! Order view with derived totals and per-line profit figures.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use common::{CustomerId, DebtStatus, DeliveryStatus, ExportSource, Money, OrderId, ProductId};
use domain::Customer;
use serde::Serialize;
use store::{Order, OrderItem};

/// Customer details embedded in an order view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerInfo {
    pub id: CustomerId,
    /// `None` when the directory has no record of the customer.
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl CustomerInfo {
    pub fn new(id: CustomerId, customer: Option<Customer>) -> Self {
        match customer {
            Some(c) => Self {
                id,
                name: Some(c.name),
                phone: c.phone,
                address: c.address,
            },
            None => Self {
                id,
                name: None,
                phone: None,
                address: None,
            },
        }
    }
}

/// One order line as shown to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderLineView {
    pub id: i64,
    pub product_id: ProductId,
    pub product_name: Option<String>,
    pub number_of_boxes: Option<i64>,
    pub spec: Option<i64>,
    pub quantity: i64,
    pub selling_price: Money,
    pub original_price: Money,
    pub discount: i64,
    pub final_amount: Money,
    /// `final_amount - original_price * quantity`
    pub profit_loss: Money,
    /// `profit_loss` relative to the line's cost; zero when the cost is zero.
    pub profit_loss_percentage: f64,
    pub export_from: ExportSource,
}

impl OrderLineView {
    pub fn new(item: OrderItem, product_name: Option<String>) -> Self {
        let final_amount = item.final_amount.unwrap_or_else(|| {
            item.selling_price
                .multiply(item.quantity)
                .discounted(item.discount)
        });
        let cost = item.original_price.multiply(item.quantity);
        let profit_loss = final_amount - cost;

        Self {
            id: item.id,
            product_id: item.product_id,
            product_name,
            number_of_boxes: item.number_of_boxes,
            spec: item.spec,
            quantity: item.quantity,
            selling_price: item.selling_price,
            original_price: item.original_price,
            discount: item.discount,
            final_amount,
            profit_loss,
            profit_loss_percentage: profit_loss.percent_of(cost),
            export_from: item.export_from,
        }
    }
}

/// An order with its lines and derived figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderView {
    pub id: OrderId,
    pub customer: CustomerInfo,
    pub order_date: DateTime<Utc>,
    pub delivery_status: DeliveryStatus,
    pub debt_status: Option<DebtStatus>,
    pub status_changed_at: Option<DateTime<Utc>>,
    pub additional_cost: Money,
    pub note: Option<String>,
    pub total_original_cost: Money,
    pub total_sales_revenue: Money,
    /// Σ line final amounts.
    pub total_amount: Money,
    /// Number of distinct products across the lines.
    pub product_count: usize,
    pub profit_loss: Money,
    pub profit_loss_percentage: f64,
    pub image_urls: Vec<String>,
    pub items: Vec<OrderLineView>,
    pub created_at: DateTime<Utc>,
}

impl OrderView {
    /// Assembles the view from stored rows and already resolved lookups.
    ///
    /// Products missing from `product_names` are shown without a name.
    pub fn build(
        order: Order,
        items: Vec<OrderItem>,
        customer: CustomerInfo,
        product_names: &HashMap<ProductId, String>,
        image_urls: Vec<String>,
    ) -> Self {
        let product_count = items
            .iter()
            .map(|i| i.product_id)
            .collect::<HashSet<_>>()
            .len();

        let items: Vec<OrderLineView> = items
            .into_iter()
            .map(|item| {
                let name = product_names.get(&item.product_id).cloned();
                OrderLineView::new(item, name)
            })
            .collect();

        let total_amount: Money = items.iter().map(|i| i.final_amount).sum();
        let profit_loss =
            order.total_sales_revenue - order.total_original_cost - order.additional_cost;

        Self {
            id: order.id,
            customer,
            order_date: order.order_date,
            delivery_status: order.delivery_status,
            debt_status: order.debt_status,
            status_changed_at: order.status_changed_at,
            additional_cost: order.additional_cost,
            note: order.note,
            total_original_cost: order.total_original_cost,
            total_sales_revenue: order.total_sales_revenue,
            total_amount,
            product_count,
            profit_loss,
            profit_loss_percentage: profit_loss.percent_of(order.total_original_cost),
            image_urls,
            items,
            created_at: order.created_at,
        }
    }
}
