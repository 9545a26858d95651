//! Commands for the fulfillment and inventory operations.

use chrono::{DateTime, Utc};
use common::{
    ActorId, CustomerId, DebtStatus, DeliveryStatus, ExportSource, Money, OrderId, ProductId,
    VersionToken,
};
use serde::Deserialize;

/// One requested order line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    /// Number of boxes the line is packed in.
    #[serde(default)]
    pub number_of_boxes: Option<i64>,
    /// Units per box.
    #[serde(default)]
    pub spec: Option<i64>,
    pub quantity: i64,
    pub selling_price: Money,
    /// Whole-percent discount, `0..=100`.
    #[serde(default)]
    pub discount: i64,
    /// Inventory version the client read; required when the line may take
    /// stock.
    #[serde(default)]
    pub expected_version: Option<VersionToken>,
    pub export_from: ExportSource,
}

impl OrderLine {
    /// A line fulfilled from stock.
    pub fn inventory(
        product_id: ProductId,
        quantity: i64,
        selling_price: Money,
        expected_version: VersionToken,
    ) -> Self {
        Self {
            product_id,
            number_of_boxes: None,
            spec: None,
            quantity,
            selling_price,
            discount: 0,
            expected_version: Some(expected_version),
            export_from: ExportSource::Inventory,
        }
    }

    /// A line sourced outside the inventory.
    pub fn external(product_id: ProductId, quantity: i64, selling_price: Money) -> Self {
        Self {
            product_id,
            number_of_boxes: None,
            spec: None,
            quantity,
            selling_price,
            discount: 0,
            expected_version: None,
            export_from: ExportSource::External,
        }
    }

    /// Sets the discount percentage.
    pub fn with_discount(mut self, discount: i64) -> Self {
        self.discount = discount;
        self
    }

    /// Records how the line is packed: `boxes` boxes of `spec` units.
    pub fn with_packaging(mut self, boxes: i64, spec: i64) -> Self {
        self.number_of_boxes = Some(boxes);
        self.spec = Some(spec);
        self
    }
}

/// Command to create an order and take its stock.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub actor: Option<ActorId>,
    pub customer_id: CustomerId,
    /// Defaults to the time of creation.
    pub order_date: Option<DateTime<Utc>>,
    pub delivery_status: DeliveryStatus,
    pub debt_status: Option<DebtStatus>,
    pub additional_cost: Money,
    pub note: Option<String>,
    pub image_keys: Vec<String>,
    pub lines: Vec<OrderLine>,
}

impl CreateOrder {
    /// Creates a pending order for `customer_id` with no lines.
    pub fn new(actor: Option<ActorId>, customer_id: CustomerId) -> Self {
        Self {
            actor,
            customer_id,
            order_date: None,
            delivery_status: DeliveryStatus::default(),
            debt_status: None,
            additional_cost: Money::zero(),
            note: None,
            image_keys: Vec::new(),
            lines: Vec::new(),
        }
    }

    /// Appends a line.
    pub fn line(mut self, line: OrderLine) -> Self {
        self.lines.push(line);
        self
    }

    pub fn additional_cost(mut self, cost: Money) -> Self {
        self.additional_cost = cost;
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn image_keys(mut self, keys: Vec<String>) -> Self {
        self.image_keys = keys;
        self
    }
}

/// Command to change an order's metadata. `None` leaves a field unchanged.
#[derive(Debug, Clone)]
pub struct UpdateOrder {
    pub actor: Option<ActorId>,
    pub order_id: OrderId,
    pub customer_id: Option<CustomerId>,
    pub order_date: Option<DateTime<Utc>>,
    pub delivery_status: Option<DeliveryStatus>,
    pub debt_status: Option<DebtStatus>,
    pub additional_cost: Option<Money>,
    pub note: Option<String>,
    pub image_keys: Option<Vec<String>>,
}

impl UpdateOrder {
    /// Creates an update that changes nothing.
    pub fn new(actor: Option<ActorId>, order_id: OrderId) -> Self {
        Self {
            actor,
            order_id,
            customer_id: None,
            order_date: None,
            delivery_status: None,
            debt_status: None,
            additional_cost: None,
            note: None,
            image_keys: None,
        }
    }

    pub fn delivery_status(mut self, status: DeliveryStatus) -> Self {
        self.delivery_status = Some(status);
        self
    }

    pub fn debt_status(mut self, status: DebtStatus) -> Self {
        self.debt_status = Some(status);
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Command to delete an order and return its stock.
#[derive(Debug, Clone, Copy)]
pub struct DeleteOrder {
    pub actor: Option<ActorId>,
    pub order_id: OrderId,
}

impl DeleteOrder {
    pub fn new(actor: Option<ActorId>, order_id: OrderId) -> Self {
        Self { actor, order_id }
    }
}

/// Command to adjust stock by hand (stock-in, correction, write-off).
#[derive(Debug, Clone)]
pub struct UpdateQuantity {
    pub actor: Option<ActorId>,
    pub product_id: ProductId,
    /// Signed change to apply.
    pub delta: i64,
    pub expected_version: VersionToken,
    pub note: Option<String>,
}

impl UpdateQuantity {
    pub fn new(
        actor: Option<ActorId>,
        product_id: ProductId,
        delta: i64,
        expected_version: VersionToken,
    ) -> Self {
        Self {
            actor,
            product_id,
            delta,
            expected_version,
            note: None,
        }
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}
