use common::{CustomerId, DeliveryStatus};

use crate::Order;

/// Sort order for order listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderSort {
    /// Newest id first.
    #[default]
    IdDesc,
    OrderDateAsc,
    OrderDateDesc,
}

/// Builder for order listing queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderQuery {
    /// Filter by customer.
    pub customer_id: Option<CustomerId>,

    /// Filter by delivery status (any of these).
    pub statuses: Option<Vec<DeliveryStatus>>,

    pub sort: OrderSort,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,

    /// Number of orders to skip.
    pub offset: Option<usize>,
}

impl OrderQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for one customer's orders.
    pub fn for_customer(customer_id: CustomerId) -> Self {
        Self {
            customer_id: Some(customer_id),
            ..Default::default()
        }
    }

    /// Filters by customer.
    pub fn customer_id(mut self, customer_id: CustomerId) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    /// Filters by delivery status (any of these).
    pub fn statuses(mut self, statuses: Vec<DeliveryStatus>) -> Self {
        self.statuses = Some(statuses);
        self
    }

    pub fn sort(mut self, sort: OrderSort) -> Self {
        self.sort = sort;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if `order` passes the filters.
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(customer_id) = self.customer_id
            && order.customer_id != customer_id
        {
            return false;
        }
        if let Some(ref statuses) = self.statuses
            && !statuses.contains(&order.delivery_status)
        {
            return false;
        }
        true
    }

    /// Sorts, then applies offset and limit, to an in-memory result set.
    pub fn arrange(&self, mut orders: Vec<Order>) -> Vec<Order> {
        match self.sort {
            OrderSort::IdDesc => orders.sort_by(|a, b| b.id.cmp(&a.id)),
            OrderSort::OrderDateAsc => {
                orders.sort_by(|a, b| a.order_date.cmp(&b.order_date).then(a.id.cmp(&b.id)))
            }
            OrderSort::OrderDateDesc => {
                orders.sort_by(|a, b| b.order_date.cmp(&a.order_date).then(b.id.cmp(&a.id)))
            }
        }

        let orders = orders.into_iter().skip(self.offset.unwrap_or(0));
        match self.limit {
            Some(limit) => orders.take(limit).collect(),
            None => orders.collect(),
        }
    }

    /// SQL `ORDER BY` clause for this query's sort.
    pub(crate) fn order_by_sql(&self) -> &'static str {
        match self.sort {
            OrderSort::IdDesc => "ORDER BY id DESC",
            OrderSort::OrderDateAsc => "ORDER BY order_date ASC, id ASC",
            OrderSort::OrderDateDesc => "ORDER BY order_date DESC, id DESC",
        }
    }
}
