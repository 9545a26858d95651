//! Engine settings.

use domain::SourcingMode;
use serde::Deserialize;

/// Settings for [`OrderFulfillment`](crate::OrderFulfillment).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FulfillmentConfig {
    /// How order lines are assigned to stock.
    pub sourcing_mode: SourcingMode,

    /// History note for stock taken by an order; the order id is appended.
    pub stock_out_note: String,

    /// History note for stock returned by a deleted order.
    pub restoration_note: String,

    /// History note for manual adjustments that carry none.
    pub adjustment_note: String,
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            sourcing_mode: SourcingMode::Declared,
            stock_out_note: "Stock out for order".to_string(),
            restoration_note: "Stock restored from deleted order".to_string(),
            adjustment_note: "Manual adjustment".to_string(),
        }
    }
}

impl FulfillmentConfig {
    pub fn with_sourcing_mode(mut self, mode: SourcingMode) -> Self {
        self.sourcing_mode = mode;
        self
    }

    pub fn with_restoration_note(mut self, note: impl Into<String>) -> Self {
        self.restoration_note = note.into();
        self
    }
}
