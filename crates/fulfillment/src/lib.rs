//! Order fulfillment for a single-warehouse inventory.
//!
//! [`OrderFulfillment`] creates, updates and deletes orders. Creating an
//! order locks the inventory rows of its stock lines, checks the client's
//! version tokens, takes the stock and records every movement in the history
//! log, all inside one store transaction. Deleting an order puts the stock
//! back with compensating history entries. [`InventoryService`] covers manual
//! stock adjustments and inventory reads.

pub mod config;
pub mod engine;
pub mod inventory;
mod tx;

pub use config::FulfillmentConfig;
pub use engine::{CreatedOrder, OrderFulfillment};
pub use inventory::InventoryService;
