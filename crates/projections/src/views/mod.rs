//! Read model views.

pub mod inventory;
pub mod order;

pub use inventory::{InventoryListEntry, InventoryView, ProductInfo};
pub use order::{CustomerInfo, OrderLineView, OrderView};
