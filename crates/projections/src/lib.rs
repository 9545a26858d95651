//! Read side of the order and inventory system.
//!
//! This crate turns stored rows into the shapes clients read:
//! - [`OrderView`] with derived totals, profit and loss, customer details
//!   and presigned image URLs
//! - [`InventoryView`] with the product name and full movement history
//! - [`InventoryListEntry`] rows of the stock list with catalog details
//!
//! Reads never lock and never touch inventory.

pub mod reader;
pub mod views;

pub use reader::{DEFAULT_IMAGE_TTL, ReadModel};
pub use views::{
    CustomerInfo, InventoryListEntry, InventoryView, OrderLineView, OrderView, ProductInfo,
};
