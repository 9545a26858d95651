//! HTTP handlers and the state they share.

pub mod actor;
pub mod health;
pub mod inventory;
pub mod metrics;
pub mod orders;

use fulfillment::{InventoryService, OrderFulfillment};
use projections::ReadModel;
use store::Store;

pub use actor::{ACTOR_HEADER, Actor};

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub orders: OrderFulfillment<S>,
    pub inventory: InventoryService<S>,
    pub reader: ReadModel<S>,
    /// Name of the storage backend, reported by the health check.
    pub backend: &'static str,
}
