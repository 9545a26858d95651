//! Shared value types for the inventory and order fulfillment workspace.
//!
//! Everything here is plain data: identifiers, the inventory version token,
//! money amounts and the closed enumerations that travel between layers.

mod money;
mod status;
mod types;

pub use money::Money;
pub use status::{DebtStatus, DeliveryStatus, ExportSource, ParseEnumError};
pub use types::{ActorId, CustomerId, OrderId, ProductId, VersionToken};
