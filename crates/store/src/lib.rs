//! Persistence layer for the inventory ledger, its history log and orders.
//!
//! Every repository operation takes an explicit [`Session`]: either the
//! ambient transaction of the business operation that owns it, or an
//! autonomous single-statement execution. Two backends implement the same
//! traits: [`PostgresStore`] for production and [`InMemoryStore`] for tests.

pub mod error;
pub mod history;
pub mod inventory;
pub mod memory;
pub mod order;
pub mod postgres;
pub mod query;
pub mod session;

pub use common::{OrderId, ProductId, VersionToken};
pub use error::{Result, StoreError};
pub use history::{HistoryLog, InventoryHistoryEntry, NewHistoryEntry};
pub use inventory::{Inventory, InventoryStore, QuantityUpdate};
pub use memory::{InMemoryStore, MemoryTx};
pub use order::{NewOrder, NewOrderItem, Order, OrderItem, OrderStore, OrderUpdate};
pub use postgres::{PgTx, PostgresStore};
pub use query::{OrderQuery, OrderSort};
pub use session::{Session, Store, UnitOfWork};
