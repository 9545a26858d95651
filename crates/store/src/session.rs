use async_trait::async_trait;

use crate::{HistoryLog, InventoryStore, OrderStore, Result};

/// Execution context handed to every repository call.
///
/// A business operation opens one transaction through [`UnitOfWork::begin`]
/// and passes `Session::Ambient` to each step so that stock mutation,
/// history logging and order writes commit or roll back together.
/// `Session::Autonomous` runs the call as its own single-statement unit.
pub enum Session<'a, T> {
    /// Run the statement on its own, outside any transaction.
    Autonomous,
    /// Run the statement inside the caller's open transaction.
    Ambient(&'a mut T),
}

impl<'a, T> Session<'a, T> {
    /// Wraps an open transaction.
    pub fn ambient(tx: &'a mut T) -> Self {
        Session::Ambient(tx)
    }

    /// Returns true if this session runs inside a transaction.
    pub fn is_ambient(&self) -> bool {
        matches!(self, Session::Ambient(_))
    }
}

/// Begin/commit/rollback over the backend's transaction type.
///
/// Dropping a transaction without committing it discards its writes and
/// releases its row locks, which is what happens when a request future is
/// cancelled mid-operation.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// The backend's open-transaction handle.
    type Tx: Send;

    /// Opens a new transaction.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Commits every write made through the transaction.
    async fn commit(&self, tx: Self::Tx) -> Result<()>;

    /// Discards every write made through the transaction.
    async fn rollback(&self, tx: Self::Tx) -> Result<()>;
}

/// Everything the fulfillment engine needs from one backend.
pub trait Store: InventoryStore + HistoryLog + OrderStore + Clone + 'static {}

impl<T> Store for T where T: InventoryStore + HistoryLog + OrderStore + Clone + 'static {}
