use common::{OrderId, ProductId, VersionToken};
use thiserror::Error;

/// Errors that can occur when interacting with the store.
///
/// Constraint violations are classified here, where they are detected, so
/// callers never have to inspect raw database errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A row with the same key already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    /// The conditional update matched no row: the stored version token
    /// differs from the expected one.
    #[error("Version mismatch for product {product_id}: expected {expected}")]
    VersionMismatch {
        product_id: ProductId,
        expected: VersionToken,
    },

    /// The inventory check constraint rejected a negative quantity.
    #[error("Quantity of product {product_id} would become negative")]
    QuantityNegative { product_id: ProductId },

    /// The quantity would exceed the largest storable value.
    #[error("Quantity of product {product_id} is out of range")]
    QuantityOverflow { product_id: ProductId },

    /// An order already has a line for this product and export source.
    #[error("Order {order_id} already has a {export_from} line for product {product_id}")]
    DuplicateOrderItem {
        order_id: OrderId,
        product_id: ProductId,
        export_from: common::ExportSource,
    },

    /// A stored value could not be decoded into its domain type.
    #[error("Corrupt row: {0}")]
    Decode(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<common::ParseEnumError> for StoreError {
    fn from(e: common::ParseEnumError) -> Self {
        StoreError::Decode(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
