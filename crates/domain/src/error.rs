//! Domain error types.

use common::{ExportSource, ProductId};
use serde::Serialize;
use store::StoreError;
use thiserror::Error;

/// Stable classification of a [`DomainError`], independent of its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Unauthorized,
    NotFound,
    VersionMismatch,
    QuantityNegative,
    QuantityExceeded,
    DuplicateOrderItems,
    BadRequest,
    DbDown,
}

impl ErrorKind {
    /// Returns the wire code, e.g. `VERSION_MISMATCH`.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::VersionMismatch => "VERSION_MISMATCH",
            ErrorKind::QuantityNegative => "QUANTITY_NEGATIVE",
            ErrorKind::QuantityExceeded => "QUANTITY_EXCEEDED",
            ErrorKind::DuplicateOrderItems => "DUPLICATE_ORDER_ITEMS",
            ErrorKind::BadRequest => "BAD_REQUEST",
            ErrorKind::DbDown => "DB_DOWN",
        }
    }

    /// Returns true if repeating the request after refetching may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::VersionMismatch | ErrorKind::DbDown)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No authenticated actor, or the actor is unknown.
    #[error("Authentication required")]
    Unauthorized,

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The inventory row changed since the client read it.
    #[error("Inventory of product {product_id} has changed; refetch it and retry")]
    VersionMismatch { product_id: ProductId },

    /// The mutation would drive stock below zero.
    #[error("Quantity of product {product_id} cannot become negative")]
    QuantityNegative { product_id: ProductId },

    /// An inventory line asks for more than is in stock.
    #[error("Requested {requested} of product {product_id}, only {available} in stock")]
    QuantityExceeded {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },

    /// The same product appears twice with the same export source.
    #[error("Product {product_id} appears more than once with source {export_from}")]
    DuplicateOrderItems {
        product_id: ProductId,
        export_from: ExportSource,
    },

    /// Malformed input.
    #[error("Invalid {field}: {reason}")]
    BadRequest { field: String, reason: String },

    /// The store is unreachable or returned an unexpected error.
    #[error("Storage unavailable: {0}")]
    DbDown(#[source] StoreError),
}

impl DomainError {
    pub(crate) fn bad_request(field: impl Into<String>, reason: impl Into<String>) -> Self {
        DomainError::BadRequest {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns the stable classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Unauthorized => ErrorKind::Unauthorized,
            DomainError::NotFound { .. } => ErrorKind::NotFound,
            DomainError::VersionMismatch { .. } => ErrorKind::VersionMismatch,
            DomainError::QuantityNegative { .. } => ErrorKind::QuantityNegative,
            DomainError::QuantityExceeded { .. } => ErrorKind::QuantityExceeded,
            DomainError::DuplicateOrderItems { .. } => ErrorKind::DuplicateOrderItems,
            DomainError::BadRequest { .. } => ErrorKind::BadRequest,
            DomainError::DbDown(_) => ErrorKind::DbDown,
        }
    }

    /// Returns the name of the offending input field, if one applies.
    pub fn field(&self) -> Option<&str> {
        match self {
            DomainError::BadRequest { field, .. } => Some(field),
            DomainError::NotFound { entity, .. } => match *entity {
                "product" | "inventory" => Some("product_id"),
                "customer" => Some("customer_id"),
                "order" => Some("order_id"),
                _ => None,
            },
            DomainError::VersionMismatch { .. } => Some("expected_version"),
            DomainError::QuantityNegative { .. } | DomainError::QuantityExceeded { .. } => {
                Some("quantity")
            }
            DomainError::DuplicateOrderItems { .. } => Some("lines"),
            DomainError::Unauthorized | DomainError::DbDown(_) => None,
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => DomainError::NotFound { entity, id },
            StoreError::AlreadyExists { entity, id } => {
                DomainError::bad_request("product_id", format!("{entity} {id} already exists"))
            }
            StoreError::VersionMismatch { product_id, .. } => {
                DomainError::VersionMismatch { product_id }
            }
            StoreError::QuantityNegative { product_id } => {
                DomainError::QuantityNegative { product_id }
            }
            StoreError::QuantityOverflow { product_id } => DomainError::bad_request(
                "delta",
                format!("quantity of product {product_id} would be out of range"),
            ),
            StoreError::DuplicateOrderItem {
                product_id,
                export_from,
                ..
            } => DomainError::DuplicateOrderItems {
                product_id,
                export_from,
            },
            other => DomainError::DbDown(other),
        }
    }
}

/// Convenience type alias for domain results.
pub type Result<T> = std::result::Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use common::{OrderId, VersionToken};

    use super::*;

    #[test]
    fn store_errors_are_classified() {
        let cases = [
            (
                StoreError::VersionMismatch {
                    product_id: ProductId::new(1),
                    expected: VersionToken::new(),
                },
                ErrorKind::VersionMismatch,
            ),
            (
                StoreError::QuantityNegative {
                    product_id: ProductId::new(1),
                },
                ErrorKind::QuantityNegative,
            ),
            (
                StoreError::QuantityOverflow {
                    product_id: ProductId::new(1),
                },
                ErrorKind::BadRequest,
            ),
            (
                StoreError::DuplicateOrderItem {
                    order_id: OrderId::new(1),
                    product_id: ProductId::new(1),
                    export_from: ExportSource::External,
                },
                ErrorKind::DuplicateOrderItems,
            ),
            (
                StoreError::NotFound {
                    entity: "order",
                    id: "7".to_string(),
                },
                ErrorKind::NotFound,
            ),
            (
                StoreError::AlreadyExists {
                    entity: "inventory",
                    id: "1".to_string(),
                },
                ErrorKind::BadRequest,
            ),
            (StoreError::Decode("bad".to_string()), ErrorKind::DbDown),
            (
                StoreError::Database(sqlx::Error::PoolTimedOut),
                ErrorKind::DbDown,
            ),
        ];

        for (store_error, kind) in cases {
            assert_eq!(DomainError::from(store_error).kind(), kind);
        }
    }

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::VersionMismatch.is_retryable());
        assert!(ErrorKind::DbDown.is_retryable());
        assert!(!ErrorKind::QuantityExceeded.is_retryable());
        assert!(!ErrorKind::BadRequest.is_retryable());
    }

    #[test]
    fn field_names_point_at_input() {
        let err = DomainError::bad_request("lines[1].discount", "must be within 0..=100");
        assert_eq!(err.field(), Some("lines[1].discount"));
        assert_eq!(err.kind().code(), "BAD_REQUEST");

        let err = DomainError::not_found("customer", 4);
        assert_eq!(err.field(), Some("customer_id"));
        assert_eq!(err.to_string(), "customer not found: 4");

        assert_eq!(DomainError::Unauthorized.field(), None);
    }

    #[test]
    fn version_mismatch_asks_for_retry() {
        let err = DomainError::VersionMismatch {
            product_id: ProductId::new(3),
        };
        assert!(err.to_string().contains("refetch"));
    }
}
