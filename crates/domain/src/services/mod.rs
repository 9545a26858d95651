//! Collaborator interfaces the fulfillment core reads through.
//!
//! Each trait has an in-memory implementation for tests and a PostgreSQL
//! implementation on [`store::PostgresStore`] over the `users`, `products`
//! and `customers` tables. Object storage has only a URL-signing stand-in.

pub mod catalog;
pub mod customers;
pub mod identity;
pub mod storage;

pub use catalog::{InMemoryProductCatalog, Product, ProductCatalog};
pub use customers::{Customer, CustomerDirectory, InMemoryCustomerDirectory};
pub use identity::{IdentityProvider, InMemoryIdentityProvider};
pub use storage::{ObjectStorage, StaticObjectStorage};

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
