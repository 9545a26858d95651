//! Domain layer for inventory and order fulfillment.
//!
//! This crate provides:
//! - Commands for the business operations and their input validation
//! - The error taxonomy shared by every layer above the store
//! - The line-sourcing planner that decides how each order line is fulfilled
//! - Collaborator interfaces (identity, catalog, customers, object storage)

pub mod commands;
pub mod error;
pub mod planning;
pub mod services;
pub mod validation;

pub use commands::{CreateOrder, DeleteOrder, OrderLine, UpdateOrder, UpdateQuantity};
pub use error::{DomainError, ErrorKind, Result};
pub use planning::{FulfillmentPlan, PlannedLine, SourcingMode, StockMovement, plan_lines};
pub use services::{
    Customer, CustomerDirectory, IdentityProvider, InMemoryCustomerDirectory,
    InMemoryIdentityProvider, InMemoryProductCatalog, ObjectStorage, Product, ProductCatalog,
    StaticObjectStorage,
};
