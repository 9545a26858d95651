//! HTTP API server for inventory and order fulfillment.
//!
//! Provides REST endpoints for orders and inventory, with structured
//! logging (tracing) and Prometheus metrics. The acting user is taken from
//! the `x-actor-id` header.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use domain::{
    CustomerDirectory, IdentityProvider, InMemoryCustomerDirectory, InMemoryIdentityProvider,
    InMemoryProductCatalog, ObjectStorage, ProductCatalog, StaticObjectStorage,
};
use fulfillment::{FulfillmentConfig, InventoryService, OrderFulfillment};
use metrics_exporter_prometheus::PrometheusHandle;
use projections::ReadModel;
use store::{InMemoryStore, PostgresStore, Store, StoreError};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route(
            "/orders",
            post(routes::orders::create::<S>).get(routes::orders::list::<S>),
        )
        .route(
            "/orders/{id}",
            get(routes::orders::get::<S>)
                .patch(routes::orders::update::<S>)
                .delete(routes::orders::delete::<S>),
        )
        .route("/inventory", get(routes::inventory::list::<S>))
        .route(
            "/inventory/{product_id}",
            get(routes::inventory::get::<S>).post(routes::inventory::register::<S>),
        )
        .route(
            "/inventory/{product_id}/history",
            get(routes::inventory::history::<S>),
        )
        .route(
            "/inventory/{product_id}/quantity",
            patch(routes::inventory::update_quantity::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Lookup services the engine and read model consult.
#[derive(Clone)]
pub struct Collaborators {
    pub identity: Arc<dyn IdentityProvider>,
    pub catalog: Arc<dyn ProductCatalog>,
    pub customers: Arc<dyn CustomerDirectory>,
    pub storage: Arc<dyn ObjectStorage>,
}

/// Wires the engine, inventory service and read model over one store.
pub fn create_state<S: Store>(
    store: S,
    collaborators: Collaborators,
    config: &Config,
    backend: &'static str,
) -> Arc<AppState<S>> {
    let fulfillment_config = FulfillmentConfig::default().with_sourcing_mode(config.sourcing_mode);

    let orders = OrderFulfillment::new(
        store.clone(),
        collaborators.identity.clone(),
        collaborators.catalog.clone(),
        fulfillment_config.clone(),
    );
    let inventory = InventoryService::new(
        store.clone(),
        collaborators.identity,
        fulfillment_config,
    );
    let reader = ReadModel::new(
        store,
        collaborators.catalog,
        collaborators.customers,
        collaborators.storage,
    )
    .with_image_ttl(config.image_url_ttl);

    Arc::new(AppState {
        orders,
        inventory,
        reader,
        backend,
    })
}

/// In-memory backend with directly seedable collaborators.
///
/// Used when no `DATABASE_URL` is configured, and by tests.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    pub store: InMemoryStore,
    pub identity: Arc<InMemoryIdentityProvider>,
    pub catalog: Arc<InMemoryProductCatalog>,
    pub customers: Arc<InMemoryCustomerDirectory>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, config: &Config) -> Arc<AppState<InMemoryStore>> {
        create_state(
            self.store.clone(),
            Collaborators {
                identity: self.identity.clone(),
                catalog: self.catalog.clone(),
                customers: self.customers.clone(),
                storage: Arc::new(StaticObjectStorage::default()),
            },
            config,
            "memory",
        )
    }
}

/// Connects to PostgreSQL, applies migrations and wires the state.
///
/// Users, products and customers are read from their tables.
pub async fn postgres_state(
    url: &str,
    config: &Config,
) -> Result<Arc<AppState<PostgresStore>>, StoreError> {
    let store =
        PostgresStore::connect(url, config.db_max_connections, config.db_lock_timeout).await?;
    store.run_migrations().await?;

    let lookups = Arc::new(store.clone());
    let collaborators = Collaborators {
        identity: lookups.clone(),
        catalog: lookups.clone(),
        customers: lookups,
        storage: Arc::new(StaticObjectStorage::default()),
    };
    Ok(create_state(store, collaborators, config, "postgres"))
}
