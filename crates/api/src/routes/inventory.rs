//! Inventory endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{ProductId, VersionToken};
use domain::UpdateQuantity;
use projections::{InventoryListEntry, InventoryView};
use serde::Deserialize;
use store::{Inventory, InventoryHistoryEntry, Store};

use super::{Actor, AppState};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    /// Signed change: positive for stock-in, negative for write-off.
    pub delta: i64,
    pub expected_version: VersionToken,
    #[serde(default)]
    pub note: Option<String>,
}

/// GET /inventory: every stock row with its product details.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<InventoryListEntry>>, ApiError> {
    Ok(Json(state.reader.list_inventory().await?))
}

/// POST /inventory/{product_id}: create the empty stock row of a product.
#[tracing::instrument(skip(state, id))]
pub async fn register<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<(StatusCode, Json<Inventory>), ApiError> {
    let product_id = ProductId::new(id?.0);
    let inventory = state.inventory.register_product(product_id).await?;
    Ok((StatusCode::CREATED, Json(inventory)))
}

/// GET /inventory/{product_id}: stock, version token and history.
#[tracing::instrument(skip(state, id))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<InventoryView>, ApiError> {
    let product_id = ProductId::new(id?.0);
    Ok(Json(state.reader.inventory_view(product_id).await?))
}

/// GET /inventory/{product_id}/history
#[tracing::instrument(skip(state, id))]
pub async fn history<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Vec<InventoryHistoryEntry>>, ApiError> {
    let product_id = ProductId::new(id?.0);
    // Distinguish "no movements yet" from "no such product".
    state.inventory.get(product_id).await?;
    Ok(Json(state.inventory.history(product_id).await?))
}

/// PATCH /inventory/{product_id}/quantity: manual stock adjustment.
#[tracing::instrument(skip(state, id, payload))]
pub async fn update_quantity<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateQuantityRequest>, JsonRejection>,
) -> Result<Json<Inventory>, ApiError> {
    let product_id = ProductId::new(id?.0);
    let Json(req) = payload?;

    let mut cmd = UpdateQuantity::new(actor.0, product_id, req.delta, req.expected_version);
    cmd.note = req.note;
    Ok(Json(state.inventory.update_quantity(cmd).await?))
}
