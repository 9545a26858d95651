//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{CustomerId, DebtStatus, DeliveryStatus, Money, OrderId};
use domain::{CreateOrder, DeleteOrder, OrderLine, UpdateOrder};
use projections::OrderView;
use serde::Deserialize;
use store::{OrderQuery, OrderSort, Store};

use super::{Actor, AppState};
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: CustomerId,
    #[serde(default)]
    pub order_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivery_status: Option<DeliveryStatus>,
    #[serde(default)]
    pub debt_status: Option<DebtStatus>,
    #[serde(default)]
    pub additional_cost: Option<Money>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub image_keys: Vec<String>,
    pub lines: Vec<OrderLine>,
}

impl CreateOrderRequest {
    fn into_command(self, actor: Actor) -> CreateOrder {
        let mut cmd = CreateOrder::new(actor.0, self.customer_id);
        cmd.order_date = self.order_date;
        cmd.delivery_status = self.delivery_status.unwrap_or_default();
        cmd.debt_status = self.debt_status;
        cmd.additional_cost = self.additional_cost.unwrap_or_default();
        cmd.note = self.note;
        cmd.image_keys = self.image_keys;
        cmd.lines = self.lines;
        cmd
    }
}

/// Fields to change; absent fields keep their value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateOrderRequest {
    pub customer_id: Option<CustomerId>,
    pub order_date: Option<DateTime<Utc>>,
    pub delivery_status: Option<DeliveryStatus>,
    pub debt_status: Option<DebtStatus>,
    pub additional_cost: Option<Money>,
    pub note: Option<String>,
    pub image_keys: Option<Vec<String>>,
}

impl UpdateOrderRequest {
    fn into_command(self, actor: Actor, order_id: OrderId) -> UpdateOrder {
        let mut cmd = UpdateOrder::new(actor.0, order_id);
        cmd.customer_id = self.customer_id;
        cmd.order_date = self.order_date;
        cmd.delivery_status = self.delivery_status;
        cmd.debt_status = self.debt_status;
        cmd.additional_cost = self.additional_cost;
        cmd.note = self.note;
        cmd.image_keys = self.image_keys;
        cmd
    }
}

/// `GET /orders` query string.
///
/// `status` takes a comma-separated list, e.g. `?status=PENDING,UNPAID`.
/// `sort` is one of `id_desc`, `order_date_asc` or `order_date_desc`.
#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersParams {
    pub customer_id: Option<i64>,
    pub status: Option<String>,
    pub sort: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ListOrdersParams {
    fn into_query(self) -> Result<OrderQuery, ApiError> {
        let mut query = OrderQuery::new();
        query.customer_id = self.customer_id.map(CustomerId::new);
        query.limit = self.limit;
        query.offset = self.offset;

        if let Some(status) = self.status {
            let statuses = status
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<DeliveryStatus>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| ApiError::bad_request("status", e.to_string()))?;
            query = query.statuses(statuses);
        }

        if let Some(sort) = self.sort {
            query = query.sort(match sort.as_str() {
                "id_desc" => OrderSort::IdDesc,
                "order_date_asc" => OrderSort::OrderDateAsc,
                "order_date_desc" => OrderSort::OrderDateDesc,
                other => {
                    return Err(ApiError::bad_request(
                        "sort",
                        format!("unknown sort {other:?}"),
                    ));
                }
            });
        }

        Ok(query)
    }
}

// -- Handlers --

/// POST /orders: create an order and take its stock.
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderView>), ApiError> {
    let Json(req) = payload?;
    let created = state.orders.create_order(req.into_command(actor)).await?;
    let view = state.reader.get_order(created.order.id).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /orders: list orders with derived totals.
#[tracing::instrument(skip(state, params))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    params: Result<Query<ListOrdersParams>, QueryRejection>,
) -> Result<Json<Vec<OrderView>>, ApiError> {
    let Query(params) = params?;
    let query = params.into_query()?;
    Ok(Json(state.reader.list_orders(&query).await?))
}

/// GET /orders/{id}: one order with its lines.
#[tracing::instrument(skip(state, id))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<OrderView>, ApiError> {
    let order_id = OrderId::new(id?.0);
    Ok(Json(state.reader.get_order(order_id).await?))
}

/// PATCH /orders/{id}: change status or metadata.
#[tracing::instrument(skip(state, id, payload))]
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateOrderRequest>, JsonRejection>,
) -> Result<Json<OrderView>, ApiError> {
    let order_id = OrderId::new(id?.0);
    let Json(req) = payload?;
    state
        .orders
        .update_order(req.into_command(actor, order_id))
        .await?;
    Ok(Json(state.reader.get_order(order_id).await?))
}

/// DELETE /orders/{id}: delete an order and put its stock back.
#[tracing::instrument(skip(state, id))]
pub async fn delete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    actor: Actor,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let order_id = OrderId::new(id?.0);
    state
        .orders
        .delete_order(DeleteOrder::new(actor.0, order_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
