use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::delivery::Delivery;
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/accept", patch(accept_order))
        .route("/orders/:id/assign-driver", post(assign_driver))
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
}

#[derive(Deserialize)]
pub struct AssignDriverRequest {
    pub driver_id: String,
}

#[derive(Serialize)]
pub struct DispatchResponse {
    pub order: Order,
    pub delivery: Delivery,
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<Order>>, AppError> {
    let orders = state.orchestrator.list_orders(&actor, query.status).await?;
    Ok(Json(orders))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state.orchestrator.get_order(&actor, id).await?;
    Ok(Json(order))
}

async fn accept_order(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state.orchestrator.accept_order(&actor, id).await?;
    Ok(Json(order))
}

async fn assign_driver(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignDriverRequest>,
) -> Result<Json<DispatchResponse>, AppError> {
    let (order, delivery) = state
        .orchestrator
        .assign_driver(&actor, id, &payload.driver_id)
        .await?;
    Ok(Json(DispatchResponse { order, delivery }))
}
