use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::inventory::{InventoryItem, NewInventoryItem};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/inventory", get(list_inventory).post(add_item))
        .route("/inventory/:id", patch(update_stock))
}

#[derive(Deserialize)]
pub struct StockUpdate {
    pub quantity: u32,
}

async fn list_inventory(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<InventoryItem>>, AppError> {
    Ok(Json(state.orchestrator.inventory(&actor).await?))
}

async fn add_item(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<NewInventoryItem>,
) -> Result<(StatusCode, Json<InventoryItem>), AppError> {
    let item = state
        .orchestrator
        .add_inventory_item(&actor, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn update_stock(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StockUpdate>,
) -> Result<Json<InventoryItem>, AppError> {
    let item = state
        .orchestrator
        .update_stock(&actor, id, payload.quantity)
        .await?;
    Ok(Json(item))
}
