use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::orchestrator::{Completion, DeliveryView};
use crate::error::AppError;
use crate::ledger::TelemetryReceipt;
use crate::models::actor::Actor;
use crate::models::delivery::{Delivery, TelemetryUpdate};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deliveries/mine", get(driver_tasks))
        .route("/deliveries/:id", get(get_delivery))
        .route("/deliveries/:id/status", patch(update_status))
        .route("/deliveries/:id/verify-biometric", post(verify_biometric))
}

#[derive(Deserialize)]
pub struct BiometricRequest {
    pub biometric_hash: String,
}

async fn driver_tasks(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<Delivery>>, AppError> {
    Ok(Json(state.orchestrator.driver_tasks(&actor).await?))
}

async fn get_delivery(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryView>, AppError> {
    Ok(Json(state.orchestrator.get_delivery(&actor, id).await?))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(update): Json<TelemetryUpdate>,
) -> Result<Json<TelemetryReceipt>, AppError> {
    let receipt = state
        .orchestrator
        .update_delivery(&actor, id, &update)
        .await?;
    Ok(Json(receipt))
}

async fn verify_biometric(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(payload): Json<BiometricRequest>,
) -> Result<Json<Completion>, AppError> {
    let completion = state
        .orchestrator
        .verify_biometric(&actor, id, &payload.biometric_hash)
        .await?;
    Ok(Json(completion))
}
