use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Extension, Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::orchestrator::ClaimOutcome;
use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::claim::{Adjudication, LineItem};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders/:id/claims", post(submit_claim))
        .route("/claims/adjudicate", post(preview))
}

#[derive(Deserialize)]
pub struct ClaimRequest {
    pub scheme: String,
    /// Defaults to the priced medications on the prescription.
    #[serde(default)]
    pub items: Vec<LineItem>,
}

async fn submit_claim(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<ClaimRequest>,
) -> Result<(StatusCode, Json<ClaimOutcome>), AppError> {
    let outcome = state
        .orchestrator
        .submit_claim(&actor, order_id, &payload.scheme, payload.items)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn preview(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<ClaimRequest>,
) -> Result<Json<Adjudication>, AppError> {
    let adjudication = state
        .orchestrator
        .preview_adjudication(&actor, &payload.scheme, &payload.items)
        .await?;
    Ok(Json(adjudication))
}
