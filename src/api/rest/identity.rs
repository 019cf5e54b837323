use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Extension, Json, Router};
use serde::Deserialize;

use crate::adapters::IdentityReport;
use crate::error::AppError;
use crate::models::actor::Actor;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/identity/verify", post(verify_identity))
}

#[derive(Deserialize)]
pub struct IdentityRequest {
    pub id_number: String,
}

async fn verify_identity(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<IdentityRequest>,
) -> Result<Json<IdentityReport>, AppError> {
    let report = state
        .orchestrator
        .verify_identity(&actor, &payload.id_number)
        .await?;
    Ok(Json(report))
}
