use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Extension, Json, Router};

use crate::engine::orchestrator::IssuePrescription;
use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::order::Order;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/prescriptions", post(issue_prescription))
}

async fn issue_prescription(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<IssuePrescription>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let order = state
        .orchestrator
        .issue_prescription(&actor, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}
