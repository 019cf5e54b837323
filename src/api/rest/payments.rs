use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::rest::auth::origin;
use crate::engine::orchestrator::PaymentOutcome;
use crate::error::AppError;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/payments/webhook", post(payment_webhook))
}

/// Signed by the gateway instead of carrying a bearer token; the raw body is
/// what the signature covers.
async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PaymentOutcome>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    let outcome = state
        .orchestrator
        .handle_payment_webhook(&origin(&headers), signature, &body)
        .await?;
    Ok(Json(outcome))
}
