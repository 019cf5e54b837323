pub mod auth;
pub mod claims;
pub mod deliveries;
pub mod identity;
pub mod inventory;
pub mod orders;
pub mod payments;
pub mod prescriptions;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::notify::GLOBAL_CHANNEL;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .merge(prescriptions::router())
        .merge(orders::router())
        .merge(deliveries::router())
        .merge(claims::router())
        .merge(identity::router())
        .merge(inventory::router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .merge(protected)
        .merge(payments::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    server_time: DateTime<Utc>,
    orders: usize,
    deliveries: usize,
    claims: usize,
    connections: usize,
    global_subscribers: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, AppError> {
    let stats = state.orchestrator.stats().await?;
    Ok(Json(HealthResponse {
        status: "ok",
        server_time: Utc::now(),
        orders: stats.orders,
        deliveries: stats.deliveries,
        claims: stats.claims,
        connections: state.fanout.connection_count(),
        global_subscribers: state.fanout.subscriber_count(GLOBAL_CHANNEL),
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
