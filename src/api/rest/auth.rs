use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::actor::{Actor, Role};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pharmacy_id: Option<String>,
    pub exp: usize,
}

/// Signs an HS256 bearer token valid for `ttl`.
pub fn sign_token(
    secret: &str,
    user_id: &str,
    role: Role,
    pharmacy_id: Option<&str>,
    ttl: Duration,
) -> Result<String, AppError> {
    let claims = Claims {
        sub: user_id.to_string(),
        role,
        pharmacy_id: pharmacy_id.map(str::to_string),
        exp: (Utc::now() + ttl).timestamp().max(0) as usize,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|err| AppError::Internal(format!("failed to sign token: {err}")))
}

pub fn origin(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("direct")
        .to_string()
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Decodes an HS256 token into the calling [`Actor`].
pub fn actor_from_token(secret: &str, token: &str, origin: String) -> Result<Actor, AppError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|err| AppError::Unauthenticated(format!("invalid bearer token: {err}")))?;

    // Only the webhook path acts as the payment provider.
    if data.claims.role == Role::PaymentProvider {
        return Err(AppError::Unauthenticated(
            "role payment_provider cannot hold a bearer token".to_string(),
        ));
    }

    Ok(Actor {
        user_id: data.claims.sub,
        role: data.claims.role,
        pharmacy_id: data.claims.pharmacy_id,
        origin,
    })
}

pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| AppError::Unauthenticated("missing bearer token".to_string()))?;
    let actor = actor_from_token(&state.jwt_secret, token, origin(req.headers()))?;

    req.extensions_mut().insert(actor);
    Ok(next.run(req).await)
}
