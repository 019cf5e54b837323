use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::delivery::DeliveryStatus;
use crate::models::order::OrderStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid payment signature")]
    InvalidSignature,

    #[error("biometric verification failed: recipient identity mismatch")]
    BiometricMismatch,

    #[error("{adapter} adapter timed out after {timeout_ms}ms")]
    AdapterTimeout { adapter: &'static str, timeout_ms: u64 },

    #[error("{adapter} adapter unavailable: {reason}")]
    AdapterUnavailable { adapter: &'static str, reason: String },

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn order_transition(from: &OrderStatus, to: &OrderStatus) -> Self {
        AppError::InvalidTransition(format!("order cannot move from {from} to {to}"))
    }

    pub fn delivery_transition(from: &DeliveryStatus, to: &DeliveryStatus) -> Self {
        AppError::InvalidTransition(format!("delivery cannot move from {from} to {to}"))
    }

    /// Stable machine-readable classification, used as the `error` field of
    /// every rejected response.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated(_) => "unauthenticated",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidSignature => "invalid_signature",
            AppError::BiometricMismatch => "biometric_mismatch",
            AppError::AdapterTimeout { .. } => "adapter_timeout",
            AppError::AdapterUnavailable { .. } => "adapter_unavailable",
            AppError::InvalidTransition(_) => "invalid_transition",
            AppError::BadRequest(_) => "bad_request",
            AppError::Conflict(_) => "conflict",
            AppError::StorageUnavailable(_) => "storage_unavailable",
            AppError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated(_) | AppError::InvalidSignature => StatusCode::UNAUTHORIZED,
            AppError::Unauthorized(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BiometricMismatch => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::AdapterTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::AdapterUnavailable { .. } => StatusCode::BAD_GATEWAY,
            AppError::InvalidTransition(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = Json(json!({
            "error": self.code(),
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use super::AppError;
    use crate::models::order::OrderStatus;

    #[test]
    fn transition_error_names_both_states() {
        let err = AppError::order_transition(&OrderStatus::Paid, &OrderStatus::Delivered);
        assert_eq!(err.code(), "invalid_transition");
        assert!(err.to_string().contains("paid"));
        assert!(err.to_string().contains("delivered"));
    }

    #[test]
    fn timeout_maps_to_gateway_timeout() {
        let response = AppError::AdapterTimeout {
            adapter: "claim_adjudication",
            timeout_ms: 10,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
