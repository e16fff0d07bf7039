//! Maps [`GatewayError`] onto HTTP responses.

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use conduit_core::GatewayError;
use serde_json::json;

/// Wraps a [`GatewayError`] so it can be returned directly from an `axum`
/// handler; serialises to `{"detail": "..."}` with the status from
/// [`GatewayError::status_code`].
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(error: GatewayError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = axum::http::StatusCode::from_u16(self.0.status_code())
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}
