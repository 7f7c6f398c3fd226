//! Response encoding: pretty-printed JSON bodies and the failure envelope.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;

use crate::bus::BusFailure;

/// Encode a value as pretty-printed JSON with an explicit UTF-8 content type.
pub fn json_pretty(status: StatusCode, value: &Value) -> Response {
    let body = serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string());
    (
        status,
        [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
        body,
    )
        .into_response()
}

/// The uniform failure envelope, e.g. `{"error": "Add not implemented for expense"}`.
pub fn error_body(message: &str) -> Value {
    serde_json::json!({ "error": message })
}

/// Every failed request surfaces as a 500 with the failure message; there
/// is no client/server error distinction on this surface.
impl IntoResponse for BusFailure {
    fn into_response(self) -> Response {
        json_pretty(StatusCode::INTERNAL_SERVER_ERROR, &error_body(&self.message))
    }
}
