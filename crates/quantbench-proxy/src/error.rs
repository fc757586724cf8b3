use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Per-request failures surfaced to the proxy's caller. The caller
/// owns retry policy; the proxy never retries.
#[derive(Debug)]
pub enum ProxyError {
    /// Backend connection could not be established.
    BackendUnreachable(String),
    /// Backend stream stalled past the upper bound.
    BackendTimeout,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ProxyError::BackendUnreachable(msg) => (
                StatusCode::BAD_GATEWAY,
                format!("Cannot connect to backend: {}", msg),
            ),
            ProxyError::BackendTimeout => {
                (StatusCode::GATEWAY_TIMEOUT, "Backend timeout".to_string())
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
