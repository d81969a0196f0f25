use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ports::StoreError;

/// Errors surfaced by the plain HTTP endpoints. The payment callback never
/// uses these; it always answers with a JSON-RPC body.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Storage unavailable: {0}")]
    Storage(#[from] StoreError),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        tracing::error!(status = status.as_u16(), error = %self, "Request failed");

        // Internal details stay in the logs.
        let body = Json(json!({
            "error": status.canonical_reason().unwrap_or("error"),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
