pub mod payme;

use crate::error::AppError;
use crate::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub storage: String,
}

/// Liveness plus a storage round trip. Answers 503 when storage is down.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthStatus>, AppError> {
    state.store.ping().await?;

    Ok(Json(HealthStatus {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage: "connected".to_string(),
    }))
}
