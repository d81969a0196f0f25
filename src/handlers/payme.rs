use axum::{
    body::Bytes,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap},
    Json,
};

use crate::payme::dispatcher::request_id;
use crate::payme::protocol::{RpcError, RpcResponse};
use crate::AppState;

/// Processor callback endpoint. The processor treats any non-200 status as a
/// transport failure, so every outcome is answered with 200 and a JSON-RPC body.
pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<RpcResponse> {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let handled = tokio::time::timeout(
        state.request_timeout,
        state.dispatcher.handle(authorization, &body),
    )
    .await;

    match handled {
        Ok(response) => Json(response),
        // Dropping the dispatch future rolls back any open store transaction;
        // the processor retries and gets the recorded outcome.
        Err(_) => {
            tracing::error!(
                timeout_ms = state.request_timeout.as_millis() as u64,
                "Callback exceeded request deadline"
            );
            Json(RpcResponse::failure(request_id(&body), RpcError::internal()))
        }
    }
}
