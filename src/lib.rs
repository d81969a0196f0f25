pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod payme;
pub mod ports;
pub mod startup;
pub mod utils;
pub mod validation;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;

use crate::middleware::request_logger::{request_logger_middleware, RequestLogSettings};
use crate::payme::PaymeDispatcher;
use crate::ports::PaymentStore;

/// Callback bodies are small; anything larger is not a processor request.
pub const MAX_CALLBACK_BODY_BYTES: usize = 64 * 1024;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PaymentStore>,
    pub dispatcher: Arc<PaymeDispatcher>,
    /// Deadline for one callback; overrun is answered as an internal error.
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(store: Arc<dyn PaymentStore>, dispatcher: PaymeDispatcher) -> Self {
        Self {
            store,
            dispatcher: Arc::new(dispatcher),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// `/payme` enforces its deadline inside the handler so an overrun still gets
/// a JSON-RPC body; the timeout layer only guards `/health`.
pub fn create_app(state: AppState, request_timeout: Duration, log_request_body: bool) -> Router {
    let state = AppState {
        request_timeout,
        ..state
    };

    Router::new()
        .route(
            "/health",
            get(handlers::health).layer(TimeoutLayer::new(request_timeout)),
        )
        .route("/payme", post(handlers::payme::callback))
        .layer(DefaultBodyLimit::max(MAX_CALLBACK_BODY_BYTES))
        .layer(axum_middleware::from_fn_with_state(
            RequestLogSettings {
                log_body: log_request_body,
            },
            request_logger_middleware,
        ))
        .with_state(state)
}
