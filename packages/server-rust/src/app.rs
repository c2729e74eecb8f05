//! Shared state and router assembly.

use std::sync::Arc;

use axum::routing::{get, get_service, post_service};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio_util::sync::CancellationToken;

use crate::books::{create_book, delete_book, get_book, list_books, BookStore};
use crate::network::handlers::{liveness_handler, metrics_handler, readiness_handler};
use crate::network::{build_http_layers, NetworkConfig};
use crate::stages::BearerAuth;

/// State shared by the chains and the health handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<BookStore>,
    pub auth: BearerAuth,
    /// Cancelled when the process starts shutting down. Every request
    /// context derives from it.
    pub shutdown: CancellationToken,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            store: Arc::new(BookStore::new()),
            auth: BearerAuth::new(config.api_tokens.iter().cloned()),
            shutdown: CancellationToken::new(),
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Routes only, without transport middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/books",
            post_service(create_book(&state)).get_service(list_books(&state)),
        )
        .route(
            "/books/{id}",
            get_service(get_book(&state)).delete_service(delete_book(&state)),
        )
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// The full application: routes wrapped in the middleware stack.
pub fn build_app(state: AppState, config: &NetworkConfig) -> Router {
    let layers = build_http_layers(config, state.shutdown.clone());
    build_router(state).layer(layers)
}
