use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;

use config::Config;
use services::auth::TokenValidator;
use storage::DeviceStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DeviceStore>,
    pub config: Arc<Config>,
    pub tokens: TokenValidator,
}

impl AppState {
    pub fn new(store: Arc<dyn DeviceStore>, config: Config) -> Self {
        let tokens = TokenValidator::new(&config.jwt);
        Self {
            store,
            config: Arc::new(config),
            tokens,
        }
    }
}

/// Assemble the HTTP application around `state`.
pub fn build_app(state: AppState) -> Router {
    let max_body_bytes = state.config.api.max_body_bytes;

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api::router::create_router(state.clone()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
