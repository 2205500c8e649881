//! Rekber REST API
//!
//! HTTP and WebSocket surface for the escrow platform.
//!
//! ```text
//! /api/v1/
//! ├── /transactions            - Create, list, detail
//! ├── /transactions/:invoice/* - Complete, dispute, resolve
//! ├── /payments/callback       - Gateway webhook (signature-authenticated)
//! ├── /chats/:invoice/:kind    - Message archive
//! └── /ws                      - Live chat rooms
//! ```
//!
//! Session issuance is external; requests identify their caller with the
//! `x-user-id` header. Everything the caller may or may not do is decided
//! from durable state below this crate.

pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod websocket;

use axum::Router;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// API configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Enable CORS for browser clients
    pub enable_cors: bool,
    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
    /// Enable request tracing
    pub enable_tracing: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enable_cors: true,
            cors_origins: vec!["*".to_string()],
            enable_tracing: true,
        }
    }
}

/// Create the main API router with all middleware
pub fn create_router(state: Arc<AppState>, config: ApiConfig) -> Router {
    let mut router = Router::new()
        .nest("/api/v1", routes::api_v1_routes())
        .route("/health", axum::routing::get(handlers::health::ping))
        .with_state(state);

    if config.enable_tracing {
        router = router.layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        );
    }

    if config.enable_cors {
        let cors = if config.cors_origins.contains(&"*".to_string()) {
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
                .allow_origin(
                    config
                        .cors_origins
                        .iter()
                        .filter_map(|o| o.parse().ok())
                        .collect::<Vec<_>>(),
                )
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers(Any)
        };
        router = router.layer(cors);
    }

    router
}

/// Create a minimal router for testing
pub fn create_test_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_v1_routes())
        .route("/health", axum::routing::get(handlers::health::ping))
        .with_state(state)
}
