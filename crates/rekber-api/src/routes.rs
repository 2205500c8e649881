//! Route definitions

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::state::AppState;
use crate::websocket;

/// API v1 routes
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        // General endpoints
        .route("/ping", get(handlers::health::ping))
        .route("/time", get(handlers::health::server_time))
        // Escrow transactions
        .nest("/transactions", transaction_routes())
        // Gateway callback (authenticated by signature, not session)
        .route("/payments/callback", post(handlers::webhook::payment_callback))
        // Chat archive
        .route("/chats/:invoice/:kind", get(handlers::chat::history))
        // Live chat
        .route("/ws", get(websocket::ws_handler))
}

fn transaction_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(handlers::transaction::create))
        .route("/", get(handlers::transaction::list))
        .route("/:invoice", get(handlers::transaction::detail))
        .route("/:invoice/complete", post(handlers::transaction::complete))
        .route("/:invoice/dispute", post(handlers::transaction::open_dispute))
        .route("/:invoice/resolve", post(handlers::transaction::resolve_dispute))
}
