//! Health endpoints

use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

/// Liveness check
pub async fn ping() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Server time, for client clock skew checks
pub async fn server_time() -> Json<Value> {
    Json(json!({ "server_time": Utc::now() }))
}
