//! Payment gateway callback handler

use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::info;

use rekber_gateway::{CallbackAck, CallbackPayload};

use crate::error::ApiResult;
use crate::state::AppState;

/// Ingest one gateway callback. Replays are acknowledged with the same
/// fixed body without re-applying anything.
pub async fn payment_callback(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CallbackPayload>,
) -> ApiResult<Json<CallbackAck>> {
    info!(invoice = %payload.merchant_order_id, "gateway callback received");
    let ack = state.ingestor.handle(payload).await?;
    Ok(Json(ack))
}
