//! Chat archive reads
//!
//! The live rooms run over the WebSocket; this is the durable archive
//! view, gated by the same room-access rules as joining.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use rekber_chat::MessageView;
use rekber_types::{Invoice, RoomKind};

use crate::error::{ApiError, ApiResult};
use crate::extractors::CallerId;
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 200;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// Read a room's message history, oldest first
pub async fn history(
    State(state): State<Arc<AppState>>,
    CallerId(caller): CallerId,
    Path((invoice, kind)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<MessageView>>> {
    let kind = RoomKind::parse(&kind)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown room kind: {kind}")))?;
    let invoice = Invoice::from(invoice);

    let access = state.gate.access(&invoice, caller).await?;
    if !access.may_join() {
        return Err(ApiError::Forbidden);
    }

    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);
    let messages = state.messages.history(&invoice, kind, limit).await?;
    Ok(Json(messages.into_iter().map(MessageView::from).collect()))
}
