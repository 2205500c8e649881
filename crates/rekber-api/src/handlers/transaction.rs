//! Transaction handlers
//!
//! Thin layer over the escrow engine: extract the caller, translate
//! bodies, map domain errors to HTTP. All authorization and state
//! legality live below this layer.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use rekber_escrow::TransactionQuery;
use rekber_types::{Invoice, ProductId};

use crate::dto::{
    CreateTransactionRequest, CreateTransactionResponse, ListTransactionsQuery,
    OpenDisputeRequest, ResolveDisputeRequest, TransactionView,
};
use crate::error::ApiResult;
use crate::extractors::CallerId;
use crate::state::AppState;

/// Create an escrow transaction
pub async fn create(
    State(state): State<Arc<AppState>>,
    CallerId(caller): CallerId,
    Json(request): Json<CreateTransactionRequest>,
) -> ApiResult<(StatusCode, Json<CreateTransactionResponse>)> {
    let txn = state
        .engine
        .create(
            caller,
            ProductId::from(request.product_id),
            request.quantity,
            request.payment_method,
        )
        .await?;

    let payment_url = state.ingestor.config().payment_url(&txn.invoice);
    let response = CreateTransactionResponse {
        invoice: txn.invoice.0,
        fees: txn.fees,
        payment_url,
        expires_at: txn.due_date,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// Transaction detail, visible to its parties and arbiters
pub async fn detail(
    State(state): State<Arc<AppState>>,
    CallerId(caller): CallerId,
    Path(invoice): Path<String>,
) -> ApiResult<Json<TransactionView>> {
    let txn = state.engine.detail(&Invoice::from(invoice), caller).await?;
    Ok(Json(txn.into()))
}

/// List the caller's transactions: purchases plus owned-shop sales
pub async fn list(
    State(state): State<Arc<AppState>>,
    CallerId(caller): CallerId,
    Query(query): Query<ListTransactionsQuery>,
) -> ApiResult<Json<Vec<TransactionView>>> {
    let filter = TransactionQuery {
        status: query.status,
        limit: query.limit,
        offset: query.offset,
    };
    let txns = state.engine.list(caller, &filter).await?;
    Ok(Json(txns.into_iter().map(TransactionView::from).collect()))
}

/// Release escrowed funds to the merchant
pub async fn complete(
    State(state): State<Arc<AppState>>,
    CallerId(caller): CallerId,
    Path(invoice): Path<String>,
) -> ApiResult<Json<TransactionView>> {
    let txn = state
        .engine
        .complete(&Invoice::from(invoice), caller)
        .await?;
    Ok(Json(txn.into()))
}

/// Buyer opens a dispute
pub async fn open_dispute(
    State(state): State<Arc<AppState>>,
    CallerId(caller): CallerId,
    Path(invoice): Path<String>,
    Json(request): Json<OpenDisputeRequest>,
) -> ApiResult<Json<TransactionView>> {
    let txn = state
        .engine
        .request_dispute(&Invoice::from(invoice), caller, request.reason)
        .await?;
    Ok(Json(txn.into()))
}

/// Arbiter resolves a dispute
pub async fn resolve_dispute(
    State(state): State<Arc<AppState>>,
    CallerId(caller): CallerId,
    Path(invoice): Path<String>,
    Json(request): Json<ResolveDisputeRequest>,
) -> ApiResult<Json<TransactionView>> {
    let txn = state
        .engine
        .resolve_dispute(
            &Invoice::from(invoice),
            caller,
            request.decision,
            request.note,
        )
        .await?;
    Ok(Json(txn.into()))
}
