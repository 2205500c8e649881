//! API error handling
//!
//! One mapping from the domain taxonomy to HTTP. Every error becomes a
//! `{success: false, code, message}` body; the webhook relies on the
//! status split to control gateway retries (4xx is final, 503 retryable).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use rekber_chat::ChatError;
use rekber_types::EscrowError;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// API errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Not authorized for this action")]
    Forbidden,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Out of stock: {available} available, {requested} requested")]
    OutOfStock { available: u32, requested: u32 },

    #[error("Amount mismatch")]
    AmountMismatch,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service busy, retry: {0}")]
    Busy(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Forbidden => "FORBIDDEN",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::OutOfStock { .. } => "OUT_OF_STOCK",
            Self::AmountMismatch => "AMOUNT_MISMATCH",
            Self::Conflict(_) => "INVALID_STATE",
            Self::Busy(_) => "BUSY",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::InvalidSignature | Self::BadRequest(_) | Self::AmountMismatch => {
                StatusCode::BAD_REQUEST
            }
            Self::OutOfStock { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EscrowError> for ApiError {
    fn from(e: EscrowError) -> Self {
        match e {
            EscrowError::NotFound(what) => ApiError::NotFound(what),
            EscrowError::Unauthorized => ApiError::Forbidden,
            EscrowError::InvalidSignature => ApiError::InvalidSignature,
            EscrowError::InvalidTransition { from, to } => {
                ApiError::Conflict(format!("illegal transition from {from} to {to}"))
            }
            EscrowError::InvalidState { current } => {
                ApiError::Conflict(format!("not legal from status {current}"))
            }
            EscrowError::OutOfStock {
                available,
                requested,
            } => ApiError::OutOfStock {
                available,
                requested,
            },
            EscrowError::AmountMismatch { .. } => ApiError::AmountMismatch,
            EscrowError::Validation(msg) => ApiError::BadRequest(msg),
            EscrowError::Contention(msg) => ApiError::Busy(msg),
            EscrowError::Store(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::Escrow(inner) => inner.into(),
            ChatError::UnknownConnection => ApiError::Internal("unknown connection".into()),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

/// Error response body
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            success: false,
            code: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
