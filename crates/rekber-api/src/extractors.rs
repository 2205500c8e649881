//! Request extractors
//!
//! Session issuance is an external collaborator; requests carry the
//! caller's id in the `x-user-id` header. The id only identifies the
//! caller; roles and party membership are always re-read from the store
//! by the layer that enforces them.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use rekber_types::UserId;

use crate::error::ApiError;

/// The authenticated caller's id
#[derive(Debug, Clone, Copy)]
pub struct CallerId(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthenticated)?;
        let id = Uuid::parse_str(raw).map_err(|_| ApiError::Unauthenticated)?;
        Ok(CallerId(UserId::from(id)))
    }
}
