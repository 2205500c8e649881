//! Durable seams of the chat layer
//!
//! The hub itself holds no durable state. Message persistence goes through
//! [`MessageStore`]; authorization facts (who is a party to the
//! transaction, who is an arbiter) are re-read through [`RoomGate`].

use async_trait::async_trait;

use rekber_types::{ChatMessage, Invoice, Result, RoomKind, UserId, UserRole};

/// Append-only message persistence
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist one accepted message.
    async fn append(&self, msg: &ChatMessage) -> Result<()>;

    /// The last `limit` messages of a room, oldest first.
    async fn history(
        &self,
        room_id: &Invoice,
        kind: RoomKind,
        limit: usize,
    ) -> Result<Vec<ChatMessage>>;
}

/// What a user is allowed to do in the rooms of one transaction
#[derive(Debug, Clone, Copy)]
pub struct RoomAccess {
    pub role: UserRole,
    pub is_buyer: bool,
    pub is_merchant_owner: bool,
}

impl RoomAccess {
    /// Parties and arbiters may join either room kind.
    pub fn may_join(&self) -> bool {
        self.role == UserRole::Arbiter || self.is_buyer || self.is_merchant_owner
    }

    /// Posting in the arbitrase room is arbiter-only; the transaction room
    /// is writable by anyone who may join it.
    pub fn may_post(&self, kind: RoomKind) -> bool {
        match kind {
            RoomKind::Transaction => self.may_join(),
            RoomKind::Arbitrase => self.role == UserRole::Arbiter,
        }
    }
}

/// Durable access re-check, evaluated per privileged action
#[async_trait]
pub trait RoomGate: Send + Sync {
    /// Resolve what `user` may do in the rooms keyed by `invoice`.
    ///
    /// Fails with `NotFound` for an unknown invoice.
    async fn access(&self, invoice: &Invoice, user: UserId) -> Result<RoomAccess>;
}
