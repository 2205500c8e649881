//! Arbitration chat message types
//!
//! Messages are the durable half of a chat room: the membership set is
//! connection-scoped and lives in the realtime hub, but every accepted
//! message is persisted and survives reconnects. A room is keyed by the
//! transaction's invoice plus a room kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{Invoice, UserId};

/// Kind of chat room attached to a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    /// Buyer <-> merchant room; buyer, merchant and arbiters may post
    Transaction,
    /// Sealed arbitration room; parties may read, only arbiters may post
    Arbitrase,
}

impl RoomKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomKind::Transaction => "transaction",
            RoomKind::Arbitrase => "arbitrase",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transaction" => Some(RoomKind::Transaction),
            "arbitrase" => Some(RoomKind::Arbitrase),
            _ => None,
        }
    }
}

/// Kind of message payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    /// Produced by the platform itself (dispute opened, dispute resolved);
    /// never attributable to a live connection.
    System,
}

/// A single persisted chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    /// Room identifier: the transaction's invoice
    pub room_id: Invoice,
    pub room_kind: RoomKind,
    /// None for system-generated messages
    pub sender_id: Option<UserId>,
    pub body: String,
    pub kind: MessageKind,
    /// Attachment reference (uploaded elsewhere, referenced here)
    pub attachment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Build a system message for a room.
    pub fn system(room_id: Invoice, room_kind: RoomKind, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            room_kind,
            sender_id: None,
            body: body.into(),
            kind: MessageKind::System,
            attachment: None,
            created_at: Utc::now(),
        }
    }

    /// Build a user message; the kind follows the payload: an attachment
    /// without text is an image, anything with text is text.
    pub fn user(
        room_id: Invoice,
        room_kind: RoomKind,
        sender_id: UserId,
        body: Option<String>,
        attachment: Option<String>,
    ) -> Self {
        let kind = match (&body, &attachment) {
            (None, Some(_)) => MessageKind::Image,
            _ => MessageKind::Text,
        };
        Self {
            id: Uuid::new_v4(),
            room_id,
            room_kind,
            sender_id: Some(sender_id),
            body: body.unwrap_or_default(),
            kind,
            attachment,
            created_at: Utc::now(),
        }
    }
}
