//! Chat wire protocol
//!
//! JSON messages tagged by `type`, in both directions.
//!
//! ## Join a room
//! ```json
//! {"type": "join_room", "invoice": "INV-1724...-A1B2C3D4", "kind": "arbitrase"}
//! ```
//!
//! ## Send a message
//! ```json
//! {"type": "send_message", "invoice": "INV-...", "kind": "transaction",
//!  "body": "barang sudah dikirim", "attachment": null}
//! ```
//!
//! ## Server push
//! ```json
//! {"type": "message", "data": { ... }}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rekber_types::{ChatMessage, Invoice, MessageKind, RoomKind, UserId};

/// Commands a connected client may issue
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Join one room of a transaction
    JoinRoom { invoice: Invoice, kind: RoomKind },
    /// Post a message into a joined room
    SendMessage {
        invoice: Invoice,
        kind: RoomKind,
        body: Option<String>,
        attachment: Option<String>,
    },
    /// Leave a joined room
    LeaveRoom { invoice: Invoice, kind: RoomKind },
    /// Typing indicator, relayed to the room without persistence
    Typing { invoice: Invoice, kind: RoomKind },
}

/// Events pushed to a connected client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Join confirmed; peers currently in the room
    Joined {
        invoice: Invoice,
        kind: RoomKind,
        peers: Vec<PeerInfo>,
    },
    /// Replayed backlog, oldest first, sent once right after `Joined`
    History {
        invoice: Invoice,
        kind: RoomKind,
        messages: Vec<MessageView>,
    },
    /// A newly accepted message (live delivery)
    Message { data: MessageView },
    /// Another user joined the room
    UserJoined { invoice: Invoice, kind: RoomKind, user: PeerInfo },
    /// Another user left the room
    UserLeft { invoice: Invoice, kind: RoomKind, user_id: UserId },
    /// Someone is typing
    Typing { invoice: Invoice, kind: RoomKind, user_id: UserId },
    /// Leave confirmed
    Left { invoice: Invoice, kind: RoomKind },
    /// Command rejected
    Error { message: String },
}

/// A room member as seen by peers
#[derive(Debug, Clone, Serialize)]
pub struct PeerInfo {
    pub user_id: UserId,
    pub username: String,
}

/// A chat message as delivered over the wire
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub id: Uuid,
    pub invoice: Invoice,
    pub kind: RoomKind,
    /// None for platform-generated messages
    pub sender_id: Option<UserId>,
    pub message_kind: MessageKind,
    pub body: String,
    pub attachment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<ChatMessage> for MessageView {
    fn from(m: ChatMessage) -> Self {
        Self {
            id: m.id,
            invoice: m.room_id,
            kind: m.room_kind,
            sender_id: m.sender_id,
            message_kind: m.kind,
            body: m.body,
            attachment: m.attachment,
            created_at: m.created_at,
        }
    }
}
