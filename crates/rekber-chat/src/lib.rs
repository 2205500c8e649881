//! Rekber Chat - Per-transaction arbitration chat rooms
//!
//! Every transaction can carry two rooms, both keyed by its invoice:
//!
//! - the **transaction** room, where buyer, merchant and arbiters talk;
//! - the **arbitrase** room, where only arbiters may post (parties may
//!   read), mirroring sealed real-world arbitration.
//!
//! Message history is durable and owned by a [`MessageStore`]. Room
//! membership is not: it lives in process memory, is established by an
//! explicit join per connection, and is rebuilt from scratch on reconnect.
//! Durable authorization (role, party-of-transaction) is re-checked
//! against the store on every privileged action through a [`RoomGate`];
//! the in-memory membership map is never the source of truth for that.
//!
//! Joining replays the last [`ChatConfig::history_replay`] messages before
//! live delivery resumes; the full history stays queryable through the
//! archival read on the HTTP surface.

mod hub;
mod protocol;
mod store;

pub use hub::{ChatHub, ChatUser, ConnectionId};
pub use protocol::{ClientCommand, MessageView, PeerInfo, ServerEvent};
pub use store::{MessageStore, RoomAccess, RoomGate};

use thiserror::Error;

use rekber_types::EscrowError;

/// Hub configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Number of messages replayed on join
    pub history_replay: usize,
    /// Maximum accepted message body length in bytes
    pub max_message_len: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_replay: 50,
            max_message_len: 4096,
        }
    }
}

/// Chat operation errors
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Unknown connection")]
    UnknownConnection,

    #[error("You are not in this room")]
    NotInRoom,

    #[error("Message text or attachment is required")]
    EmptyMessage,

    #[error("Message too long: {len} bytes (max {max})")]
    MessageTooLong { len: usize, max: usize },

    #[error(transparent)]
    Escrow(#[from] EscrowError),
}

/// Result type for chat operations
pub type ChatResult<T> = Result<T, ChatError>;
