//! Shared API state

use std::sync::Arc;

use rekber_chat::{ChatHub, MessageStore, RoomGate};
use rekber_escrow::{EscrowService, EscrowStore};
use rekber_gateway::WebhookIngestor;

/// State shared by all handlers
pub struct AppState {
    pub engine: Arc<EscrowService>,
    pub hub: Arc<ChatHub>,
    pub ingestor: Arc<WebhookIngestor>,
    pub store: Arc<dyn EscrowStore>,
    pub messages: Arc<dyn MessageStore>,
    pub gate: Arc<dyn RoomGate>,
}
