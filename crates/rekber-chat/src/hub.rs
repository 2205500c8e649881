//! Realtime chat hub
//!
//! Tracks live connections and their room memberships in process memory.
//! Everything durable (messages, authorization facts) goes through the
//! [`MessageStore`] and [`RoomGate`] seams, so a hub restart loses only the
//! membership map, which clients rebuild by rejoining.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use rekber_types::{ChatMessage, EscrowError, Invoice, RoomKind, UserId};

use crate::protocol::{ClientCommand, MessageView, PeerInfo, ServerEvent};
use crate::store::{MessageStore, RoomGate};
use crate::{ChatConfig, ChatError, ChatResult};

/// Identifier of one live WebSocket connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The authenticated identity behind a connection
#[derive(Debug, Clone)]
pub struct ChatUser {
    pub user_id: UserId,
    pub username: String,
}

struct Connection {
    user: ChatUser,
    tx: mpsc::UnboundedSender<ServerEvent>,
    rooms: HashSet<(Invoice, RoomKind)>,
}

/// Realtime hub for arbitration chat
pub struct ChatHub {
    config: ChatConfig,
    store: Arc<dyn MessageStore>,
    gate: Arc<dyn RoomGate>,
    next_id: AtomicU64,
    connections: DashMap<ConnectionId, Connection>,
    rooms: DashMap<(Invoice, RoomKind), HashSet<ConnectionId>>,
}

impl ChatHub {
    pub fn new(config: ChatConfig, store: Arc<dyn MessageStore>, gate: Arc<dyn RoomGate>) -> Self {
        Self {
            config,
            store,
            gate,
            next_id: AtomicU64::new(1),
            connections: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    /// Register a connection; events for it arrive on the returned receiver.
    pub fn connect(&self, user: ChatUser) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(
            id,
            Connection {
                user,
                tx,
                rooms: HashSet::new(),
            },
        );
        debug!(conn = %id, "chat connection registered");
        (id, rx)
    }

    /// Tear down a connection, leaving every room it joined.
    pub fn disconnect(&self, conn: ConnectionId) {
        let Some((_, state)) = self.connections.remove(&conn) else {
            return;
        };
        for (invoice, kind) in state.rooms {
            self.remove_member(conn, &invoice, kind);
            self.broadcast(
                &invoice,
                kind,
                None,
                ServerEvent::UserLeft {
                    invoice: invoice.clone(),
                    kind,
                    user_id: state.user.user_id,
                },
            );
        }
        debug!(conn = %conn, "chat connection closed");
    }

    /// Dispatch one client command.
    pub async fn handle(&self, conn: ConnectionId, cmd: ClientCommand) -> ChatResult<()> {
        match cmd {
            ClientCommand::JoinRoom { invoice, kind } => self.join(conn, invoice, kind).await,
            ClientCommand::SendMessage {
                invoice,
                kind,
                body,
                attachment,
            } => self.send(conn, invoice, kind, body, attachment).await,
            ClientCommand::LeaveRoom { invoice, kind } => self.leave(conn, invoice, kind),
            ClientCommand::Typing { invoice, kind } => self.typing(conn, invoice, kind),
        }
    }

    /// Join a room: authorize against the store, replay the recent backlog,
    /// then announce the newcomer to current members.
    pub async fn join(&self, conn: ConnectionId, invoice: Invoice, kind: RoomKind) -> ChatResult<()> {
        let user = self.user_of(conn)?;
        let access = self.gate.access(&invoice, user.user_id).await?;
        if !access.may_join() {
            return Err(ChatError::Escrow(EscrowError::Unauthorized));
        }

        let peers: Vec<PeerInfo> = self
            .rooms
            .get(&(invoice.clone(), kind))
            .map(|members| {
                members
                    .iter()
                    .filter_map(|id| self.connections.get(id))
                    .map(|c| PeerInfo {
                        user_id: c.user.user_id,
                        username: c.user.username.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let history = self
            .store
            .history(&invoice, kind, self.config.history_replay)
            .await?;

        self.rooms
            .entry((invoice.clone(), kind))
            .or_default()
            .insert(conn);
        if let Some(mut state) = self.connections.get_mut(&conn) {
            state.rooms.insert((invoice.clone(), kind));
        }

        self.push(
            conn,
            ServerEvent::Joined {
                invoice: invoice.clone(),
                kind,
                peers,
            },
        );
        self.push(
            conn,
            ServerEvent::History {
                invoice: invoice.clone(),
                kind,
                messages: history.into_iter().map(MessageView::from).collect(),
            },
        );
        self.broadcast(
            &invoice,
            kind,
            Some(conn),
            ServerEvent::UserJoined {
                invoice: invoice.clone(),
                kind,
                user: PeerInfo {
                    user_id: user.user_id,
                    username: user.username,
                },
            },
        );
        debug!(conn = %conn, invoice = %invoice, kind = kind.as_str(), "joined room");
        Ok(())
    }

    /// Accept, persist and fan out one message.
    ///
    /// Posting rights are re-read from the store on every send; kicking a
    /// user out of a role takes effect on their next message, not their
    /// next reconnect.
    pub async fn send(
        &self,
        conn: ConnectionId,
        invoice: Invoice,
        kind: RoomKind,
        body: Option<String>,
        attachment: Option<String>,
    ) -> ChatResult<()> {
        let user = self.user_of(conn)?;
        if !self.is_member(conn, &invoice, kind) {
            return Err(ChatError::NotInRoom);
        }

        let body = body.filter(|b| !b.trim().is_empty());
        if body.is_none() && attachment.is_none() {
            return Err(ChatError::EmptyMessage);
        }
        if let Some(ref b) = body {
            if b.len() > self.config.max_message_len {
                return Err(ChatError::MessageTooLong {
                    len: b.len(),
                    max: self.config.max_message_len,
                });
            }
        }

        let access = self.gate.access(&invoice, user.user_id).await?;
        if !access.may_post(kind) {
            return Err(ChatError::Escrow(EscrowError::Unauthorized));
        }

        let msg = ChatMessage::user(invoice.clone(), kind, user.user_id, body, attachment);
        self.store.append(&msg).await?;
        self.broadcast(
            &invoice,
            kind,
            None,
            ServerEvent::Message {
                data: MessageView::from(msg),
            },
        );
        Ok(())
    }

    /// Leave a room and tell the remaining members.
    pub fn leave(&self, conn: ConnectionId, invoice: Invoice, kind: RoomKind) -> ChatResult<()> {
        let user = self.user_of(conn)?;
        if let Some(mut state) = self.connections.get_mut(&conn) {
            if !state.rooms.remove(&(invoice.clone(), kind)) {
                return Err(ChatError::NotInRoom);
            }
        }
        self.remove_member(conn, &invoice, kind);
        self.push(
            conn,
            ServerEvent::Left {
                invoice: invoice.clone(),
                kind,
            },
        );
        self.broadcast(
            &invoice,
            kind,
            None,
            ServerEvent::UserLeft {
                invoice: invoice.clone(),
                kind,
                user_id: user.user_id,
            },
        );
        Ok(())
    }

    /// Relay a typing indicator to the other members. Never persisted.
    pub fn typing(&self, conn: ConnectionId, invoice: Invoice, kind: RoomKind) -> ChatResult<()> {
        let user = self.user_of(conn)?;
        if !self.is_member(conn, &invoice, kind) {
            return Err(ChatError::NotInRoom);
        }
        self.broadcast(
            &invoice,
            kind,
            Some(conn),
            ServerEvent::Typing {
                invoice: invoice.clone(),
                kind,
                user_id: user.user_id,
            },
        );
        Ok(())
    }

    /// Fan out an already-persisted message to any live members.
    ///
    /// Used for platform-generated messages (dispute opened, dispute
    /// resolved): the caller persists them atomically with the status
    /// change, then hands them here for live delivery only.
    pub fn broadcast_system(&self, msg: &ChatMessage) {
        self.broadcast(
            &msg.room_id,
            msg.room_kind,
            None,
            ServerEvent::Message {
                data: MessageView::from(msg.clone()),
            },
        );
    }

    fn user_of(&self, conn: ConnectionId) -> ChatResult<ChatUser> {
        self.connections
            .get(&conn)
            .map(|c| c.user.clone())
            .ok_or(ChatError::UnknownConnection)
    }

    fn is_member(&self, conn: ConnectionId, invoice: &Invoice, kind: RoomKind) -> bool {
        self.connections
            .get(&conn)
            .map(|c| c.rooms.contains(&(invoice.clone(), kind)))
            .unwrap_or(false)
    }

    fn remove_member(&self, conn: ConnectionId, invoice: &Invoice, kind: RoomKind) {
        let key = (invoice.clone(), kind);
        let emptied = self
            .rooms
            .get_mut(&key)
            .map(|mut members| {
                members.remove(&conn);
                members.is_empty()
            })
            .unwrap_or(false);
        if emptied {
            self.rooms.remove(&key);
        }
    }

    fn push(&self, conn: ConnectionId, event: ServerEvent) {
        if let Some(state) = self.connections.get(&conn) {
            if state.tx.send(event).is_err() {
                warn!(conn = %conn, "dropping event for closed connection");
            }
        }
    }

    fn broadcast(
        &self,
        invoice: &Invoice,
        kind: RoomKind,
        skip: Option<ConnectionId>,
        event: ServerEvent,
    ) {
        let Some(members) = self.rooms.get(&(invoice.clone(), kind)) else {
            return;
        };
        for id in members.iter() {
            if Some(*id) == skip {
                continue;
            }
            if let Some(state) = self.connections.get(id) {
                let _ = state.tx.send(event.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use rekber_types::{Result as EscrowResult, UserRole};

    use super::*;
    use crate::store::RoomAccess;

    #[derive(Default)]
    struct MemMessages {
        inner: Mutex<Vec<ChatMessage>>,
    }

    #[async_trait]
    impl MessageStore for MemMessages {
        async fn append(&self, msg: &ChatMessage) -> EscrowResult<()> {
            self.inner.lock().await.push(msg.clone());
            Ok(())
        }

        async fn history(
            &self,
            room_id: &Invoice,
            kind: RoomKind,
            limit: usize,
        ) -> EscrowResult<Vec<ChatMessage>> {
            let inner = self.inner.lock().await;
            let matching: Vec<ChatMessage> = inner
                .iter()
                .filter(|m| &m.room_id == room_id && m.room_kind == kind)
                .cloned()
                .collect();
            let skip = matching.len().saturating_sub(limit);
            Ok(matching.into_iter().skip(skip).collect())
        }
    }

    struct MapGate {
        access: HashMap<UserId, RoomAccess>,
    }

    #[async_trait]
    impl RoomGate for MapGate {
        async fn access(&self, invoice: &Invoice, user: UserId) -> EscrowResult<RoomAccess> {
            self.access
                .get(&user)
                .copied()
                .ok_or_else(|| EscrowError::NotFound(invoice.to_string()))
        }
    }

    struct Fixture {
        hub: ChatHub,
        buyer: UserId,
        merchant: UserId,
        arbiter: UserId,
        stranger: UserId,
    }

    fn fixture() -> Fixture {
        let buyer = UserId::new();
        let merchant = UserId::new();
        let arbiter = UserId::new();
        let stranger = UserId::new();

        let mut access = HashMap::new();
        access.insert(
            buyer,
            RoomAccess {
                role: UserRole::Buyer,
                is_buyer: true,
                is_merchant_owner: false,
            },
        );
        access.insert(
            merchant,
            RoomAccess {
                role: UserRole::Merchant,
                is_buyer: false,
                is_merchant_owner: true,
            },
        );
        access.insert(
            arbiter,
            RoomAccess {
                role: UserRole::Arbiter,
                is_buyer: false,
                is_merchant_owner: false,
            },
        );
        access.insert(
            stranger,
            RoomAccess {
                role: UserRole::Buyer,
                is_buyer: false,
                is_merchant_owner: false,
            },
        );

        let hub = ChatHub::new(
            ChatConfig::default(),
            Arc::new(MemMessages::default()),
            Arc::new(MapGate { access }),
        );
        Fixture {
            hub,
            buyer,
            merchant,
            arbiter,
            stranger,
        }
    }

    fn chat_user(id: UserId, name: &str) -> ChatUser {
        ChatUser {
            user_id: id,
            username: name.to_string(),
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        events
    }

    #[tokio::test]
    async fn join_replays_history_then_delivers_live() {
        let f = fixture();
        let invoice = Invoice::from("INV-1-AA");

        let (buyer_conn, mut buyer_rx) = f.hub.connect(chat_user(f.buyer, "budi"));
        f.hub
            .join(buyer_conn, invoice.clone(), RoomKind::Transaction)
            .await
            .unwrap();
        f.hub
            .send(
                buyer_conn,
                invoice.clone(),
                RoomKind::Transaction,
                Some("halo".into()),
                None,
            )
            .await
            .unwrap();
        drain(&mut buyer_rx);

        let (merchant_conn, mut merchant_rx) = f.hub.connect(chat_user(f.merchant, "toko"));
        f.hub
            .join(merchant_conn, invoice.clone(), RoomKind::Transaction)
            .await
            .unwrap();

        let events = drain(&mut merchant_rx);
        assert!(matches!(events[0], ServerEvent::Joined { ref peers, .. } if peers.len() == 1));
        assert!(
            matches!(events[1], ServerEvent::History { ref messages, .. } if messages.len() == 1)
        );

        // Buyer saw the newcomer
        let buyer_events = drain(&mut buyer_rx);
        assert!(buyer_events
            .iter()
            .any(|e| matches!(e, ServerEvent::UserJoined { .. })));
    }

    #[tokio::test]
    async fn history_replay_is_capped() {
        let f = fixture();
        let invoice = Invoice::from("INV-1-BB");

        let (conn, mut rx) = f.hub.connect(chat_user(f.buyer, "budi"));
        f.hub
            .join(conn, invoice.clone(), RoomKind::Transaction)
            .await
            .unwrap();
        for i in 0..60 {
            f.hub
                .send(
                    conn,
                    invoice.clone(),
                    RoomKind::Transaction,
                    Some(format!("msg {i}")),
                    None,
                )
                .await
                .unwrap();
        }
        drain(&mut rx);

        let (late_conn, mut late_rx) = f.hub.connect(chat_user(f.arbiter, "wasit"));
        f.hub
            .join(late_conn, invoice, RoomKind::Transaction)
            .await
            .unwrap();
        let events = drain(&mut late_rx);
        let Some(ServerEvent::History { messages, .. }) =
            events.iter().find(|e| matches!(e, ServerEvent::History { .. }))
        else {
            panic!("no history event");
        };
        assert_eq!(messages.len(), 50);
        assert_eq!(messages[0].body, "msg 10");
        assert_eq!(messages[49].body, "msg 59");
    }

    #[tokio::test]
    async fn buyer_may_read_but_not_post_in_arbitrase() {
        let f = fixture();
        let invoice = Invoice::from("INV-1-CC");

        let (conn, _rx) = f.hub.connect(chat_user(f.buyer, "budi"));
        f.hub
            .join(conn, invoice.clone(), RoomKind::Arbitrase)
            .await
            .unwrap();

        let err = f
            .hub
            .send(
                conn,
                invoice,
                RoomKind::Arbitrase,
                Some("keberatan".into()),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChatError::Escrow(EscrowError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn arbiter_posts_in_arbitrase() {
        let f = fixture();
        let invoice = Invoice::from("INV-1-DD");

        let (arb_conn, mut arb_rx) = f.hub.connect(chat_user(f.arbiter, "wasit"));
        f.hub
            .join(arb_conn, invoice.clone(), RoomKind::Arbitrase)
            .await
            .unwrap();
        f.hub
            .send(
                arb_conn,
                invoice,
                RoomKind::Arbitrase,
                Some("putusan".into()),
                None,
            )
            .await
            .unwrap();
        let events = drain(&mut arb_rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::Message { .. })));
    }

    #[tokio::test]
    async fn stranger_may_not_join() {
        let f = fixture();
        let (conn, _rx) = f.hub.connect(chat_user(f.stranger, "anon"));
        let err = f
            .hub
            .join(conn, Invoice::from("INV-1-EE"), RoomKind::Transaction)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChatError::Escrow(EscrowError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn sending_without_joining_is_rejected() {
        let f = fixture();
        let (conn, _rx) = f.hub.connect(chat_user(f.buyer, "budi"));
        let err = f
            .hub
            .send(
                conn,
                Invoice::from("INV-1-FF"),
                RoomKind::Transaction,
                Some("halo".into()),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::NotInRoom));
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let f = fixture();
        let invoice = Invoice::from("INV-1-GG");
        let (conn, _rx) = f.hub.connect(chat_user(f.buyer, "budi"));
        f.hub
            .join(conn, invoice.clone(), RoomKind::Transaction)
            .await
            .unwrap();
        let err = f
            .hub
            .send(conn, invoice, RoomKind::Transaction, Some("   ".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::EmptyMessage));
    }

    #[tokio::test]
    async fn disconnect_sweeps_memberships() {
        let f = fixture();
        let invoice = Invoice::from("INV-1-HH");

        let (a, mut a_rx) = f.hub.connect(chat_user(f.buyer, "budi"));
        let (b, _b_rx) = f.hub.connect(chat_user(f.merchant, "toko"));
        f.hub
            .join(a, invoice.clone(), RoomKind::Transaction)
            .await
            .unwrap();
        f.hub
            .join(b, invoice.clone(), RoomKind::Transaction)
            .await
            .unwrap();
        drain(&mut a_rx);

        f.hub.disconnect(b);
        let events = drain(&mut a_rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::UserLeft { user_id, .. } if *user_id == f.merchant)));

        // Rejoining after disconnect starts from an empty membership
        assert!(!f.hub.is_member(b, &invoice, RoomKind::Transaction));
    }

    #[tokio::test]
    async fn system_broadcast_reaches_live_members() {
        let f = fixture();
        let invoice = Invoice::from("INV-1-II");

        let (conn, mut rx) = f.hub.connect(chat_user(f.buyer, "budi"));
        f.hub
            .join(conn, invoice.clone(), RoomKind::Arbitrase)
            .await
            .unwrap();
        drain(&mut rx);

        let msg = ChatMessage::system(invoice, RoomKind::Arbitrase, "Dispute opened");
        f.hub.broadcast_system(&msg);

        let events = drain(&mut rx);
        assert!(matches!(
            events.as_slice(),
            [ServerEvent::Message { data }] if data.sender_id.is_none()
        ));
    }
}
