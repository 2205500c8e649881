//! Chat authorization backed by the escrow store
//!
//! Adapts [`EscrowStore`] to the chat crate's `RoomGate` so every
//! privileged chat action re-checks durable facts (role, party of the
//! transaction) instead of trusting the in-memory membership map.

use std::sync::Arc;

use async_trait::async_trait;

use rekber_chat::{RoomAccess, RoomGate};
use rekber_types::{Invoice, Result, UserId, UserRole};

use crate::store::EscrowStore;

/// `RoomGate` over the durable escrow store
pub struct StoreGate {
    store: Arc<dyn EscrowStore>,
}

impl StoreGate {
    pub fn new(store: Arc<dyn EscrowStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RoomGate for StoreGate {
    async fn access(&self, invoice: &Invoice, user: UserId) -> Result<RoomAccess> {
        let txn = self.store.transaction(invoice).await?;
        let role = self.store.user_role(user).await?;
        let merchant = self.store.merchant(txn.merchant_id).await?;
        Ok(RoomAccess {
            role,
            is_buyer: txn.buyer_id == user,
            is_merchant_owner: merchant.owner_user_id == user,
        })
    }
}
