//! Store seam for escrow state
//!
//! Narrow reads plus two atomic mutating units. Implementations must make
//! each mutating unit all-or-nothing and give concurrent callers
//! exactly-one-winner semantics through their own isolation mechanism
//! (a write lock for the in-memory store, row locking for PostgreSQL).

use async_trait::async_trait;

use rekber_types::{
    BuyerAccount, ChatMessage, EscrowTransaction, Invoice, MerchantAccount, MerchantId, Product,
    ProductId, Result, TransactionStatus, UserId, UserRole,
};

use crate::machine::Operation;

/// Filter and page for transaction listings
#[derive(Debug, Clone, Default)]
pub struct TransactionQuery {
    pub status: Option<TransactionStatus>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// What an accepted transition did, as observed inside the atomic unit
#[derive(Debug, Clone)]
pub struct TransitionReceipt {
    /// The transaction after the transition
    pub transaction: EscrowTransaction,
    /// The status the transition moved away from
    pub previous: TransactionStatus,
    /// System message persisted in the same unit, for live broadcast
    pub system_message: Option<ChatMessage>,
}

/// Result of `apply`: exactly one of these per call
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// This call won; all effects are committed
    Applied(TransitionReceipt),
    /// Already in the target or a terminal state; nothing was touched
    AlreadySettled(EscrowTransaction),
    /// Illegal from the current state; nothing was touched
    Rejected { current: TransactionStatus },
}

/// Durable escrow state
#[async_trait]
pub trait EscrowStore: Send + Sync {
    async fn product(&self, id: ProductId) -> Result<Product>;
    async fn buyer(&self, id: UserId) -> Result<BuyerAccount>;
    async fn merchant(&self, id: MerchantId) -> Result<MerchantAccount>;
    async fn transaction(&self, invoice: &Invoice) -> Result<EscrowTransaction>;
    async fn user_role(&self, id: UserId) -> Result<UserRole>;

    /// Transactions the user is a party to: purchases where they are the
    /// buyer, plus sales of a merchant account they own. Newest first.
    async fn list_transactions(
        &self,
        user: UserId,
        query: &TransactionQuery,
    ) -> Result<Vec<EscrowTransaction>>;

    /// Reserve stock and insert the transaction, all or nothing.
    ///
    /// Fails with `OutOfStock` without inserting when the product cannot
    /// cover the quantity.
    async fn insert_transaction(&self, txn: &EscrowTransaction) -> Result<()>;

    /// Run one operation through the transition planner and apply its
    /// effects atomically. Unknown invoice → `NotFound`.
    async fn apply(&self, invoice: &Invoice, op: Operation) -> Result<TransitionOutcome>;
}
