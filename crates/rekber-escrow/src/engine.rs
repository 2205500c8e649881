//! Escrow service
//!
//! Orchestrates the store's atomic units and runs the after-commit
//! side effects (notifications, live chat broadcast). Everything financial
//! happens inside the store; everything here that runs after the commit is
//! best-effort and never rolls a transition back.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use rekber_chat::ChatHub;
use rekber_types::{
    DisputeDecision, EscrowError, EscrowTransaction, Invoice, PaymentMethod, ProductId, Result,
    TransactionStatus, UserId, UserRole,
};

use crate::machine::{Operation, PaymentOutcome};
use crate::notify::NotificationSink;
use crate::store::{EscrowStore, TransactionQuery, TransitionOutcome, TransitionReceipt};

/// Payment window granted at creation
const PAYMENT_WINDOW_HOURS: i64 = 24;

/// The escrow transaction engine
pub struct EscrowService {
    store: Arc<dyn EscrowStore>,
    hub: Arc<ChatHub>,
    notifier: Arc<dyn NotificationSink>,
}

impl EscrowService {
    pub fn new(
        store: Arc<dyn EscrowStore>,
        hub: Arc<ChatHub>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            hub,
            notifier,
        }
    }

    /// Create a transaction: reserve stock, snapshot the price, compute
    /// fees, persist in UNPAID with a 24 hour payment window.
    pub async fn create(
        &self,
        buyer_id: UserId,
        product_id: ProductId,
        quantity: u32,
        payment_method: PaymentMethod,
    ) -> Result<EscrowTransaction> {
        if quantity == 0 {
            return Err(EscrowError::Validation(
                "quantity must be at least 1".into(),
            ));
        }

        let product = self.store.product(product_id).await?;
        if !product.active {
            return Err(EscrowError::Validation("product is not active".into()));
        }
        let merchant = self.store.merchant(product.merchant_id).await?;
        if merchant.owner_user_id == buyer_id {
            return Err(EscrowError::Validation(
                "cannot buy your own product".into(),
            ));
        }
        let buyer = self.store.buyer(buyer_id).await?;

        let fees = rekber_fees::quote(product.price, quantity, buyer.tier);
        let now = Utc::now();
        let txn = EscrowTransaction {
            invoice: Invoice::generate(),
            buyer_id,
            merchant_id: product.merchant_id,
            product_id,
            quantity,
            unit_price: product.price,
            fees,
            payment_method,
            status: TransactionStatus::Unpaid,
            due_date: now + Duration::hours(PAYMENT_WINDOW_HOURS),
            completed_at: None,
            external_ref: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_transaction(&txn).await?;
        info!(invoice = %txn.invoice, buyer = %buyer_id, total = %txn.fees.total, "transaction created");

        self.notify_one(
            merchant.owner_user_id,
            format!(
                "New order {}: {} x{} ({})",
                txn.invoice, product.name, quantity, txn.fees.total
            ),
        )
        .await;
        Ok(txn)
    }

    /// Gateway-confirmed payment. Idempotent: a replay returns the settled
    /// transaction without re-applying anything.
    pub async fn mark_paid(
        &self,
        invoice: &Invoice,
        external_ref: Option<String>,
    ) -> Result<EscrowTransaction> {
        self.settle(invoice, PaymentOutcome::Paid, external_ref).await
    }

    /// Gateway-reported payment failure; restores the reserved stock.
    pub async fn mark_failed(&self, invoice: &Invoice) -> Result<EscrowTransaction> {
        self.settle(invoice, PaymentOutcome::Failed, None).await
    }

    /// Payment window elapsed; restores the reserved stock.
    pub async fn mark_expired(&self, invoice: &Invoice) -> Result<EscrowTransaction> {
        self.settle(invoice, PaymentOutcome::Expired, None).await
    }

    async fn settle(
        &self,
        invoice: &Invoice,
        outcome: PaymentOutcome,
        external_ref: Option<String>,
    ) -> Result<EscrowTransaction> {
        let result = self
            .store
            .apply(
                invoice,
                Operation::Payment {
                    outcome,
                    external_ref,
                },
            )
            .await?;
        match result {
            TransitionOutcome::Applied(receipt) => {
                info!(invoice = %invoice, status = %receipt.transaction.status, "payment settled");
                let text = match outcome {
                    PaymentOutcome::Paid => format!("Payment received for {invoice}"),
                    PaymentOutcome::Failed => format!("Payment failed for {invoice}"),
                    PaymentOutcome::Expired => format!("Payment window expired for {invoice}"),
                };
                self.after_commit(&receipt, &text).await;
                Ok(receipt.transaction)
            }
            TransitionOutcome::AlreadySettled(txn) => Ok(txn),
            TransitionOutcome::Rejected { current } => Err(EscrowError::InvalidTransition {
                from: current,
                to: outcome.target(),
            }),
        }
    }

    /// Release escrowed funds to the merchant. Legal callers: the buyer,
    /// the merchant's owning user, or an arbiter.
    pub async fn complete(&self, invoice: &Invoice, caller: UserId) -> Result<EscrowTransaction> {
        let txn = self.store.transaction(invoice).await?;
        self.require_party_or_arbiter(&txn, caller).await?;

        match self.store.apply(invoice, Operation::Complete).await? {
            TransitionOutcome::Applied(receipt) => {
                info!(invoice = %invoice, caller = %caller, "transaction completed");
                self.after_commit(&receipt, &format!("Transaction {invoice} completed"))
                    .await;
                Ok(receipt.transaction)
            }
            TransitionOutcome::AlreadySettled(txn) => {
                Err(EscrowError::InvalidState { current: txn.status })
            }
            TransitionOutcome::Rejected { current } => {
                Err(EscrowError::InvalidState { current })
            }
        }
    }

    /// Buyer opens a dispute; the arbitration room gets its announcement
    /// message inside the same atomic unit.
    pub async fn request_dispute(
        &self,
        invoice: &Invoice,
        caller: UserId,
        reason: Option<String>,
    ) -> Result<EscrowTransaction> {
        let txn = self.store.transaction(invoice).await?;
        if txn.buyer_id != caller {
            return Err(EscrowError::Unauthorized);
        }

        match self
            .store
            .apply(invoice, Operation::OpenDispute { reason })
            .await?
        {
            TransitionOutcome::Applied(receipt) => {
                info!(invoice = %invoice, "dispute opened");
                self.after_commit(&receipt, &format!("Dispute opened for {invoice}"))
                    .await;
                Ok(receipt.transaction)
            }
            TransitionOutcome::AlreadySettled(txn) => {
                Err(EscrowError::InvalidState { current: txn.status })
            }
            TransitionOutcome::Rejected { current } => {
                Err(EscrowError::InvalidState { current })
            }
        }
    }

    /// Apply an arbiter's binding decision to an open dispute.
    pub async fn resolve_dispute(
        &self,
        invoice: &Invoice,
        caller: UserId,
        decision: DisputeDecision,
        note: Option<String>,
    ) -> Result<EscrowTransaction> {
        if self.store.user_role(caller).await? != UserRole::Arbiter {
            return Err(EscrowError::Unauthorized);
        }

        match self
            .store
            .apply(invoice, Operation::Resolve { decision, note })
            .await?
        {
            TransitionOutcome::Applied(receipt) => {
                info!(invoice = %invoice, decision = decision.as_str(), "dispute resolved");
                self.after_commit(
                    &receipt,
                    &format!("Dispute for {invoice} resolved: {}", decision.as_str()),
                )
                .await;
                Ok(receipt.transaction)
            }
            TransitionOutcome::AlreadySettled(txn) => {
                Err(EscrowError::InvalidState { current: txn.status })
            }
            TransitionOutcome::Rejected { current } => {
                Err(EscrowError::InvalidState { current })
            }
        }
    }

    /// Transaction detail, readable by its parties and arbiters.
    pub async fn detail(&self, invoice: &Invoice, caller: UserId) -> Result<EscrowTransaction> {
        let txn = self.store.transaction(invoice).await?;
        self.require_party_or_arbiter(&txn, caller).await?;
        Ok(txn)
    }

    /// A user's transactions: purchases plus sales of an owned merchant.
    pub async fn list(
        &self,
        user: UserId,
        query: &TransactionQuery,
    ) -> Result<Vec<EscrowTransaction>> {
        self.store.list_transactions(user, query).await
    }

    async fn require_party_or_arbiter(
        &self,
        txn: &EscrowTransaction,
        caller: UserId,
    ) -> Result<()> {
        if txn.buyer_id == caller {
            return Ok(());
        }
        let merchant = self.store.merchant(txn.merchant_id).await?;
        if merchant.owner_user_id == caller {
            return Ok(());
        }
        if self.store.user_role(caller).await? == UserRole::Arbiter {
            return Ok(());
        }
        Err(EscrowError::Unauthorized)
    }

    /// After-commit side effects: live broadcast of the persisted system
    /// message and party notifications. Failures are logged only.
    async fn after_commit(&self, receipt: &TransitionReceipt, text: &str) {
        if let Some(msg) = &receipt.system_message {
            self.hub.broadcast_system(msg);
        }
        let txn = &receipt.transaction;
        self.notify_one(txn.buyer_id, text.to_string()).await;
        match self.store.merchant(txn.merchant_id).await {
            Ok(merchant) => {
                self.notify_one(merchant.owner_user_id, text.to_string())
                    .await
            }
            Err(err) => warn!(invoice = %txn.invoice, error = %err, "merchant lookup for notification failed"),
        }
    }

    async fn notify_one(&self, user: UserId, text: String) {
        if let Err(err) = self.notifier.notify(user, &text).await {
            warn!(user = %user, error = %err, "notification delivery failed");
        }
    }
}
