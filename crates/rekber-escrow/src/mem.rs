//! In-memory store
//!
//! One `tokio::sync::RwLock` over the whole state; every mutating unit
//! takes the write lock for its full duration, which is exactly the
//! one-winner isolation the transition planner relies on. Used by tests
//! and the server's dev mode.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use rekber_chat::MessageStore;
use rekber_types::{
    BuyerAccount, ChatMessage, EscrowError, EscrowTransaction, Invoice, MerchantAccount,
    MerchantId, Product, ProductId, Result, RoomKind, Tier, UserId, UserRole,
};

use crate::machine::{plan, Operation, Plan};
use crate::store::{EscrowStore, TransactionQuery, TransitionOutcome, TransitionReceipt};

#[derive(Default)]
struct State {
    products: HashMap<ProductId, Product>,
    users: HashMap<UserId, BuyerAccount>,
    merchants: HashMap<MerchantId, MerchantAccount>,
    transactions: HashMap<Invoice, EscrowTransaction>,
    messages: Vec<ChatMessage>,
}

/// In-memory implementation of the escrow and message stores
#[derive(Default)]
pub struct MemStore {
    state: RwLock<State>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_product(&self, product: Product) {
        self.state.write().await.products.insert(product.id, product);
    }

    pub async fn seed_user(&self, user: BuyerAccount) {
        self.state.write().await.users.insert(user.id, user);
    }

    pub async fn seed_merchant(&self, merchant: MerchantAccount) {
        self.state
            .write()
            .await
            .merchants
            .insert(merchant.id, merchant);
    }
}

#[async_trait]
impl EscrowStore for MemStore {
    async fn product(&self, id: ProductId) -> Result<Product> {
        self.state
            .read()
            .await
            .products
            .get(&id)
            .cloned()
            .ok_or_else(|| EscrowError::NotFound(format!("product {id}")))
    }

    async fn buyer(&self, id: UserId) -> Result<BuyerAccount> {
        self.state
            .read()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| EscrowError::NotFound(format!("user {id}")))
    }

    async fn merchant(&self, id: MerchantId) -> Result<MerchantAccount> {
        self.state
            .read()
            .await
            .merchants
            .get(&id)
            .cloned()
            .ok_or_else(|| EscrowError::NotFound(format!("merchant {id}")))
    }

    async fn transaction(&self, invoice: &Invoice) -> Result<EscrowTransaction> {
        self.state
            .read()
            .await
            .transactions
            .get(invoice)
            .cloned()
            .ok_or_else(|| EscrowError::NotFound(format!("transaction {invoice}")))
    }

    async fn user_role(&self, id: UserId) -> Result<UserRole> {
        self.buyer(id).await.map(|u| u.role)
    }

    async fn list_transactions(
        &self,
        user: UserId,
        query: &TransactionQuery,
    ) -> Result<Vec<EscrowTransaction>> {
        let state = self.state.read().await;
        let owned_merchants: Vec<MerchantId> = state
            .merchants
            .values()
            .filter(|m| m.owner_user_id == user)
            .map(|m| m.id)
            .collect();

        let mut matching: Vec<EscrowTransaction> = state
            .transactions
            .values()
            .filter(|t| t.buyer_id == user || owned_merchants.contains(&t.merchant_id))
            .filter(|t| query.status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let offset = query.offset as usize;
        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn insert_transaction(&self, txn: &EscrowTransaction) -> Result<()> {
        let mut state = self.state.write().await;
        let product = state
            .products
            .get_mut(&txn.product_id)
            .ok_or_else(|| EscrowError::NotFound(format!("product {}", txn.product_id)))?;
        if product.stock < txn.quantity {
            return Err(EscrowError::OutOfStock {
                available: product.stock,
                requested: txn.quantity,
            });
        }
        product.stock -= txn.quantity;
        state.transactions.insert(txn.invoice.clone(), txn.clone());
        Ok(())
    }

    async fn apply(&self, invoice: &Invoice, op: Operation) -> Result<TransitionOutcome> {
        let mut state = self.state.write().await;
        let mut txn = state
            .transactions
            .get(invoice)
            .cloned()
            .ok_or_else(|| EscrowError::NotFound(format!("transaction {invoice}")))?;

        let effects = match plan(txn.status, &op) {
            Plan::Noop => return Ok(TransitionOutcome::AlreadySettled(txn)),
            Plan::Rejected => {
                return Ok(TransitionOutcome::Rejected {
                    current: txn.status,
                })
            }
            Plan::Apply(effects) => effects,
        };

        let previous = txn.status;
        let now = Utc::now();
        txn.status = effects.new_status;
        txn.updated_at = now;
        if effects.set_completed_at {
            txn.completed_at = Some(now);
        }
        if let Some(reference) = effects.external_ref {
            if txn.external_ref.is_none() {
                txn.external_ref = Some(reference);
            }
        }
        if effects.restore_stock {
            if let Some(product) = state.products.get_mut(&txn.product_id) {
                product.stock += txn.quantity;
            }
        }
        if effects.credit_merchant_net {
            let merchant = state
                .merchants
                .get_mut(&txn.merchant_id)
                .ok_or_else(|| EscrowError::Store("merchant row missing".into()))?;
            merchant.balance += txn.fees.net_to_merchant;
        }
        if effects.credit_buyer_total {
            let buyer = state
                .users
                .get_mut(&txn.buyer_id)
                .ok_or_else(|| EscrowError::Store("buyer row missing".into()))?;
            buyer.credit_balance += txn.fees.total;
        }
        if effects.record_success {
            if let Some(buyer) = state.users.get_mut(&txn.buyer_id) {
                buyer.total_success_trx += 1;
                buyer.tier = Tier::from_success_count(buyer.total_success_trx);
            }
            if let Some(merchant) = state.merchants.get_mut(&txn.merchant_id) {
                merchant.total_success_trx += 1;
                merchant.tier = Tier::from_success_count(merchant.total_success_trx);
            }
        }
        let system_message = effects.system_message.map(|body| {
            let msg = ChatMessage::system(invoice.clone(), RoomKind::Arbitrase, body);
            state.messages.push(msg.clone());
            msg
        });
        state.transactions.insert(invoice.clone(), txn.clone());

        Ok(TransitionOutcome::Applied(TransitionReceipt {
            transaction: txn,
            previous,
            system_message,
        }))
    }
}

#[async_trait]
impl MessageStore for MemStore {
    async fn append(&self, msg: &ChatMessage) -> Result<()> {
        self.state.write().await.messages.push(msg.clone());
        Ok(())
    }

    async fn history(
        &self,
        room_id: &Invoice,
        kind: RoomKind,
        limit: usize,
    ) -> Result<Vec<ChatMessage>> {
        let state = self.state.read().await;
        let matching: Vec<ChatMessage> = state
            .messages
            .iter()
            .filter(|m| &m.room_id == room_id && m.room_kind == kind)
            .cloned()
            .collect();
        let skip = matching.len().saturating_sub(limit);
        Ok(matching.into_iter().skip(skip).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use rekber_types::PaymentMethod;

    use super::*;
    use crate::machine::PaymentOutcome;

    async fn store_with_fixture() -> (Arc<MemStore>, EscrowTransaction) {
        let store = Arc::new(MemStore::new());
        let buyer_id = UserId::new();
        let owner_id = UserId::new();
        let merchant_id = MerchantId::new();
        let product_id = ProductId::new();

        store
            .seed_user(BuyerAccount {
                id: buyer_id,
                username: "budi".into(),
                role: UserRole::Buyer,
                tier: Tier::Bronze,
                total_success_trx: 9,
                credit_balance: Decimal::ZERO,
            })
            .await;
        store
            .seed_merchant(MerchantAccount {
                id: merchant_id,
                owner_user_id: owner_id,
                shop_name: "toko".into(),
                balance: Decimal::ZERO,
                tier: Tier::Bronze,
                total_success_trx: 0,
            })
            .await;
        store
            .seed_product(Product {
                id: product_id,
                merchant_id,
                name: "keyboard".into(),
                price: dec!(100000),
                stock: 5,
                active: true,
            })
            .await;

        let fees = rekber_fees::quote(dec!(100000), 2, Tier::Bronze);
        let now = Utc::now();
        let txn = EscrowTransaction {
            invoice: Invoice::generate(),
            buyer_id,
            merchant_id,
            product_id,
            quantity: 2,
            unit_price: dec!(100000),
            fees,
            payment_method: PaymentMethod::Qris,
            status: rekber_types::TransactionStatus::Unpaid,
            due_date: now + chrono::Duration::hours(24),
            completed_at: None,
            external_ref: None,
            created_at: now,
            updated_at: now,
        };
        store.insert_transaction(&txn).await.unwrap();
        (store, txn)
    }

    #[tokio::test]
    async fn insert_reserves_stock() {
        let (store, txn) = store_with_fixture().await;
        let product = store.product(txn.product_id).await.unwrap();
        assert_eq!(product.stock, 3);
    }

    #[tokio::test]
    async fn insufficient_stock_rejects_without_insert() {
        let (store, txn) = store_with_fixture().await;
        let mut big = txn.clone();
        big.invoice = Invoice::generate();
        big.quantity = 10;
        let err = store.insert_transaction(&big).await.unwrap_err();
        assert!(matches!(
            err,
            EscrowError::OutOfStock { available: 3, requested: 10 }
        ));
        assert!(store.transaction(&big.invoice).await.is_err());
        assert_eq!(store.product(txn.product_id).await.unwrap().stock, 3);
    }

    #[tokio::test]
    async fn failed_payment_restores_stock() {
        let (store, txn) = store_with_fixture().await;
        let outcome = store
            .apply(
                &txn.invoice,
                Operation::Payment {
                    outcome: PaymentOutcome::Failed,
                    external_ref: None,
                },
            )
            .await
            .unwrap();
        assert!(matches!(outcome, TransitionOutcome::Applied(_)));
        assert_eq!(store.product(txn.product_id).await.unwrap().stock, 5);
    }

    #[tokio::test]
    async fn complete_credits_merchant_and_bumps_tier() {
        let (store, txn) = store_with_fixture().await;
        store
            .apply(
                &txn.invoice,
                Operation::Payment {
                    outcome: PaymentOutcome::Paid,
                    external_ref: Some("D1".into()),
                },
            )
            .await
            .unwrap();
        let outcome = store.apply(&txn.invoice, Operation::Complete).await.unwrap();
        let TransitionOutcome::Applied(receipt) = outcome else {
            panic!("expected applied");
        };
        assert_eq!(
            receipt.transaction.status,
            rekber_types::TransactionStatus::Completed
        );
        assert!(receipt.transaction.completed_at.is_some());

        let merchant = store.merchant(txn.merchant_id).await.unwrap();
        assert_eq!(merchant.balance, txn.fees.net_to_merchant);
        assert_eq!(merchant.total_success_trx, 1);

        // Tenth success crosses the silver threshold
        let buyer = store.buyer(txn.buyer_id).await.unwrap();
        assert_eq!(buyer.total_success_trx, 10);
        assert_eq!(buyer.tier, Tier::Silver);
    }

    #[tokio::test]
    async fn concurrent_completes_have_one_winner() {
        let (store, txn) = store_with_fixture().await;
        store
            .apply(
                &txn.invoice,
                Operation::Payment {
                    outcome: PaymentOutcome::Paid,
                    external_ref: None,
                },
            )
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            {
                let store = store.clone();
                let invoice = txn.invoice.clone();
                async move { store.apply(&invoice, Operation::Complete).await.unwrap() }
            },
            {
                let store = store.clone();
                let invoice = txn.invoice.clone();
                async move { store.apply(&invoice, Operation::Complete).await.unwrap() }
            }
        );

        let applied = [&a, &b]
            .iter()
            .filter(|o| matches!(o, TransitionOutcome::Applied(_)))
            .count();
        assert_eq!(applied, 1);
        // The merchant was credited exactly once
        let merchant = store.merchant(txn.merchant_id).await.unwrap();
        assert_eq!(merchant.balance, txn.fees.net_to_merchant);
    }

    #[tokio::test]
    async fn refund_credits_buyer_total() {
        let (store, txn) = store_with_fixture().await;
        store
            .apply(
                &txn.invoice,
                Operation::Payment {
                    outcome: PaymentOutcome::Paid,
                    external_ref: None,
                },
            )
            .await
            .unwrap();
        store
            .apply(
                &txn.invoice,
                Operation::OpenDispute {
                    reason: Some("rusak".into()),
                },
            )
            .await
            .unwrap();
        let outcome = store
            .apply(
                &txn.invoice,
                Operation::Resolve {
                    decision: rekber_types::DisputeDecision::Refund,
                    note: None,
                },
            )
            .await
            .unwrap();
        assert!(matches!(outcome, TransitionOutcome::Applied(_)));

        let buyer = store.buyer(txn.buyer_id).await.unwrap();
        assert_eq!(buyer.credit_balance, txn.fees.total);
        // The merchant saw nothing
        let merchant = store.merchant(txn.merchant_id).await.unwrap();
        assert_eq!(merchant.balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn dispute_messages_land_in_arbitrase_history() {
        let (store, txn) = store_with_fixture().await;
        store
            .apply(
                &txn.invoice,
                Operation::Payment {
                    outcome: PaymentOutcome::Paid,
                    external_ref: None,
                },
            )
            .await
            .unwrap();
        store
            .apply(&txn.invoice, Operation::OpenDispute { reason: None })
            .await
            .unwrap();

        let history = store
            .history(&txn.invoice, RoomKind::Arbitrase, 50)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].body, "Dispute opened");
        assert!(history[0].sender_id.is_none());
    }
}
