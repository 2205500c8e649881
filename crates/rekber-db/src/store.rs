//! PostgreSQL store
//!
//! Durable implementation of the escrow and message store seams. Every
//! mutating unit is one SQL transaction; the transaction row is taken
//! `FOR UPDATE` before the planner runs, so two callers racing the same
//! invoice serialize on the row lock and exactly one sees the pre-state.
//! Stock and balance updates are guarded statements inside the same
//! transaction; nothing is ever partially applied.

use async_trait::async_trait;
use sqlx::PgPool;

use rekber_chat::MessageStore;
use rekber_escrow::machine::{plan, Operation, Plan};
use rekber_escrow::{EscrowStore, TransactionQuery, TransitionOutcome, TransitionReceipt};
use rekber_types::{
    BuyerAccount, ChatMessage, EscrowError, EscrowTransaction, Invoice, MerchantAccount,
    MerchantId, Product, ProductId, Result, RoomKind, Tier, UserId, UserRole,
};

use crate::error::sqlx_err;
use crate::models::{
    message_kind_str, ChatMessageRow, MerchantRow, ProductRow, TransactionRow, UserRow,
};

const TXN_COLS: &str = "invoice_number, buyer_id, merchant_id, product_id, quantity, \
     price_per_item, subtotal, platform_fee, tier_discount, gateway_fee, total_amount, \
     amount_net, payment_method, status, due_date, completed_at, gateway_ref, \
     created_at, updated_at";

/// PostgreSQL-backed escrow and message store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EscrowStore for PgStore {
    async fn product(&self, id: ProductId) -> Result<Product> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, merchant_id, name, price, stock, active FROM products WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_err)?
        .ok_or_else(|| EscrowError::NotFound(format!("product {id}")))?;
        Ok(row.into())
    }

    async fn buyer(&self, id: UserId) -> Result<BuyerAccount> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, role, tier, total_success_trx, credit_balance \
             FROM users WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_err)?
        .ok_or_else(|| EscrowError::NotFound(format!("user {id}")))?;
        Ok(row.into())
    }

    async fn merchant(&self, id: MerchantId) -> Result<MerchantAccount> {
        let row = sqlx::query_as::<_, MerchantRow>(
            "SELECT id, user_id, shop_name, balance, tier, total_success_trx \
             FROM merchants WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_err)?
        .ok_or_else(|| EscrowError::NotFound(format!("merchant {id}")))?;
        Ok(row.into())
    }

    async fn transaction(&self, invoice: &Invoice) -> Result<EscrowTransaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TXN_COLS} FROM transactions WHERE invoice_number = $1"
        ))
        .bind(invoice.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_err)?
        .ok_or_else(|| EscrowError::NotFound(format!("transaction {invoice}")))?;
        Ok(EscrowTransaction::try_from(row)?)
    }

    async fn user_role(&self, id: UserId) -> Result<UserRole> {
        let (role,): (String,) = sqlx::query_as("SELECT role FROM users WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_err)?
            .ok_or_else(|| EscrowError::NotFound(format!("user {id}")))?;
        Ok(UserRole::parse(&role).unwrap_or(UserRole::Buyer))
    }

    async fn list_transactions(
        &self,
        user: UserId,
        query: &TransactionQuery,
    ) -> Result<Vec<EscrowTransaction>> {
        let status = query.status.map(|s| s.as_str());
        let limit = query.limit.map(i64::from).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TXN_COLS} FROM transactions \
             WHERE (buyer_id = $1 \
                    OR merchant_id IN (SELECT id FROM merchants WHERE user_id = $1)) \
               AND ($2::TEXT IS NULL OR status = $2) \
             ORDER BY created_at DESC \
             LIMIT $3 OFFSET $4"
        ))
        .bind(user.0)
        .bind(status)
        .bind(limit)
        .bind(i64::from(query.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_err)?;

        rows.into_iter()
            .map(|r| EscrowTransaction::try_from(r).map_err(EscrowError::from))
            .collect()
    }

    async fn insert_transaction(&self, txn: &EscrowTransaction) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(sqlx_err)?;

        let reserved = sqlx::query(
            "UPDATE products SET stock = stock - $2 WHERE id = $1 AND stock >= $2",
        )
        .bind(txn.product_id.0)
        .bind(txn.quantity as i32)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_err)?
        .rows_affected();

        if reserved == 0 {
            let stock: Option<(i32,)> =
                sqlx::query_as("SELECT stock FROM products WHERE id = $1")
                    .bind(txn.product_id.0)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(sqlx_err)?;
            return Err(match stock {
                Some((available,)) => EscrowError::OutOfStock {
                    available: available.max(0) as u32,
                    requested: txn.quantity,
                },
                None => EscrowError::NotFound(format!("product {}", txn.product_id)),
            });
        }

        sqlx::query(&format!(
            "INSERT INTO transactions ({TXN_COLS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, \
                     $16, $17, $18, $19)"
        ))
        .bind(txn.invoice.as_str())
        .bind(txn.buyer_id.0)
        .bind(txn.merchant_id.0)
        .bind(txn.product_id.0)
        .bind(txn.quantity as i32)
        .bind(txn.unit_price)
        .bind(txn.fees.subtotal)
        .bind(txn.fees.platform_fee)
        .bind(txn.fees.tier_discount)
        .bind(txn.fees.gateway_fee)
        .bind(txn.fees.total)
        .bind(txn.fees.net_to_merchant)
        .bind(txn.payment_method.as_str())
        .bind(txn.status.as_str())
        .bind(txn.due_date)
        .bind(txn.completed_at)
        .bind(txn.external_ref.as_deref())
        .bind(txn.created_at)
        .bind(txn.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(sqlx_err)?;

        tx.commit().await.map_err(sqlx_err)?;
        Ok(())
    }

    async fn apply(&self, invoice: &Invoice, op: Operation) -> Result<TransitionOutcome> {
        let mut tx = self.pool.begin().await.map_err(sqlx_err)?;

        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TXN_COLS} FROM transactions WHERE invoice_number = $1 FOR UPDATE"
        ))
        .bind(invoice.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(sqlx_err)?
        .ok_or_else(|| EscrowError::NotFound(format!("transaction {invoice}")))?;
        let txn = EscrowTransaction::try_from(row)?;

        let effects = match plan(txn.status, &op) {
            Plan::Noop => {
                tx.rollback().await.map_err(sqlx_err)?;
                return Ok(TransitionOutcome::AlreadySettled(txn));
            }
            Plan::Rejected => {
                tx.rollback().await.map_err(sqlx_err)?;
                return Ok(TransitionOutcome::Rejected {
                    current: txn.status,
                });
            }
            Plan::Apply(effects) => effects,
        };
        let previous = txn.status;

        sqlx::query(
            "UPDATE transactions SET status = $2, updated_at = NOW(), \
                 completed_at = CASE WHEN $3 THEN NOW() ELSE completed_at END, \
                 gateway_ref = COALESCE(gateway_ref, $4) \
             WHERE invoice_number = $1",
        )
        .bind(invoice.as_str())
        .bind(effects.new_status.as_str())
        .bind(effects.set_completed_at)
        .bind(effects.external_ref.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(sqlx_err)?;

        if effects.restore_stock {
            sqlx::query("UPDATE products SET stock = stock + $2 WHERE id = $1")
                .bind(txn.product_id.0)
                .bind(txn.quantity as i32)
                .execute(&mut *tx)
                .await
                .map_err(sqlx_err)?;
        }
        if effects.credit_merchant_net {
            sqlx::query("UPDATE merchants SET balance = balance + $2 WHERE id = $1")
                .bind(txn.merchant_id.0)
                .bind(txn.fees.net_to_merchant)
                .execute(&mut *tx)
                .await
                .map_err(sqlx_err)?;
        }
        if effects.credit_buyer_total {
            sqlx::query("UPDATE users SET credit_balance = credit_balance + $2 WHERE id = $1")
                .bind(txn.buyer_id.0)
                .bind(txn.fees.total)
                .execute(&mut *tx)
                .await
                .map_err(sqlx_err)?;
        }
        if effects.record_success {
            let (buyer_count,): (i32,) = sqlx::query_as(
                "UPDATE users SET total_success_trx = total_success_trx + 1 \
                 WHERE id = $1 RETURNING total_success_trx",
            )
            .bind(txn.buyer_id.0)
            .fetch_one(&mut *tx)
            .await
            .map_err(sqlx_err)?;
            let buyer_tier = Tier::from_success_count(buyer_count.max(0) as u32);
            sqlx::query("UPDATE users SET tier = $2 WHERE id = $1 AND tier <> $2")
                .bind(txn.buyer_id.0)
                .bind(buyer_tier.as_str())
                .execute(&mut *tx)
                .await
                .map_err(sqlx_err)?;

            let (merchant_count,): (i32,) = sqlx::query_as(
                "UPDATE merchants SET total_success_trx = total_success_trx + 1 \
                 WHERE id = $1 RETURNING total_success_trx",
            )
            .bind(txn.merchant_id.0)
            .fetch_one(&mut *tx)
            .await
            .map_err(sqlx_err)?;
            let merchant_tier = Tier::from_success_count(merchant_count.max(0) as u32);
            sqlx::query("UPDATE merchants SET tier = $2 WHERE id = $1 AND tier <> $2")
                .bind(txn.merchant_id.0)
                .bind(merchant_tier.as_str())
                .execute(&mut *tx)
                .await
                .map_err(sqlx_err)?;
        }

        let system_message = match effects.system_message {
            Some(body) => {
                let msg = ChatMessage::system(invoice.clone(), RoomKind::Arbitrase, body);
                insert_message(&mut tx, &msg).await?;
                Some(msg)
            }
            None => None,
        };

        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TXN_COLS} FROM transactions WHERE invoice_number = $1"
        ))
        .bind(invoice.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(sqlx_err)?;
        let transaction = EscrowTransaction::try_from(row)?;

        tx.commit().await.map_err(sqlx_err)?;

        Ok(TransitionOutcome::Applied(TransitionReceipt {
            transaction,
            previous,
            system_message,
        }))
    }
}

async fn insert_message(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    msg: &ChatMessage,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO chat_messages (id, room_id, room_kind, sender_id, body, kind, \
             attachment, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(msg.id)
    .bind(msg.room_id.as_str())
    .bind(msg.room_kind.as_str())
    .bind(msg.sender_id.map(|s| s.0))
    .bind(&msg.body)
    .bind(message_kind_str(msg.kind))
    .bind(msg.attachment.as_deref())
    .bind(msg.created_at)
    .execute(&mut **tx)
    .await
    .map_err(sqlx_err)?;
    Ok(())
}

#[async_trait]
impl MessageStore for PgStore {
    async fn append(&self, msg: &ChatMessage) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(sqlx_err)?;
        insert_message(&mut tx, msg).await?;
        tx.commit().await.map_err(sqlx_err)?;
        Ok(())
    }

    async fn history(
        &self,
        room_id: &Invoice,
        kind: RoomKind,
        limit: usize,
    ) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query_as::<_, ChatMessageRow>(
            "SELECT id, room_id, room_kind, sender_id, body, kind, attachment, created_at \
             FROM chat_messages \
             WHERE room_id = $1 AND room_kind = $2 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3",
        )
        .bind(room_id.as_str())
        .bind(kind.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_err)?;

        let mut messages: Vec<ChatMessage> = rows
            .into_iter()
            .map(|r| ChatMessage::try_from(r).map_err(EscrowError::from))
            .collect::<Result<_>>()?;
        messages.reverse();
        Ok(messages)
    }
}
