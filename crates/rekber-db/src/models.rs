//! Row types and their domain conversions
//!
//! Rows mirror the tables one-to-one; enum columns are TEXT and parsed on
//! the way out. A status string the domain does not know is treated as
//! corruption, while tier and role fall back leniently the way the rest of
//! the platform treats them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use rekber_types::{
    BuyerAccount, ChatMessage, EscrowTransaction, FeeBreakdown, Invoice, MerchantAccount,
    MessageKind, PaymentMethod, Product, RoomKind, Tier, TransactionStatus, UserRole,
};

use crate::error::{DbError, DbResult};

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub role: String,
    pub tier: String,
    pub total_success_trx: i32,
    pub credit_balance: Decimal,
}

impl From<UserRow> for BuyerAccount {
    fn from(r: UserRow) -> Self {
        BuyerAccount {
            id: r.id.into(),
            username: r.username,
            role: UserRole::parse(&r.role).unwrap_or(UserRole::Buyer),
            tier: Tier::parse_or_bronze(&r.tier),
            total_success_trx: r.total_success_trx.max(0) as u32,
            credit_balance: r.credit_balance,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct MerchantRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub shop_name: String,
    pub balance: Decimal,
    pub tier: String,
    pub total_success_trx: i32,
}

impl From<MerchantRow> for MerchantAccount {
    fn from(r: MerchantRow) -> Self {
        MerchantAccount {
            id: r.id.into(),
            owner_user_id: r.user_id.into(),
            shop_name: r.shop_name,
            balance: r.balance,
            tier: Tier::parse_or_bronze(&r.tier),
            total_success_trx: r.total_success_trx.max(0) as u32,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ProductRow {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
    pub active: bool,
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Product {
            id: r.id.into(),
            merchant_id: r.merchant_id.into(),
            name: r.name,
            price: r.price,
            stock: r.stock.max(0) as u32,
            active: r.active,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TransactionRow {
    pub invoice_number: String,
    pub buyer_id: Uuid,
    pub merchant_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub price_per_item: Decimal,
    pub subtotal: Decimal,
    pub platform_fee: Decimal,
    pub tier_discount: Decimal,
    pub gateway_fee: Decimal,
    pub total_amount: Decimal,
    pub amount_net: Decimal,
    pub payment_method: String,
    pub status: String,
    pub due_date: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub gateway_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for EscrowTransaction {
    type Error = DbError;

    fn try_from(r: TransactionRow) -> DbResult<Self> {
        let status = TransactionStatus::parse(&r.status)
            .ok_or_else(|| DbError::Corrupt(format!("transaction status {:?}", r.status)))?;
        let payment_method = PaymentMethod::parse(&r.payment_method).ok_or_else(|| {
            DbError::Corrupt(format!("payment method {:?}", r.payment_method))
        })?;
        Ok(EscrowTransaction {
            invoice: Invoice::from(r.invoice_number),
            buyer_id: r.buyer_id.into(),
            merchant_id: r.merchant_id.into(),
            product_id: r.product_id.into(),
            quantity: r.quantity.max(0) as u32,
            unit_price: r.price_per_item,
            fees: FeeBreakdown {
                subtotal: r.subtotal,
                platform_fee: r.platform_fee,
                tier_discount: r.tier_discount,
                gateway_fee: r.gateway_fee,
                total: r.total_amount,
                net_to_merchant: r.amount_net,
            },
            payment_method,
            status,
            due_date: r.due_date,
            completed_at: r.completed_at,
            external_ref: r.gateway_ref,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ChatMessageRow {
    pub id: Uuid,
    pub room_id: String,
    pub room_kind: String,
    pub sender_id: Option<Uuid>,
    pub body: String,
    pub kind: String,
    pub attachment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ChatMessageRow> for ChatMessage {
    type Error = DbError;

    fn try_from(r: ChatMessageRow) -> DbResult<Self> {
        let room_kind = RoomKind::parse(&r.room_kind)
            .ok_or_else(|| DbError::Corrupt(format!("room kind {:?}", r.room_kind)))?;
        let kind = match r.kind.as_str() {
            "text" => MessageKind::Text,
            "image" => MessageKind::Image,
            "system" => MessageKind::System,
            other => return Err(DbError::Corrupt(format!("message kind {other:?}"))),
        };
        Ok(ChatMessage {
            id: r.id,
            room_id: Invoice::from(r.room_id),
            room_kind,
            sender_id: r.sender_id.map(Into::into),
            body: r.body,
            kind,
            attachment: r.attachment,
            created_at: r.created_at,
        })
    }
}

pub(crate) fn message_kind_str(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Text => "text",
        MessageKind::Image => "image",
        MessageKind::System => "system",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_is_corruption() {
        let row = TransactionRow {
            invoice_number: "INV-1-AB".into(),
            buyer_id: Uuid::new_v4(),
            merchant_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            quantity: 1,
            price_per_item: Decimal::ONE,
            subtotal: Decimal::ONE,
            platform_fee: Decimal::ZERO,
            tier_discount: Decimal::ZERO,
            gateway_fee: Decimal::ZERO,
            total_amount: Decimal::ONE,
            amount_net: Decimal::ONE,
            payment_method: "qris".into(),
            status: "PENDING_REVIEW".into(),
            due_date: Utc::now(),
            completed_at: None,
            gateway_ref: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(matches!(
            EscrowTransaction::try_from(row),
            Err(DbError::Corrupt(_))
        ));
    }

    #[test]
    fn unknown_tier_falls_back_to_bronze() {
        let row = UserRow {
            id: Uuid::new_v4(),
            username: "budi".into(),
            role: "buyer".into(),
            tier: "diamond".into(),
            total_success_trx: 3,
            credit_balance: Decimal::ZERO,
        };
        let account = BuyerAccount::from(row);
        assert_eq!(account.tier, Tier::Bronze);
    }
}
