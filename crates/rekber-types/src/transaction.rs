//! Escrow transaction and account types
//!
//! An `EscrowTransaction` is one escrow contract for one product purchase.
//! All monetary fields are fixed at creation time; later catalog price
//! changes never affect them. The status field is only ever mutated through
//! the store's transition function.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::{Invoice, MerchantId, ProductId, UserId};
use crate::status::TransactionStatus;
use crate::tier::Tier;

/// Role of a platform user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Buyer,
    Merchant,
    /// Neutral operator empowered to resolve disputes and post in the
    /// arbitrase room.
    Arbiter,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Buyer => "buyer",
            UserRole::Merchant => "merchant",
            UserRole::Arbiter => "arbiter",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buyer" => Some(UserRole::Buyer),
            "merchant" => Some(UserRole::Merchant),
            "arbiter" => Some(UserRole::Arbiter),
            _ => None,
        }
    }
}

/// Supported payment methods at the external gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Qris,
    VirtualAccount,
    Ewallet,
    Retail,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Qris => "qris",
            PaymentMethod::VirtualAccount => "virtual_account",
            PaymentMethod::Ewallet => "ewallet",
            PaymentMethod::Retail => "retail",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "qris" => Some(PaymentMethod::Qris),
            "virtual_account" => Some(PaymentMethod::VirtualAccount),
            "ewallet" => Some(PaymentMethod::Ewallet),
            "retail" => Some(PaymentMethod::Retail),
            _ => None,
        }
    }
}

/// Monetary breakdown computed once at transaction creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    /// unit price x quantity
    pub subtotal: Decimal,
    /// 2% platform fee on the subtotal
    pub platform_fee: Decimal,
    /// Tier discount on the subtotal
    pub tier_discount: Decimal,
    /// 1.5% payment gateway fee on the subtotal
    pub gateway_fee: Decimal,
    /// Amount charged to the buyer
    pub total: Decimal,
    /// Amount credited to the merchant on completion
    pub net_to_merchant: Decimal,
}

/// One escrow contract for one product purchase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscrowTransaction {
    pub invoice: Invoice,
    pub buyer_id: UserId,
    pub merchant_id: MerchantId,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Price snapshot at purchase time, immutable
    pub unit_price: Decimal,
    pub fees: FeeBreakdown,
    pub payment_method: PaymentMethod,
    pub status: TransactionStatus,
    /// Payment expiry instant
    pub due_date: DateTime<Utc>,
    /// Set once, on entering COMPLETED
    pub completed_at: Option<DateTime<Utc>>,
    /// Gateway payment reference, set once by the webhook
    pub external_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A catalog product, as seen through the narrow catalog read interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub merchant_id: MerchantId,
    pub name: String,
    pub price: Decimal,
    pub stock: u32,
    pub active: bool,
}

/// A buyer's account: role, tier, and spendable credit balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyerAccount {
    pub id: UserId,
    pub username: String,
    pub role: UserRole,
    pub tier: Tier,
    pub total_success_trx: u32,
    /// Spendable credit, increased by dispute refunds
    pub credit_balance: Decimal,
}

/// A merchant account: withdrawable balance and tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantAccount {
    pub id: MerchantId,
    /// The user who owns this merchant account
    pub owner_user_id: UserId,
    pub shop_name: String,
    /// Withdrawable balance, increased by completed transactions
    pub balance: Decimal,
    pub tier: Tier,
    pub total_success_trx: u32,
}

/// An arbiter's binding decision on a dispute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisputeDecision {
    /// Refund the buyer: status -> CANCELLED, buyer credit += total
    Refund,
    /// Release to the merchant: status -> COMPLETED, merchant += net
    Release,
}

impl DisputeDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeDecision::Refund => "refund",
            DisputeDecision::Release => "release",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_method_round_trip() {
        for m in [
            PaymentMethod::Qris,
            PaymentMethod::VirtualAccount,
            PaymentMethod::Ewallet,
            PaymentMethod::Retail,
        ] {
            assert_eq!(PaymentMethod::parse(m.as_str()), Some(m));
        }
        assert_eq!(PaymentMethod::parse("cash"), None);
    }

    #[test]
    fn role_round_trip() {
        assert_eq!(UserRole::parse("arbiter"), Some(UserRole::Arbiter));
        assert_eq!(UserRole::parse("admin"), None);
    }

    #[test]
    fn decision_serializes_lowercase() {
        let json = serde_json::to_string(&DisputeDecision::Refund).unwrap();
        assert_eq!(json, "\"refund\"");
    }
}
