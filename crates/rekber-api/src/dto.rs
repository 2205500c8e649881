//! Request and response bodies

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rekber_types::{
    DisputeDecision, EscrowTransaction, FeeBreakdown, PaymentMethod, TransactionStatus,
};

/// Create-transaction request
#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub product_id: Uuid,
    pub quantity: u32,
    pub payment_method: PaymentMethod,
}

/// Create-transaction response: the escrow contract plus the payment
/// handle the buyer is redirected to
#[derive(Debug, Serialize)]
pub struct CreateTransactionResponse {
    pub invoice: String,
    pub fees: FeeBreakdown,
    pub payment_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Transaction view returned by detail and listing reads
#[derive(Debug, Serialize)]
pub struct TransactionView {
    pub invoice: String,
    pub buyer_id: Uuid,
    pub merchant_id: Uuid,
    pub product_id: Uuid,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub fees: FeeBreakdown,
    pub payment_method: PaymentMethod,
    pub status: TransactionStatus,
    pub due_date: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub external_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<EscrowTransaction> for TransactionView {
    fn from(t: EscrowTransaction) -> Self {
        Self {
            invoice: t.invoice.0,
            buyer_id: t.buyer_id.0,
            merchant_id: t.merchant_id.0,
            product_id: t.product_id.0,
            quantity: t.quantity,
            unit_price: t.unit_price,
            fees: t.fees,
            payment_method: t.payment_method,
            status: t.status,
            due_date: t.due_date,
            completed_at: t.completed_at,
            external_ref: t.external_ref,
            created_at: t.created_at,
        }
    }
}

/// Listing filter, from query parameters
#[derive(Debug, Default, Deserialize)]
pub struct ListTransactionsQuery {
    pub status: Option<TransactionStatus>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: u32,
}

/// Dispute-open request; the invoice comes from the path
#[derive(Debug, Default, Deserialize)]
pub struct OpenDisputeRequest {
    pub reason: Option<String>,
}

/// Arbiter dispute-resolution request
#[derive(Debug, Deserialize)]
pub struct ResolveDisputeRequest {
    pub decision: DisputeDecision,
    pub note: Option<String>,
}
