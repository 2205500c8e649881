//! Rekber Gateway - Payment webhook ingestion
//!
//! The external gateway confirms payments by POSTing a flat callback
//! payload. This crate verifies its authenticity, maps the gateway's
//! result code onto the transaction state machine and applies it through
//! the escrow engine. The handler is safe to invoke any number of times
//! for the same invoice: replays land on the machine's no-op path, so
//! balances and stock move at most once.
//!
//! Signature scheme (fixed by the gateway):
//! `sha256(merchantCode + merchantOrderId + amount + apiKey)` hex,
//! compared case-insensitively.

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use rekber_escrow::{EscrowService, EscrowStore};
use rekber_types::{EscrowError, Invoice, Result};

/// External gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Merchant identifier echoed back in every callback
    pub merchant_code: String,
    /// Shared secret for the callback signature
    pub api_key: String,
    /// Gateway web root, used to build payment handles
    pub base_url: String,
}

impl GatewayConfig {
    /// The payment-initiation handle returned at transaction creation.
    pub fn payment_url(&self, invoice: &Invoice) -> String {
        format!(
            "{}/web/merchant/payment/{}",
            self.base_url.trim_end_matches('/'),
            invoice
        )
    }
}

/// The gateway's flat callback payload
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    pub merchant_code: String,
    /// Amount as the gateway formats it; also a signature input, so the
    /// raw string is kept and parsed separately
    pub amount: String,
    /// The invoice this callback settles
    pub merchant_order_id: String,
    pub result_code: String,
    pub signature: String,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub product_detail: Option<String>,
    #[serde(default)]
    pub additional_param: Option<String>,
    #[serde(default)]
    pub merchant_user_id: Option<String>,
    #[serde(default)]
    pub payment_code: Option<String>,
}

/// Gateway result codes, as a fixed table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackResult {
    Paid,
    Failed,
    Pending,
    Expired,
}

impl CallbackResult {
    /// "00" success, "01" failed, "02" pending, anything else expired.
    pub fn from_code(code: &str) -> Self {
        match code {
            "00" => CallbackResult::Paid,
            "01" => CallbackResult::Failed,
            "02" => CallbackResult::Pending,
            _ => CallbackResult::Expired,
        }
    }
}

/// Fixed acknowledgement returned to the gateway
#[derive(Debug, Clone, Serialize)]
pub struct CallbackAck {
    pub success: bool,
    pub message: String,
}

impl CallbackAck {
    fn processed() -> Self {
        Self {
            success: true,
            message: "Callback processed successfully".into(),
        }
    }
}

/// Compute the callback signature for the given inputs.
pub fn compute_signature(
    merchant_code: &str,
    merchant_order_id: &str,
    amount: &str,
    api_key: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(merchant_code.as_bytes());
    hasher.update(merchant_order_id.as_bytes());
    hasher.update(amount.as_bytes());
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Webhook ingestor: verification plus idempotent dispatch
pub struct WebhookIngestor {
    config: GatewayConfig,
    engine: Arc<EscrowService>,
    store: Arc<dyn EscrowStore>,
}

impl WebhookIngestor {
    pub fn new(
        config: GatewayConfig,
        engine: Arc<EscrowService>,
        store: Arc<dyn EscrowStore>,
    ) -> Self {
        Self {
            config,
            engine,
            store,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Verify and apply one callback.
    ///
    /// Verification order is fixed: merchant code, signature, invoice
    /// lookup, exact amount equality, then the state machine. Nothing is
    /// ever partially applied.
    pub async fn handle(&self, payload: CallbackPayload) -> Result<CallbackAck> {
        if payload.merchant_code != self.config.merchant_code {
            warn!(got = %payload.merchant_code, "callback with wrong merchant code");
            return Err(EscrowError::Validation("invalid merchant code".into()));
        }

        let expected = compute_signature(
            &payload.merchant_code,
            &payload.merchant_order_id,
            &payload.amount,
            &self.config.api_key,
        );
        if !payload.signature.eq_ignore_ascii_case(&expected) {
            warn!(invoice = %payload.merchant_order_id, "callback signature mismatch");
            return Err(EscrowError::InvalidSignature);
        }

        let invoice = Invoice::from(payload.merchant_order_id.clone());
        let txn = self.store.transaction(&invoice).await?;

        let amount = Decimal::from_str(payload.amount.trim())
            .map_err(|_| EscrowError::Validation(format!("unparseable amount: {}", payload.amount)))?;
        if amount != txn.fees.total {
            return Err(EscrowError::AmountMismatch {
                expected: txn.fees.total,
                received: amount,
            });
        }

        let result = CallbackResult::from_code(&payload.result_code);
        info!(invoice = %invoice, code = %payload.result_code, ?result, "payment callback");
        match result {
            CallbackResult::Paid => {
                self.engine.mark_paid(&invoice, payload.reference).await?;
            }
            CallbackResult::Failed => {
                self.engine.mark_failed(&invoice).await?;
            }
            CallbackResult::Expired => {
                self.engine.mark_expired(&invoice).await?;
            }
            // The gateway will follow up with a final code later
            CallbackResult::Pending => {}
        }
        Ok(CallbackAck::processed())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use rekber_chat::{ChatConfig, ChatHub};
    use rekber_escrow::{MemStore, StoreGate, TracingSink};
    use rekber_types::{
        BuyerAccount, MerchantAccount, MerchantId, PaymentMethod, Product, ProductId,
        TransactionStatus, Tier, UserId, UserRole,
    };

    use super::*;

    const API_KEY: &str = "secret-key";

    struct World {
        ingestor: WebhookIngestor,
        store: Arc<MemStore>,
        invoice: Invoice,
        total: Decimal,
        product: ProductId,
    }

    async fn world() -> World {
        let store = Arc::new(MemStore::new());
        let buyer = UserId::new();
        let owner = UserId::new();
        let merchant = MerchantId::new();
        let product = ProductId::new();

        for (id, role) in [(buyer, UserRole::Buyer), (owner, UserRole::Merchant)] {
            store
                .seed_user(BuyerAccount {
                    id,
                    username: id.to_string(),
                    role,
                    tier: Tier::Bronze,
                    total_success_trx: 0,
                    credit_balance: Decimal::ZERO,
                })
                .await;
        }
        store
            .seed_merchant(MerchantAccount {
                id: merchant,
                owner_user_id: owner,
                shop_name: "toko".into(),
                balance: Decimal::ZERO,
                tier: Tier::Bronze,
                total_success_trx: 0,
            })
            .await;
        store
            .seed_product(Product {
                id: product,
                merchant_id: merchant,
                name: "keyboard".into(),
                price: dec!(100000),
                stock: 10,
                active: true,
            })
            .await;

        let escrow: Arc<dyn EscrowStore> = store.clone();
        let hub = Arc::new(ChatHub::new(
            ChatConfig::default(),
            store.clone(),
            Arc::new(StoreGate::new(escrow.clone())),
        ));
        let engine = Arc::new(EscrowService::new(
            escrow.clone(),
            hub,
            Arc::new(TracingSink),
        ));
        let txn = engine
            .create(buyer, product, 2, PaymentMethod::Qris)
            .await
            .unwrap();

        let config = GatewayConfig {
            merchant_code: "DM1234".into(),
            api_key: API_KEY.into(),
            base_url: "https://sandbox.gateway.test".into(),
        };
        World {
            ingestor: WebhookIngestor::new(config, engine, escrow),
            store,
            invoice: txn.invoice,
            total: txn.fees.total,
            product,
        }
    }

    fn signed_payload(w: &World, result_code: &str) -> CallbackPayload {
        let amount = w.total.to_string();
        let signature = compute_signature("DM1234", w.invoice.as_str(), &amount, API_KEY);
        CallbackPayload {
            merchant_code: "DM1234".into(),
            amount,
            merchant_order_id: w.invoice.as_str().to_string(),
            result_code: result_code.into(),
            signature,
            payment_method: Some("VC".into()),
            reference: Some("D0001".into()),
            product_detail: None,
            additional_param: None,
            merchant_user_id: None,
            payment_code: None,
        }
    }

    #[tokio::test]
    async fn success_code_marks_paid_with_reference() {
        let w = world().await;
        let ack = w.ingestor.handle(signed_payload(&w, "00")).await.unwrap();
        assert!(ack.success);

        let txn = w.store.transaction(&w.invoice).await.unwrap();
        assert_eq!(txn.status, TransactionStatus::Paid);
        assert_eq!(txn.external_ref.as_deref(), Some("D0001"));
    }

    #[tokio::test]
    async fn replayed_callback_is_acknowledged_without_reapplying() {
        let w = world().await;
        w.ingestor.handle(signed_payload(&w, "00")).await.unwrap();
        let ack = w.ingestor.handle(signed_payload(&w, "00")).await.unwrap();
        assert!(ack.success);
        let txn = w.store.transaction(&w.invoice).await.unwrap();
        assert_eq!(txn.status, TransactionStatus::Paid);
    }

    #[tokio::test]
    async fn uppercase_signature_is_accepted() {
        let w = world().await;
        let mut payload = signed_payload(&w, "00");
        payload.signature = payload.signature.to_uppercase();
        assert!(w.ingestor.handle(payload).await.is_ok());
    }

    #[tokio::test]
    async fn tampered_signature_is_rejected() {
        let w = world().await;
        let mut payload = signed_payload(&w, "00");
        payload.signature = compute_signature("DM1234", w.invoice.as_str(), "1", API_KEY);
        let err = w.ingestor.handle(payload).await.unwrap_err();
        assert!(matches!(err, EscrowError::InvalidSignature));
        let txn = w.store.transaction(&w.invoice).await.unwrap();
        assert_eq!(txn.status, TransactionStatus::Unpaid);
    }

    #[tokio::test]
    async fn wrong_merchant_code_is_rejected() {
        let w = world().await;
        let mut payload = signed_payload(&w, "00");
        payload.merchant_code = "DM9999".into();
        assert!(matches!(
            w.ingestor.handle(payload).await.unwrap_err(),
            EscrowError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn partial_amount_is_never_applied() {
        let w = world().await;
        let amount = (w.total - dec!(1)).to_string();
        let signature = compute_signature("DM1234", w.invoice.as_str(), &amount, API_KEY);
        let mut payload = signed_payload(&w, "00");
        payload.amount = amount;
        payload.signature = signature;

        let err = w.ingestor.handle(payload).await.unwrap_err();
        assert!(matches!(err, EscrowError::AmountMismatch { .. }));
        let txn = w.store.transaction(&w.invoice).await.unwrap();
        assert_eq!(txn.status, TransactionStatus::Unpaid);
    }

    #[tokio::test]
    async fn pending_acknowledges_without_transition() {
        let w = world().await;
        let ack = w.ingestor.handle(signed_payload(&w, "02")).await.unwrap();
        assert!(ack.success);
        let txn = w.store.transaction(&w.invoice).await.unwrap();
        assert_eq!(txn.status, TransactionStatus::Unpaid);
    }

    #[tokio::test]
    async fn unknown_code_expires_and_restores_stock() {
        let w = world().await;
        assert_eq!(w.store.product(w.product).await.unwrap().stock, 8);
        w.ingestor.handle(signed_payload(&w, "XX")).await.unwrap();
        let txn = w.store.transaction(&w.invoice).await.unwrap();
        assert_eq!(txn.status, TransactionStatus::Expired);
        assert_eq!(w.store.product(w.product).await.unwrap().stock, 10);
    }

    #[tokio::test]
    async fn unknown_invoice_is_not_found() {
        let w = world().await;
        let order_id = "INV-0-DEADBEEF";
        let amount = w.total.to_string();
        let signature = compute_signature("DM1234", order_id, &amount, API_KEY);
        let mut payload = signed_payload(&w, "00");
        payload.merchant_order_id = order_id.into();
        payload.amount = amount;
        payload.signature = signature;
        assert!(matches!(
            w.ingestor.handle(payload).await.unwrap_err(),
            EscrowError::NotFound(_)
        ));
    }

    #[test]
    fn payment_url_joins_cleanly() {
        let config = GatewayConfig {
            merchant_code: "DM1234".into(),
            api_key: "k".into(),
            base_url: "https://sandbox.gateway.test/".into(),
        };
        let url = config.payment_url(&Invoice::from("INV-1-AB"));
        assert_eq!(
            url,
            "https://sandbox.gateway.test/web/merchant/payment/INV-1-AB"
        );
    }

    #[test]
    fn result_code_table() {
        assert_eq!(CallbackResult::from_code("00"), CallbackResult::Paid);
        assert_eq!(CallbackResult::from_code("01"), CallbackResult::Failed);
        assert_eq!(CallbackResult::from_code("02"), CallbackResult::Pending);
        assert_eq!(CallbackResult::from_code("99"), CallbackResult::Expired);
        assert_eq!(CallbackResult::from_code(""), CallbackResult::Expired);
    }
}
