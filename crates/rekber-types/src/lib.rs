//! Rekber Types - Shared domain vocabulary for the escrow platform
//!
//! Foundation crate with zero dependencies on other rekber crates.
//! Everything that more than one layer needs to talk about lives here:
//! identifiers, the transaction state enum, tiers, chat message shapes,
//! and the platform-wide error taxonomy.

pub mod chat;
pub mod error;
pub mod ids;
pub mod status;
pub mod tier;
pub mod transaction;

pub use chat::{ChatMessage, MessageKind, RoomKind};
pub use error::{EscrowError, Result};
pub use ids::{Invoice, MerchantId, ProductId, UserId};
pub use status::TransactionStatus;
pub use tier::Tier;
pub use transaction::{
    BuyerAccount, DisputeDecision, EscrowTransaction, FeeBreakdown, MerchantAccount,
    PaymentMethod, Product, UserRole,
};
