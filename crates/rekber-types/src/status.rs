//! Transaction lifecycle states
//!
//! ```text
//! UNPAID ──▶ PAID ──▶ COMPLETED
//!    │         │  ╲
//!    │         │   ▶ DISPUTE ──▶ CANCELLED | COMPLETED
//!    │      SHIPPED ─┘
//!    ├──▶ FAILED
//!    └──▶ EXPIRED
//! ```
//!
//! FAILED, EXPIRED, CANCELLED and COMPLETED are terminal. Once a
//! transaction leaves UNPAID it never returns there.

use serde::{Deserialize, Serialize};

/// Status of an escrow transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    /// Created, waiting for payment (expires at the due date)
    Unpaid,
    /// Payment confirmed by the gateway, funds held in escrow
    Paid,
    /// Goods marked shipped by the merchant.
    ///
    /// Reserved state: nothing currently produces it, but dispute and
    /// completion checks must accept it.
    Shipped,
    /// Buyer opened a dispute, awaiting an arbiter decision
    Dispute,
    /// Funds released to the merchant
    Completed,
    /// Payment failed at the gateway
    Failed,
    /// Payment window elapsed without payment
    Expired,
    /// Refunded to the buyer by an arbiter decision
    Cancelled,
}

impl TransactionStatus {
    /// Check if this is a terminal state (no further transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Expired | Self::Cancelled
        )
    }

    /// Check if a dispute may be opened from this state
    pub fn dispute_eligible(&self) -> bool {
        matches!(self, Self::Paid | Self::Shipped)
    }

    /// Database / wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unpaid => "UNPAID",
            Self::Paid => "PAID",
            Self::Shipped => "SHIPPED",
            Self::Dispute => "DISPUTE",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Parse the database / wire representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNPAID" => Some(Self::Unpaid),
            "PAID" => Some(Self::Paid),
            "SHIPPED" => Some(Self::Shipped),
            "DISPUTE" => Some(Self::Dispute),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "EXPIRED" => Some(Self::Expired),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
