//! Transaction transition planner
//!
//! The single place where transition legality lives. `plan` is pure: it
//! looks at the current status and the requested operation and answers with
//! the full set of effects to apply, a no-op, or a rejection. Every store
//! implementation runs the planner inside its own atomic unit, so in-memory
//! and PostgreSQL stores cannot drift on what a legal transition is.

use rekber_types::{DisputeDecision, TransactionStatus};

/// A payment settlement reported by the gateway.
///
/// Pending callbacks never reach the planner; the webhook ingestor
/// acknowledges them without a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Paid,
    Failed,
    Expired,
}

impl PaymentOutcome {
    /// The status this outcome drives the transaction to.
    pub fn target(&self) -> TransactionStatus {
        match self {
            PaymentOutcome::Paid => TransactionStatus::Paid,
            PaymentOutcome::Failed => TransactionStatus::Failed,
            PaymentOutcome::Expired => TransactionStatus::Expired,
        }
    }
}

/// A requested mutation of one transaction
#[derive(Debug, Clone)]
pub enum Operation {
    /// Gateway-reported settlement, legal from UNPAID only
    Payment {
        outcome: PaymentOutcome,
        external_ref: Option<String>,
    },
    /// Release escrowed funds to the merchant
    Complete,
    /// Buyer opens a dispute
    OpenDispute { reason: Option<String> },
    /// Arbiter's binding decision on an open dispute
    Resolve {
        decision: DisputeDecision,
        note: Option<String>,
    },
}

/// Everything a store must apply, atomically, for one accepted transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Effects {
    pub new_status: TransactionStatus,
    /// Set the completion timestamp to now
    pub set_completed_at: bool,
    /// Record the gateway payment reference (first write wins)
    pub external_ref: Option<String>,
    /// Return the reserved quantity to the product's stock
    pub restore_stock: bool,
    /// Merchant balance += net_to_merchant
    pub credit_merchant_net: bool,
    /// Buyer credit balance += total
    pub credit_buyer_total: bool,
    /// Bump success counters and recompute both parties' tiers
    pub record_success: bool,
    /// Arbitrase-room system message to persist in the same unit
    pub system_message: Option<String>,
}

impl Effects {
    fn status(new_status: TransactionStatus) -> Self {
        Self {
            new_status,
            set_completed_at: false,
            external_ref: None,
            restore_stock: false,
            credit_merchant_net: false,
            credit_buyer_total: false,
            record_success: false,
            system_message: None,
        }
    }
}

/// The planner's verdict on one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Legal transition; apply every effect or none
    Apply(Effects),
    /// Already in the target or a terminal state; succeed without touching
    /// anything (webhook retry safety)
    Noop,
    /// Illegal from the current state
    Rejected,
}

/// Decide what `op` does to a transaction currently in `current`.
pub fn plan(current: TransactionStatus, op: &Operation) -> Plan {
    match op {
        Operation::Payment {
            outcome,
            external_ref,
        } => {
            if current == outcome.target() || current.is_terminal() {
                return Plan::Noop;
            }
            if current != TransactionStatus::Unpaid {
                return Plan::Rejected;
            }
            let mut effects = Effects::status(outcome.target());
            match outcome {
                PaymentOutcome::Paid => {
                    effects.external_ref = external_ref.clone();
                }
                PaymentOutcome::Failed | PaymentOutcome::Expired => {
                    effects.restore_stock = true;
                }
            }
            Plan::Apply(effects)
        }

        Operation::Complete => {
            if !current.dispute_eligible() {
                return Plan::Rejected;
            }
            let mut effects = Effects::status(TransactionStatus::Completed);
            effects.set_completed_at = true;
            effects.credit_merchant_net = true;
            effects.record_success = true;
            Plan::Apply(effects)
        }

        Operation::OpenDispute { reason } => {
            if !current.dispute_eligible() {
                return Plan::Rejected;
            }
            let mut effects = Effects::status(TransactionStatus::Dispute);
            effects.system_message = Some(match reason {
                Some(r) if !r.trim().is_empty() => format!("Dispute opened: {}", r.trim()),
                _ => "Dispute opened".to_string(),
            });
            Plan::Apply(effects)
        }

        Operation::Resolve { decision, note } => {
            if current != TransactionStatus::Dispute {
                return Plan::Rejected;
            }
            let mut effects = match decision {
                DisputeDecision::Refund => {
                    let mut e = Effects::status(TransactionStatus::Cancelled);
                    e.credit_buyer_total = true;
                    e
                }
                DisputeDecision::Release => {
                    let mut e = Effects::status(TransactionStatus::Completed);
                    e.set_completed_at = true;
                    e.credit_merchant_net = true;
                    e
                }
            };
            let verdict = match decision {
                DisputeDecision::Refund => "Dispute resolved: buyer refunded",
                DisputeDecision::Release => "Dispute resolved: funds released to merchant",
            };
            effects.system_message = Some(match note {
                Some(n) if !n.trim().is_empty() => format!("{} ({})", verdict, n.trim()),
                _ => verdict.to_string(),
            });
            Plan::Apply(effects)
        }
    }
}
