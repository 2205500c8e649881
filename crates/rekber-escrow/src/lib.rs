//! Rekber Escrow - Transaction state machine and dispute engine
//!
//! The heart of the platform. Transition legality lives in one pure
//! planner ([`machine::plan`]); every store implementation runs it inside
//! its own atomic unit, so two callers racing the same transaction get
//! exactly one winner and balances move at most once.
//!
//! Layering:
//!
//! - [`machine`] - pure transition planner, no I/O
//! - [`EscrowStore`] - the durable seam (in-memory here, PostgreSQL in
//!   `rekber-db`)
//! - [`EscrowService`] - orchestration, authorization, after-commit
//!   notifications and chat broadcast
//! - [`StoreGate`] - chat-room authorization re-checked against the store

pub mod machine;

mod engine;
mod gate;
mod mem;
mod notify;
mod store;

pub use engine::EscrowService;
pub use gate::StoreGate;
pub use mem::MemStore;
pub use notify::{NotificationSink, TracingSink};
pub use store::{
    EscrowStore, TransactionQuery, TransitionOutcome, TransitionReceipt,
};
