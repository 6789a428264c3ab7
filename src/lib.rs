//! Arena Ledger - coin economy and tournament-entry transaction engine
//!
//! This crate maintains a correct, auditable coin balance per user while users
//! concurrently join and leave capacity-limited tournaments and while
//! asynchronous payment-gateway callbacks complete or fail coin purchases.
//!
//! # Architecture
//!
//! ```text
//!                         ┌────────────────────┐
//!   join / leave ────────►│ EntryCoordinator   │────► TournamentCatalog
//!                         └───────┬────────────┘      (external metadata)
//!                            ┌────┴─────┐
//!                            ▼          ▼
//!                  ┌──────────────┐  ┌──────────────────┐
//!                  │ LedgerStore  │  │ CapacityTracker  │
//!                  │ entries +    │  │ occupancy +      │
//!                  │ balances     │  │ participations   │
//!                  └──────▲───────┘  └──────────────────┘
//!                         │
//!          ┌──────────────┴───┐
//!          │                  │
//! ┌────────┴────────┐  ┌──────┴─────────────┐
//! │ PurchaseService │  │ PaymentReconciler  │◄──── gateway callbacks
//! └────────┬────────┘  └────────────────────┘      (at-least-once)
//!          ▼
//!   PaymentGateway (external)
//! ```
//!
//! # Key Guarantees
//!
//! ## 1. Balance integrity
//!
//! A user's stored balance always equals the sum of their COMPLETED ledger
//! entries. Both are written in one critical section; a debit re-checks the
//! balance inside that section, so concurrent debits serialize and the
//! balance never goes negative.
//!
//! ## 2. No overbooking
//!
//! Slot reservation checks-and-increments atomically, counting in-flight
//! holds as occupied. N concurrent joins against K free slots yield exactly
//! K participations and N−K `TournamentFull` results.
//!
//! ## 3. Compensation over partial commits
//!
//! Join is "reserve slot → debit fee → confirm participation"; any failure
//! after the reservation rolls the prior steps back in reverse order. Leave
//! is symmetric. No user is ever charged without a participation, and no
//! slot stays consumed without one.
//!
//! ## 4. Exactly-once reconciliation
//!
//! Purchases are PENDING until the gateway reports an outcome. Resolution is
//! a one-shot PENDING→terminal transition per payment id; redelivered
//! notifications are accepted as no-ops and conflicting ones are rejected.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod capacity;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod gateway;
pub mod ledger;
pub mod metrics;
pub mod purchase;
pub mod reconciliation;
pub mod types;

pub use capacity::{CapacityError, CapacityTracker, SlotHold};
pub use catalog::{InMemoryCatalog, TournamentCatalog};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use coordinator::{EntryCoordinator, JoinError, LeaveError, LeaveOutcome};
pub use gateway::{
    GatewayError, GatewayResult, MockPaymentGateway, PaymentGateway, PaymentIntent,
    UnreachablePaymentGateway,
};
pub use ledger::{LedgerError, LedgerStore, PendingOutcome, Resolution};
pub use purchase::{PurchaseError, PurchaseReceipt, PurchaseService};
pub use reconciliation::{PaymentReconciler, Reconciliation, ReconcileError};
pub use types::*;
