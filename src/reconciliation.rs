//! Payment reconciliation: the asynchronous half of the two-phase purchase.
//!
//! The gateway delivers success/failure notifications at least once, in any
//! order, possibly repeatedly. This handler resolves the matching PENDING
//! entry exactly once per payment: a redelivery of the same outcome is an
//! accepted no-op, an unknown id is logged and surfaced (the gateway's own
//! retry policy governs redelivery, nothing is retried here), and a
//! conflicting outcome is an error, never an overwrite.

use crate::ledger::{LedgerError, LedgerStore, PendingOutcome};
use crate::types::{EntryId, EntryStatus};
use std::sync::Arc;
use thiserror::Error;

/// Why a notification could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// No pending or resolved entry carries this payment id.
    ///
    /// Handled leniently: logged at `warn`, surfaced for the integration
    /// layer, never a crash.
    #[error("no ledger entry for payment {external_ref}")]
    UnknownPayment {
        /// The unmatched payment id.
        external_ref: String,
    },

    /// The entry was already resolved with the opposite outcome.
    #[error("payment {external_ref} already resolved as {resolved_as}")]
    ConflictingOutcome {
        /// The payment id.
        external_ref: String,
        /// The terminal status already recorded.
        resolved_as: EntryStatus,
    },

    /// The ledger refused the resolution mid-transaction; nothing committed.
    #[error("reconciliation aborted by integrity violation: {reason}")]
    Integrity {
        /// What went wrong.
        reason: String,
    },
}

/// Result of applying one gateway notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// The resolved entry.
    pub entry_id: EntryId,
    /// Terminal status the entry now holds.
    pub status: EntryStatus,
    /// True when this was a redelivery and nothing was applied.
    pub duplicate: bool,
}

/// Consumes gateway notifications and resolves pending purchases.
pub struct PaymentReconciler {
    ledger: Arc<LedgerStore>,
}

impl PaymentReconciler {
    /// Creates a reconciler over the ledger.
    #[must_use]
    pub const fn new(ledger: Arc<LedgerStore>) -> Self {
        Self { ledger }
    }

    /// Applies a payment-succeeded notification: the pending purchase
    /// completes and the balance is credited exactly once.
    ///
    /// # Errors
    ///
    /// See [`ReconcileError`].
    pub fn on_payment_succeeded(&self, external_id: &str) -> Result<Reconciliation, ReconcileError> {
        self.resolve(external_id, PendingOutcome::Completed)
    }

    /// Applies a payment-failed notification: the pending purchase fails and
    /// the balance stays untouched.
    ///
    /// # Errors
    ///
    /// See [`ReconcileError`].
    pub fn on_payment_failed(&self, external_id: &str) -> Result<Reconciliation, ReconcileError> {
        self.resolve(external_id, PendingOutcome::Failed)
    }

    fn resolve(
        &self,
        external_id: &str,
        outcome: PendingOutcome,
    ) -> Result<Reconciliation, ReconcileError> {
        match self.ledger.resolve_pending(external_id, outcome) {
            Ok(resolution) => {
                if resolution.already_resolved {
                    tracing::info!(
                        external_id,
                        status = %resolution.status,
                        "duplicate gateway notification accepted as no-op"
                    );
                    metrics::counter!("arena_reconciliations_total", "outcome" => "duplicate")
                        .increment(1);
                } else {
                    metrics::counter!(
                        "arena_reconciliations_total",
                        "outcome" => resolution.status.as_str()
                    )
                    .increment(1);
                }
                Ok(Reconciliation {
                    entry_id: resolution.entry_id,
                    status: resolution.status,
                    duplicate: resolution.already_resolved,
                })
            }
            Err(LedgerError::UnknownExternalRef { external_ref }) => {
                tracing::warn!(
                    external_id,
                    "gateway notification for unknown payment; leaving redelivery to the gateway"
                );
                metrics::counter!("arena_reconciliations_total", "outcome" => "unknown")
                    .increment(1);
                Err(ReconcileError::UnknownPayment { external_ref })
            }
            Err(LedgerError::AlreadyResolved {
                external_ref,
                resolved_as,
            }) => {
                tracing::warn!(
                    external_id,
                    resolved_as = %resolved_as,
                    "gateway notification conflicts with recorded outcome"
                );
                metrics::counter!("arena_reconciliations_total", "outcome" => "conflict")
                    .increment(1);
                Err(ReconcileError::ConflictingOutcome {
                    external_ref,
                    resolved_as,
                })
            }
            Err(other) => {
                tracing::error!(external_id, error = %other, "reconciliation failed");
                Err(ReconcileError::Integrity {
                    reason: other.to_string(),
                })
            }
        }
    }
}

impl std::fmt::Debug for PaymentReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentReconciler").finish_non_exhaustive()
    }
}
