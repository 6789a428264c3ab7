//! Ledger store: the durable, append-only record of balance-affecting
//! transactions plus a materialized balance per user.
//!
//! **Concurrency strategy**: every operation is one critical section over the
//! whole ledger state, so the balance check and the entry write are a single
//! atomic unit. A debit can never observe a stale balance, and an entry can
//! never be written without its balance effect (or vice versa).
//!
//! The materialized balance is a cache of the sum of COMPLETED entries for a
//! user; both are written in the same critical section so the invariant
//! `balance(u) == Σ completed signed amounts of u` holds at all times.

use crate::clock::Clock;
use crate::types::{Coins, EntryId, EntryKind, EntryRefs, EntryStatus, LedgerEntry, Page, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Errors raised by the ledger store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Zero-amount entries are never written; callers short-circuit instead.
    #[error("zero-amount ledger entries are not permitted")]
    ZeroAmount,

    /// The debit would drive the balance negative.
    ///
    /// This is an expected steady-state outcome, not an internal failure.
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        /// Balance at the time of the attempt.
        available: Coins,
        /// Amount the caller tried to debit.
        requested: Coins,
    },

    /// A pending entry with this external reference already exists.
    #[error("external payment reference already recorded: {external_ref}")]
    DuplicateExternalRef {
        /// The offending reference.
        external_ref: String,
    },

    /// No entry carries this external reference.
    #[error("unknown external payment reference: {external_ref}")]
    UnknownExternalRef {
        /// The unmatched reference.
        external_ref: String,
    },

    /// The entry was already resolved to a different terminal status.
    ///
    /// Resolving twice with the same outcome is a no-op, never an error;
    /// only a conflicting outcome lands here.
    #[error("entry for {external_ref} already resolved as {resolved_as}")]
    AlreadyResolved {
        /// The reference whose entry is already terminal.
        external_ref: String,
        /// The terminal status it holds.
        resolved_as: EntryStatus,
    },

    /// An invariant violation was detected inside the critical section.
    ///
    /// Nothing is committed when this is raised; it is logged for
    /// investigation.
    #[error("ledger integrity violation: {reason}")]
    Integrity {
        /// What went wrong.
        reason: String,
    },
}

/// Requested outcome when resolving a pending entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingOutcome {
    /// The external payment succeeded; apply the balance effect.
    Completed,
    /// The external payment failed; terminal with no balance effect.
    Failed,
}

impl PendingOutcome {
    const fn as_status(self) -> EntryStatus {
        match self {
            Self::Completed => EntryStatus::Completed,
            Self::Failed => EntryStatus::Failed,
        }
    }
}

/// Result of resolving a pending entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The resolved entry.
    pub entry_id: EntryId,
    /// Terminal status the entry now holds.
    pub status: EntryStatus,
    /// True when the entry was already terminal with the same outcome
    /// (duplicate delivery) and nothing was applied.
    pub already_resolved: bool,
}

/// Internal ledger state, guarded as a whole.
///
/// Entries are append-only; `by_external_ref` indexes into `entries` and
/// stays valid because entries are never removed.
#[derive(Debug, Default)]
struct LedgerState {
    entries: Vec<LedgerEntry>,
    balances: HashMap<UserId, Coins>,
    by_external_ref: HashMap<String, usize>,
}

/// Append-only coin ledger with materialized per-user balances.
pub struct LedgerStore {
    state: Mutex<LedgerState>,
    clock: Arc<dyn Clock>,
}

impl LedgerStore {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            clock,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Credits a user's balance and appends the COMPLETED entry atomically.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ZeroAmount`] when `amount` is zero
    /// - [`LedgerError::Integrity`] on balance overflow (nothing committed)
    pub fn credit(
        &self,
        user_id: UserId,
        amount: Coins,
        kind: EntryKind,
        refs: EntryRefs,
    ) -> Result<EntryId, LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        let signed_amount = amount.as_credit().ok_or_else(|| LedgerError::Integrity {
            reason: format!("credit amount {amount} exceeds signed range"),
        })?;

        let mut state = self.lock();
        let current = state.balances.get(&user_id).copied().unwrap_or(Coins::ZERO);
        let Some(new_balance) = current.checked_add(amount) else {
            tracing::error!(user_id = %user_id, amount = amount.amount(), "credit overflow");
            return Err(LedgerError::Integrity {
                reason: format!("credit of {amount} overflows balance of user {user_id}"),
            });
        };

        let entry_id = Self::append(
            &mut state,
            user_id,
            signed_amount,
            kind,
            EntryStatus::Completed,
            refs,
            self.clock.now(),
        );
        state.balances.insert(user_id, new_balance);

        tracing::info!(
            user_id = %user_id,
            entry_id = %entry_id,
            kind = %kind,
            amount = amount.amount(),
            balance = new_balance.amount(),
            "credit applied"
        );
        metrics::counter!("arena_ledger_entries_total", "kind" => kind.as_str(), "status" => "completed")
            .increment(1);
        metrics::counter!("arena_coins_credited_total").increment(amount.amount());

        Ok(entry_id)
    }

    /// Debits a user's balance and appends the COMPLETED entry atomically.
    ///
    /// The balance is re-checked inside the critical section; two concurrent
    /// debits serialize, and the second sees the post-first balance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ZeroAmount`] when `amount` is zero
    /// - [`LedgerError::InsufficientBalance`] when `amount` exceeds the
    ///   current balance (the balance is never driven negative)
    pub fn debit(
        &self,
        user_id: UserId,
        amount: Coins,
        kind: EntryKind,
        refs: EntryRefs,
    ) -> Result<EntryId, LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        let signed_amount = amount.as_debit().ok_or_else(|| LedgerError::Integrity {
            reason: format!("debit amount {amount} exceeds signed range"),
        })?;

        let mut state = self.lock();
        let current = state.balances.get(&user_id).copied().unwrap_or(Coins::ZERO);
        let Some(new_balance) = current.checked_sub(amount) else {
            tracing::info!(
                user_id = %user_id,
                available = current.amount(),
                requested = amount.amount(),
                "debit rejected: insufficient balance"
            );
            return Err(LedgerError::InsufficientBalance {
                available: current,
                requested: amount,
            });
        };

        let entry_id = Self::append(
            &mut state,
            user_id,
            signed_amount,
            kind,
            EntryStatus::Completed,
            refs,
            self.clock.now(),
        );
        state.balances.insert(user_id, new_balance);

        tracing::info!(
            user_id = %user_id,
            entry_id = %entry_id,
            kind = %kind,
            amount = amount.amount(),
            balance = new_balance.amount(),
            "debit applied"
        );
        metrics::counter!("arena_ledger_entries_total", "kind" => kind.as_str(), "status" => "completed")
            .increment(1);
        metrics::counter!("arena_coins_debited_total").increment(amount.amount());

        Ok(entry_id)
    }

    /// Records a PENDING entry with no balance effect, keyed by the gateway's
    /// external reference.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ZeroAmount`] when `amount` is zero
    /// - [`LedgerError::DuplicateExternalRef`] when the reference was already
    ///   recorded
    pub fn record_pending(
        &self,
        user_id: UserId,
        amount: Coins,
        kind: EntryKind,
        external_ref: &str,
    ) -> Result<EntryId, LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        let signed_amount = amount.as_credit().ok_or_else(|| LedgerError::Integrity {
            reason: format!("pending amount {amount} exceeds signed range"),
        })?;

        let mut state = self.lock();
        if state.by_external_ref.contains_key(external_ref) {
            return Err(LedgerError::DuplicateExternalRef {
                external_ref: external_ref.to_string(),
            });
        }

        let refs = EntryRefs {
            external_payment_id: Some(external_ref.to_string()),
            tournament_id: None,
        };
        let index = state.entries.len();
        let entry_id = Self::append(
            &mut state,
            user_id,
            signed_amount,
            kind,
            EntryStatus::Pending,
            refs,
            self.clock.now(),
        );
        state
            .by_external_ref
            .insert(external_ref.to_string(), index);

        tracing::info!(
            user_id = %user_id,
            entry_id = %entry_id,
            external_ref,
            amount = amount.amount(),
            "pending entry recorded"
        );
        metrics::counter!("arena_ledger_entries_total", "kind" => kind.as_str(), "status" => "pending")
            .increment(1);

        Ok(entry_id)
    }

    /// Resolves a PENDING entry to COMPLETED (balance applied once) or FAILED
    /// (balance untouched). Idempotent under redelivery of the same outcome.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UnknownExternalRef`] when no entry carries the
    ///   reference
    /// - [`LedgerError::AlreadyResolved`] when the entry is terminal with a
    ///   conflicting outcome (never silently overwritten)
    /// - [`LedgerError::Integrity`] on balance overflow (the entry stays
    ///   PENDING; nothing is committed)
    pub fn resolve_pending(
        &self,
        external_ref: &str,
        outcome: PendingOutcome,
    ) -> Result<Resolution, LedgerError> {
        let mut state = self.lock();
        let Some(&index) = state.by_external_ref.get(external_ref) else {
            return Err(LedgerError::UnknownExternalRef {
                external_ref: external_ref.to_string(),
            });
        };

        let (entry_id, user_id, status, magnitude) = {
            let entry = &state.entries[index];
            (entry.id, entry.user_id, entry.status, entry.magnitude())
        };

        if status.is_terminal() {
            if status == outcome.as_status() {
                // Duplicate delivery: accepted, nothing re-applied.
                return Ok(Resolution {
                    entry_id,
                    status,
                    already_resolved: true,
                });
            }
            return Err(LedgerError::AlreadyResolved {
                external_ref: external_ref.to_string(),
                resolved_as: status,
            });
        }

        match outcome {
            PendingOutcome::Completed => {
                let current = state.balances.get(&user_id).copied().unwrap_or(Coins::ZERO);
                let Some(new_balance) = current.checked_add(magnitude) else {
                    tracing::error!(user_id = %user_id, external_ref, "resolution overflow");
                    return Err(LedgerError::Integrity {
                        reason: format!(
                            "completing {external_ref} overflows balance of user {user_id}"
                        ),
                    });
                };
                state.entries[index].status = EntryStatus::Completed;
                state.balances.insert(user_id, new_balance);
                metrics::counter!("arena_coins_credited_total").increment(magnitude.amount());
            }
            PendingOutcome::Failed => {
                state.entries[index].status = EntryStatus::Failed;
            }
        }

        let status = outcome.as_status();
        tracing::info!(
            user_id = %user_id,
            entry_id = %entry_id,
            external_ref,
            status = %status,
            "pending entry resolved"
        );
        metrics::counter!("arena_ledger_resolutions_total", "status" => status.as_str())
            .increment(1);

        Ok(Resolution {
            entry_id,
            status,
            already_resolved: false,
        })
    }

    /// Returns the materialized balance for a user (zero when unknown).
    #[must_use]
    pub fn balance(&self, user_id: UserId) -> Coins {
        self.lock()
            .balances
            .get(&user_id)
            .copied()
            .unwrap_or(Coins::ZERO)
    }

    /// Sum of COMPLETED entry amounts for a user.
    ///
    /// Exists for audit: it must always equal [`Self::balance`].
    #[must_use]
    pub fn completed_total(&self, user_id: UserId) -> i64 {
        self.lock()
            .entries
            .iter()
            .filter(|e| e.user_id == user_id && e.is_completed())
            .map(|e| e.signed_amount)
            .sum()
    }

    /// Looks up a single entry by id.
    #[must_use]
    pub fn entry(&self, entry_id: EntryId) -> Option<LedgerEntry> {
        self.lock()
            .entries
            .iter()
            .find(|e| e.id == entry_id)
            .cloned()
    }

    /// Paginated transaction history for a user, newest first.
    #[must_use]
    pub fn history(&self, user_id: UserId, offset: usize, limit: usize) -> Page<LedgerEntry> {
        let state = self.lock();
        let mut newest_first: Vec<&LedgerEntry> = state
            .entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .collect();
        newest_first.reverse();

        let total = newest_first.len();
        let items = newest_first
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        Page {
            items,
            offset,
            total,
        }
    }

    fn append(
        state: &mut LedgerState,
        user_id: UserId,
        signed_amount: i64,
        kind: EntryKind,
        status: EntryStatus,
        refs: EntryRefs,
        created_at: chrono::DateTime<chrono::Utc>,
    ) -> EntryId {
        let entry = LedgerEntry {
            id: EntryId::new(),
            user_id,
            signed_amount,
            kind,
            status,
            external_payment_id: refs.external_payment_id,
            tournament_id: refs.tournament_id,
            created_at,
        };
        let id = entry.id;
        state.entries.push(entry);
        id
    }
}

impl std::fmt::Debug for LedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("LedgerStore")
            .field("entries", &state.entries.len())
            .field("users", &state.balances.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    fn store() -> LedgerStore {
        LedgerStore::new(Arc::new(SystemClock))
    }

    #[test]
    fn credit_then_debit_updates_balance() {
        let ledger = store();
        let user = UserId::new();

        ledger
            .credit(user, Coins::new(100), EntryKind::Purchase, EntryRefs::none())
            .unwrap();
        ledger
            .debit(
                user,
                Coins::new(40),
                EntryKind::TournamentEntry,
                EntryRefs::none(),
            )
            .unwrap();

        assert_eq!(ledger.balance(user), Coins::new(60));
        assert_eq!(ledger.completed_total(user), 60);
    }

    #[test]
    fn debit_never_drives_balance_negative() {
        let ledger = store();
        let user = UserId::new();
        ledger
            .credit(user, Coins::new(10), EntryKind::Purchase, EntryRefs::none())
            .unwrap();

        let err = ledger
            .debit(
                user,
                Coins::new(40),
                EntryKind::TournamentEntry,
                EntryRefs::none(),
            )
            .unwrap_err();

        assert_eq!(
            err,
            LedgerError::InsufficientBalance {
                available: Coins::new(10),
                requested: Coins::new(40),
            }
        );
        // Nothing committed: balance and history are unchanged.
        assert_eq!(ledger.balance(user), Coins::new(10));
        assert_eq!(ledger.history(user, 0, 10).total, 1);
    }

    #[test]
    fn zero_amounts_are_rejected() {
        let ledger = store();
        let user = UserId::new();

        assert_eq!(
            ledger.credit(user, Coins::ZERO, EntryKind::Payout, EntryRefs::none()),
            Err(LedgerError::ZeroAmount)
        );
        assert_eq!(
            ledger.debit(
                user,
                Coins::ZERO,
                EntryKind::TournamentEntry,
                EntryRefs::none()
            ),
            Err(LedgerError::ZeroAmount)
        );
        assert_eq!(ledger.history(user, 0, 10).total, 0);
    }

    #[test]
    fn pending_has_no_balance_effect_until_completed() {
        let ledger = store();
        let user = UserId::new();

        ledger
            .record_pending(user, Coins::new(500), EntryKind::Purchase, "pi_1")
            .unwrap();
        assert_eq!(ledger.balance(user), Coins::ZERO);
        assert_eq!(ledger.completed_total(user), 0);

        let resolution = ledger
            .resolve_pending("pi_1", PendingOutcome::Completed)
            .unwrap();
        assert!(!resolution.already_resolved);
        assert_eq!(ledger.balance(user), Coins::new(500));
    }

    #[test]
    fn resolve_is_idempotent_under_redelivery() {
        let ledger = store();
        let user = UserId::new();
        ledger
            .record_pending(user, Coins::new(500), EntryKind::Purchase, "pi_1")
            .unwrap();

        ledger
            .resolve_pending("pi_1", PendingOutcome::Completed)
            .unwrap();
        let second = ledger
            .resolve_pending("pi_1", PendingOutcome::Completed)
            .unwrap();

        assert!(second.already_resolved);
        // Credited exactly once.
        assert_eq!(ledger.balance(user), Coins::new(500));
    }

    #[test]
    fn conflicting_resolution_is_an_error_not_an_overwrite() {
        let ledger = store();
        let user = UserId::new();
        ledger
            .record_pending(user, Coins::new(500), EntryKind::Purchase, "pi_1")
            .unwrap();
        ledger
            .resolve_pending("pi_1", PendingOutcome::Failed)
            .unwrap();

        let err = ledger
            .resolve_pending("pi_1", PendingOutcome::Completed)
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::AlreadyResolved {
                external_ref: "pi_1".to_string(),
                resolved_as: EntryStatus::Failed,
            }
        );
        assert_eq!(ledger.balance(user), Coins::ZERO);
    }

    #[test]
    fn failed_resolution_leaves_balance_untouched() {
        let ledger = store();
        let user = UserId::new();
        ledger
            .record_pending(user, Coins::new(500), EntryKind::Purchase, "pi_1")
            .unwrap();

        let resolution = ledger
            .resolve_pending("pi_1", PendingOutcome::Failed)
            .unwrap();

        assert_eq!(resolution.status, EntryStatus::Failed);
        assert_eq!(ledger.balance(user), Coins::ZERO);
        assert_eq!(ledger.completed_total(user), 0);
    }

    #[test]
    fn duplicate_external_ref_is_rejected() {
        let ledger = store();
        let user = UserId::new();
        ledger
            .record_pending(user, Coins::new(500), EntryKind::Purchase, "pi_1")
            .unwrap();

        let err = ledger
            .record_pending(user, Coins::new(300), EntryKind::Purchase, "pi_1")
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::DuplicateExternalRef {
                external_ref: "pi_1".to_string(),
            }
        );
    }

    #[test]
    fn unknown_external_ref_is_reported() {
        let ledger = store();
        let err = ledger
            .resolve_pending("pi_missing", PendingOutcome::Completed)
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::UnknownExternalRef {
                external_ref: "pi_missing".to_string(),
            }
        );
    }

    #[test]
    fn history_is_newest_first_and_paginated() {
        let ledger = store();
        let user = UserId::new();
        for n in 1..=5 {
            ledger
                .credit(user, Coins::new(n), EntryKind::Payout, EntryRefs::none())
                .unwrap();
        }

        let page = ledger.history(user, 0, 2);
        assert_eq!(page.total, 5);
        assert!(page.has_more());
        assert_eq!(page.items[0].signed_amount, 5);
        assert_eq!(page.items[1].signed_amount, 4);

        let last = ledger.history(user, 4, 2);
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.items[0].signed_amount, 1);
        assert!(!last.has_more());
    }

    #[test]
    fn history_is_scoped_per_user() {
        let ledger = store();
        let alice = UserId::new();
        let bob = UserId::new();
        ledger
            .credit(alice, Coins::new(10), EntryKind::Payout, EntryRefs::none())
            .unwrap();
        ledger
            .credit(bob, Coins::new(20), EntryKind::Payout, EntryRefs::none())
            .unwrap();

        assert_eq!(ledger.history(alice, 0, 10).total, 1);
        assert_eq!(ledger.history(bob, 0, 10).items[0].signed_amount, 20);
    }
}
