//! Entry transaction coordinator: the atomic unit around join and leave.
//!
//! A join is "slot + fee + participation" and a leave is its inverse. Neither
//! multi-store sequence can be covered by one lock, so the coordinator uses
//! the hold lifecycle of [`CapacityTracker`] plus compensating actions: any
//! step failing after a partial mutation rolls back the prior steps in
//! reverse order. At no observable instant do participation existence, slot
//! occupancy and ledger totals disagree.
//!
//! ```text
//! Join:
//!   catalog lookup ─► open? ─► reserve slot ─► debit fee ─► confirm hold
//!                                   │               │
//!                                   │   InsufficientBalance: release slot
//!                                   └── Full / AlreadyJoined: stop, nothing held
//!
//! Leave:
//!   catalog lookup ─► cutoff? ─► remove participation ─► credit refund
//!                                        │
//!                          credit failed: restore participation
//! ```

use crate::capacity::{CapacityError, CapacityTracker};
use crate::catalog::TournamentCatalog;
use crate::clock::Clock;
use crate::config::Config;
use crate::ledger::{LedgerError, LedgerStore};
use crate::types::{
    Coins, EntryId, EntryKind, EntryRefs, LedgerEntry, Page, Participation, Tournament,
    TournamentId, TournamentStatus, UserId,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Why a join was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    /// The catalog knows no such tournament.
    #[error("unknown tournament: {0}")]
    UnknownTournament(TournamentId),

    /// The tournament is not accepting registrations (wrong status, or the
    /// registration deadline has passed).
    #[error("tournament is not open for registration (status {status})")]
    TournamentNotOpen {
        /// Catalog status at the time of the attempt.
        status: TournamentStatus,
    },

    /// The user already has an active participation or an in-flight join.
    #[error("user already joined this tournament")]
    AlreadyJoined,

    /// No free slots. Expected under contention, not a failure.
    #[error("tournament is full: {current}/{max}")]
    TournamentFull {
        /// Occupied slots.
        current: u32,
        /// Capacity.
        max: u32,
    },

    /// The entry fee exceeds the user's balance. Expected steady-state.
    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance {
        /// Balance at the time of the attempt.
        available: Coins,
        /// The entry fee.
        requested: Coins,
    },

    /// An invariant violation surfaced mid-transaction; all prior steps were
    /// compensated and the incident logged.
    #[error("join aborted by integrity violation: {reason}")]
    Integrity {
        /// What went wrong.
        reason: String,
    },
}

/// Why a leave was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeaveError {
    /// The catalog knows no such tournament.
    #[error("unknown tournament: {0}")]
    UnknownTournament(TournamentId),

    /// The user has no active participation here. Double-leave lands here
    /// and never produces a second refund.
    #[error("user is not participating in this tournament")]
    NotParticipating,

    /// The refund cutoff has passed.
    #[error("too late to leave: cutoff was {cutoff}")]
    TooLateToLeave {
        /// The cutoff that applied to this participation.
        cutoff: DateTime<Utc>,
    },

    /// An invariant violation surfaced mid-transaction; the participation was
    /// restored and the incident logged.
    #[error("leave aborted by integrity violation: {reason}")]
    Integrity {
        /// What went wrong.
        reason: String,
    },
}

/// Result of a successful leave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// The participation that was removed.
    pub participation: Participation,
    /// The refund entry, when an entry fee was credited back. `None` for
    /// zero-fee tournaments (no zero-amount entries are written).
    pub refund_entry: Option<EntryId>,
}

/// Coordinates joins, leaves and payouts across the ledger and the tracker.
pub struct EntryCoordinator {
    ledger: Arc<LedgerStore>,
    tracker: Arc<CapacityTracker>,
    catalog: Arc<dyn TournamentCatalog>,
    clock: Arc<dyn Clock>,
    config: Config,
}

impl EntryCoordinator {
    /// Creates a coordinator over the given stores and catalog.
    #[must_use]
    pub fn new(
        ledger: Arc<LedgerStore>,
        tracker: Arc<CapacityTracker>,
        catalog: Arc<dyn TournamentCatalog>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        Self {
            ledger,
            tracker,
            catalog,
            clock,
            config,
        }
    }

    /// Joins a user into a tournament, debiting the entry fee.
    ///
    /// Zero-fee tournaments skip the debit entirely; no zero-amount ledger
    /// entry is written.
    ///
    /// # Errors
    ///
    /// See [`JoinError`]. On any error no slot stays consumed and no coins
    /// stay debited.
    pub fn join(
        &self,
        user_id: UserId,
        tournament_id: TournamentId,
    ) -> Result<Participation, JoinError> {
        let result = self.try_join(user_id, tournament_id);
        let outcome = match &result {
            Ok(_) => "joined",
            Err(JoinError::UnknownTournament(_)) => "unknown_tournament",
            Err(JoinError::TournamentNotOpen { .. }) => "not_open",
            Err(JoinError::AlreadyJoined) => "already_joined",
            Err(JoinError::TournamentFull { .. }) => "full",
            Err(JoinError::InsufficientBalance { .. }) => "insufficient_balance",
            Err(JoinError::Integrity { .. }) => "integrity",
        };
        metrics::counter!("arena_tournament_joins_total", "outcome" => outcome).increment(1);
        result
    }

    fn try_join(
        &self,
        user_id: UserId,
        tournament_id: TournamentId,
    ) -> Result<Participation, JoinError> {
        let tournament = self
            .catalog
            .tournament(tournament_id)
            .ok_or(JoinError::UnknownTournament(tournament_id))?;

        let now = self.clock.now();
        if !tournament.is_open_for_registration(now) {
            return Err(JoinError::TournamentNotOpen {
                status: tournament.status,
            });
        }

        // Atomic: pair-uniqueness and capacity check-and-increment in one
        // step. Exactly `max - current` concurrent callers get past this.
        let hold = self
            .tracker
            .reserve(tournament_id, user_id, tournament.max_participants)
            .map_err(|e| match e {
                CapacityError::Full { current, max } => JoinError::TournamentFull { current, max },
                CapacityError::AlreadyJoined => JoinError::AlreadyJoined,
                CapacityError::UnknownHold => JoinError::Integrity {
                    reason: e.to_string(),
                },
            })?;

        let fee = tournament.entry_fee;
        let refundable = self.is_refundable_at(&tournament, now);

        if !fee.is_zero() {
            if let Err(e) = self.ledger.debit(
                user_id,
                fee,
                EntryKind::TournamentEntry,
                EntryRefs::tournament(tournament_id),
            ) {
                // Compensation: the reserved slot goes back before we report.
                if let Err(release_err) = self.tracker.release(hold) {
                    tracing::error!(
                        tournament_id = %tournament_id,
                        user_id = %user_id,
                        error = %release_err,
                        "failed to release slot while compensating a join"
                    );
                }
                return Err(match e {
                    LedgerError::InsufficientBalance {
                        available,
                        requested,
                    } => JoinError::InsufficientBalance {
                        available,
                        requested,
                    },
                    other => JoinError::Integrity {
                        reason: other.to_string(),
                    },
                });
            }
        }

        match self.tracker.confirm(hold, now, refundable) {
            Ok(participation) => {
                tracing::info!(
                    tournament_id = %tournament_id,
                    user_id = %user_id,
                    participation_id = %participation.id,
                    entry_fee = fee.amount(),
                    "user joined tournament"
                );
                Ok(participation)
            }
            Err(e) => {
                // The hold vanished under us: refund the fee and report.
                if !fee.is_zero() {
                    if let Err(credit_err) = self.ledger.credit(
                        user_id,
                        fee,
                        EntryKind::TournamentRefund,
                        EntryRefs::tournament(tournament_id),
                    ) {
                        tracing::error!(
                            tournament_id = %tournament_id,
                            user_id = %user_id,
                            error = %credit_err,
                            "failed to refund fee while compensating a join"
                        );
                    }
                }
                tracing::error!(
                    tournament_id = %tournament_id,
                    user_id = %user_id,
                    error = %e,
                    "join hit an untracked hold; compensated"
                );
                Err(JoinError::Integrity {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Leaves a tournament, refunding the entry fee when the cutoff allows.
    ///
    /// Policy: zero-fee participations may leave any time strictly before
    /// start; fee-bearing participations must additionally leave at least
    /// [`Config::refund_lead_time`] before start.
    ///
    /// # Errors
    ///
    /// See [`LeaveError`]. Double-leave returns
    /// [`LeaveError::NotParticipating`] and never a second refund.
    pub fn leave(
        &self,
        user_id: UserId,
        tournament_id: TournamentId,
    ) -> Result<LeaveOutcome, LeaveError> {
        let result = self.try_leave(user_id, tournament_id);
        let outcome = match &result {
            Ok(_) => "left",
            Err(LeaveError::UnknownTournament(_)) => "unknown_tournament",
            Err(LeaveError::NotParticipating) => "not_participating",
            Err(LeaveError::TooLateToLeave { .. }) => "too_late",
            Err(LeaveError::Integrity { .. }) => "integrity",
        };
        metrics::counter!("arena_tournament_leaves_total", "outcome" => outcome).increment(1);
        result
    }

    fn try_leave(
        &self,
        user_id: UserId,
        tournament_id: TournamentId,
    ) -> Result<LeaveOutcome, LeaveError> {
        let tournament = self
            .catalog
            .tournament(tournament_id)
            .ok_or(LeaveError::UnknownTournament(tournament_id))?;

        if self
            .tracker
            .participation(tournament_id, user_id)
            .is_none()
        {
            return Err(LeaveError::NotParticipating);
        }

        let now = self.clock.now();
        if !self.leave_allowed_at(&tournament, now) {
            return Err(LeaveError::TooLateToLeave {
                cutoff: self.refund_cutoff(&tournament),
            });
        }

        // Authoritative removal; a racing leave gets None here.
        let Some(participation) = self.tracker.remove_participation(tournament_id, user_id)
        else {
            return Err(LeaveError::NotParticipating);
        };

        let fee = tournament.entry_fee;
        let refund_entry = if fee.is_zero() {
            None
        } else {
            match self.ledger.credit(
                user_id,
                fee,
                EntryKind::TournamentRefund,
                EntryRefs::tournament(tournament_id),
            ) {
                Ok(entry_id) => Some(entry_id),
                Err(e) => {
                    // Compensation: put the participation (and its slot) back.
                    self.tracker.restore_participation(participation);
                    tracing::error!(
                        tournament_id = %tournament_id,
                        user_id = %user_id,
                        error = %e,
                        "refund credit failed; participation restored"
                    );
                    return Err(LeaveError::Integrity {
                        reason: e.to_string(),
                    });
                }
            }
        };

        tracing::info!(
            tournament_id = %tournament_id,
            user_id = %user_id,
            participation_id = %participation.id,
            refunded = fee.amount(),
            "user left tournament"
        );

        Ok(LeaveOutcome {
            participation,
            refund_entry,
        })
    }

    /// Credits a payout-style amount to a user through the ledger.
    ///
    /// # Errors
    ///
    /// Propagates [`LedgerError`] from the credit (zero amounts rejected).
    pub fn award_payout(
        &self,
        user_id: UserId,
        amount: Coins,
        tournament_id: Option<TournamentId>,
    ) -> Result<EntryId, LedgerError> {
        let refs = tournament_id.map_or_else(EntryRefs::none, EntryRefs::tournament);
        let entry_id = self.ledger.credit(user_id, amount, EntryKind::Payout, refs)?;
        metrics::counter!("arena_payouts_total").increment(1);
        Ok(entry_id)
    }

    /// Current coin balance of a user.
    #[must_use]
    pub fn balance(&self, user_id: UserId) -> Coins {
        self.ledger.balance(user_id)
    }

    /// Paginated transaction history for display, newest first.
    ///
    /// Passing `limit = 0` falls back to the configured page size.
    #[must_use]
    pub fn history(&self, user_id: UserId, offset: usize, limit: usize) -> Page<LedgerEntry> {
        let limit = if limit == 0 {
            self.config.history_page_size
        } else {
            limit
        };
        self.ledger.history(user_id, offset, limit)
    }

    /// Occupancy of a tournament as `(current, max)`; `(0, catalog max)`
    /// when nobody joined yet.
    #[must_use]
    pub fn occupancy(&self, tournament_id: TournamentId) -> (u32, u32) {
        self.tracker.occupancy(tournament_id).unwrap_or_else(|| {
            let max = self
                .catalog
                .tournament(tournament_id)
                .map_or(0, |t| t.max_participants);
            (0, max)
        })
    }

    /// Whether a leave at `now` is inside the cutoff policy: strictly before
    /// start always, and with at least the configured lead time remaining for
    /// fee-bearing entries.
    fn leave_allowed_at(&self, tournament: &Tournament, now: DateTime<Utc>) -> bool {
        if now >= tournament.starts_at {
            return false;
        }
        tournament.entry_fee.is_zero()
            || tournament.starts_at - now >= self.config.refund_lead_time()
    }

    /// Whether joining at `now` leaves room to refund later (informational,
    /// stamped on the participation).
    fn is_refundable_at(&self, tournament: &Tournament, now: DateTime<Utc>) -> bool {
        self.leave_allowed_at(tournament, now)
    }

    /// The last permitted leave instant, for error reporting.
    fn refund_cutoff(&self, tournament: &Tournament) -> DateTime<Utc> {
        if tournament.entry_fee.is_zero() {
            tournament.starts_at
        } else {
            tournament.starts_at - self.config.refund_lead_time()
        }
    }
}

impl std::fmt::Debug for EntryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryCoordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
