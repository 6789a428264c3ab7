//! Domain types for the coin ledger and tournament-entry engine.
//!
//! This module contains the identifiers, value objects and entities shared by
//! the ledger store, the capacity tracker and the coordinator. Balance math is
//! integer-only: coins are whole units and ledger entries carry signed amounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a platform user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random `UserId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a `UserId` from a `Uuid`.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a tournament.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TournamentId(Uuid);

impl TournamentId {
    /// Creates a new random `TournamentId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a `TournamentId` from a `Uuid`.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TournamentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TournamentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a ledger entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Creates a new random `EntryId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a tournament participation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipationId(Uuid);

impl ParticipationId {
    /// Creates a new random `ParticipationId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ParticipationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ParticipationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Coins Value Object (whole integer units, never floating point)
// ============================================================================

/// An amount of platform coins.
///
/// Coins are integer-valued; all arithmetic is checked so that balance math
/// can surface overflow as an integrity error instead of wrapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coins(u64);

impl Coins {
    /// Zero coins.
    pub const ZERO: Self = Self(0);

    /// Creates a coin amount.
    #[must_use]
    pub const fn new(amount: u64) -> Self {
        Self(amount)
    }

    /// Returns the raw amount.
    #[must_use]
    pub const fn amount(&self) -> u64 {
        self.0
    }

    /// Checks whether the amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts with overflow checking.
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(sum) => Some(Self(sum)),
            None => None,
        }
    }

    /// Subtracts an amount, returning `None` if the result would be negative.
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(diff) => Some(Self(diff)),
            None => None,
        }
    }

    /// Converts to a signed credit amount for a ledger entry.
    ///
    /// Returns `None` for amounts beyond `i64::MAX`.
    #[must_use]
    pub fn as_credit(self) -> Option<i64> {
        i64::try_from(self.0).ok()
    }

    /// Converts to a signed debit amount for a ledger entry.
    ///
    /// Returns `None` for amounts beyond `i64::MAX`.
    #[must_use]
    pub fn as_debit(self) -> Option<i64> {
        i64::try_from(self.0).ok().map(i64::wrapping_neg)
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} coins", self.0)
    }
}

// ============================================================================
// Ledger Entries
// ============================================================================

/// What kind of balance-affecting event a ledger entry records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// Coins bought through the payment gateway.
    Purchase,
    /// Entry fee debited on tournament join.
    TournamentEntry,
    /// Entry fee credited back on tournament leave.
    TournamentRefund,
    /// Winnings or promotional credit.
    Payout,
}

impl EntryKind {
    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::TournamentEntry => "tournament_entry",
            Self::TournamentRefund => "tournament_refund",
            Self::Payout => "payout",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a ledger entry.
///
/// `Pending` entries have no balance effect. The only permitted transitions
/// are `Pending -> Completed` and `Pending -> Failed`, each at most once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryStatus {
    /// Awaiting an external outcome (gateway callback).
    Pending,
    /// Applied to the balance.
    Completed,
    /// Terminal without balance effect.
    Failed,
}

impl EntryStatus {
    /// Whether this status permits no further transition.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional references attached to a ledger entry at creation time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRefs {
    /// Gateway payment-intent id, for purchase entries.
    pub external_payment_id: Option<String>,
    /// Tournament the entry relates to, for entry/refund/payout entries.
    pub tournament_id: Option<TournamentId>,
}

impl EntryRefs {
    /// No references.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            external_payment_id: None,
            tournament_id: None,
        }
    }

    /// References a tournament.
    #[must_use]
    pub const fn tournament(id: TournamentId) -> Self {
        Self {
            external_payment_id: None,
            tournament_id: Some(id),
        }
    }
}

/// One immutable record of a balance-affecting event.
///
/// Entries are retained forever as the audit trail. Amount and kind never
/// change after creation; only `status` may transition, and only once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Entry identifier.
    pub id: EntryId,
    /// Owner of the balance this entry affects.
    pub user_id: UserId,
    /// Signed amount: positive = credit, negative = debit.
    pub signed_amount: i64,
    /// What the entry records.
    pub kind: EntryKind,
    /// Lifecycle status.
    pub status: EntryStatus,
    /// Gateway payment-intent id, when the entry tracks an external payment.
    pub external_payment_id: Option<String>,
    /// Tournament reference, when the entry belongs to a join/leave/payout.
    pub tournament_id: Option<TournamentId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Whether the entry currently counts toward the balance.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self.status, EntryStatus::Completed)
    }

    /// The unsigned magnitude of the entry.
    #[must_use]
    pub const fn magnitude(&self) -> Coins {
        Coins::new(self.signed_amount.unsigned_abs())
    }
}

// ============================================================================
// Tournaments
// ============================================================================

/// Catalog status of a tournament.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TournamentStatus {
    /// Accepting registrations.
    Registering,
    /// In progress.
    Live,
    /// Finished.
    Completed,
    /// Cancelled before or during play.
    Cancelled,
}

impl TournamentStatus {
    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Registering => "registering",
            Self::Live => "live",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tournament metadata as supplied by the catalog.
///
/// Occupancy state (current participants) is owned by the capacity tracker,
/// not by this record; the catalog only describes fee, capacity and timing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tournament {
    /// Tournament identifier.
    pub id: TournamentId,
    /// Display name.
    pub name: String,
    /// Entry fee in coins; may be zero.
    pub entry_fee: Coins,
    /// Maximum number of participants.
    pub max_participants: u32,
    /// Scheduled start, which doubles as the registration deadline.
    pub starts_at: DateTime<Utc>,
    /// Catalog status.
    pub status: TournamentStatus,
}

impl Tournament {
    /// Whether the tournament accepts joins at `now`.
    #[must_use]
    pub fn is_open_for_registration(&self, now: DateTime<Utc>) -> bool {
        self.status == TournamentStatus::Registering && now < self.starts_at
    }
}

/// A user's active registration in one tournament.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participation {
    /// Participation identifier.
    pub id: ParticipationId,
    /// Tournament joined.
    pub tournament_id: TournamentId,
    /// Joining user.
    pub user_id: UserId,
    /// When the join committed.
    pub joined_at: DateTime<Utc>,
    /// Whether leaving refunds the entry fee, derived from the time-to-start
    /// policy at join time.
    pub refundable: bool,
}

// ============================================================================
// Read-Model Pagination
// ============================================================================

/// One page of a newest-first query result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Offset this page starts at.
    pub offset: usize,
    /// Total number of items across all pages.
    pub total: usize,
}

impl<T> Page<T> {
    /// Whether more items exist past this page.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.offset + self.items.len() < self.total
    }
}
