//! Tournament capacity tracker: occupancy counters and participation records.
//!
//! This tracker is what prevents overbooking in the "last slot" scenario.
//! Occupancy counts BOTH committed participations and in-flight holds, and a
//! reservation checks-and-increments in one critical section: under concurrent
//! joins exactly `max - current` callers obtain a hold and the rest see
//! [`CapacityError::Full`], regardless of arrival order.
//!
//! A hold is the in-flight phase of a join. The coordinator either confirms it
//! into a [`Participation`] once the entry fee is secured, or releases it as
//! compensation. Holds also pin the (tournament, user) pair, so a duplicate
//! join racing the first one is rejected instead of double-charging.

use crate::types::{Participation, ParticipationId, TournamentId, UserId};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Errors raised by the capacity tracker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapacityError {
    /// All slots are taken.
    ///
    /// An expected steady-state outcome under contention, not a failure.
    #[error("tournament is full: {current}/{max}")]
    Full {
        /// Occupied slots (participations plus in-flight holds).
        current: u32,
        /// Capacity.
        max: u32,
    },

    /// The user already holds a slot or an active participation here.
    #[error("user already joined this tournament")]
    AlreadyJoined,

    /// The hold being confirmed or released is not tracked.
    ///
    /// Holds are single-use move-only tokens, so this indicates state
    /// corruption; callers treat it as an integrity error.
    #[error("slot hold is not tracked")]
    UnknownHold,
}

/// A reserved slot awaiting confirmation or release.
///
/// Move-only: confirming or releasing consumes the token, so a hold cannot be
/// spent twice. Every hold obtained from [`CapacityTracker::reserve`] must be
/// passed back to exactly one of [`CapacityTracker::confirm`] or
/// [`CapacityTracker::release`].
#[derive(Debug)]
#[must_use = "a hold occupies a slot until confirmed or released"]
pub struct SlotHold {
    tournament_id: TournamentId,
    user_id: UserId,
}

impl SlotHold {
    /// Tournament the held slot belongs to.
    #[must_use]
    pub const fn tournament_id(&self) -> TournamentId {
        self.tournament_id
    }

    /// User the slot is held for.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }
}

#[derive(Debug)]
struct TournamentSlots {
    max: u32,
    current: u32,
    holds: HashSet<UserId>,
    participations: HashMap<UserId, Participation>,
}

impl TournamentSlots {
    fn new(max: u32) -> Self {
        Self {
            max,
            current: 0,
            holds: HashSet::new(),
            participations: HashMap::new(),
        }
    }
}

/// Durable occupancy and participation state, one record per tournament.
#[derive(Debug, Default)]
pub struct CapacityTracker {
    state: Mutex<HashMap<TournamentId, TournamentSlots>>,
}

impl CapacityTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TournamentId, TournamentSlots>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically checks capacity and pair-uniqueness, then takes a slot.
    ///
    /// `max` is the capacity per the current catalog metadata; it refreshes
    /// the tracked capacity, so a shrunk tournament stops admitting once
    /// occupancy reaches the new limit.
    ///
    /// # Errors
    ///
    /// - [`CapacityError::AlreadyJoined`] when the user has an active
    ///   participation or an in-flight hold for this tournament
    /// - [`CapacityError::Full`] when `current >= max`
    pub fn reserve(
        &self,
        tournament_id: TournamentId,
        user_id: UserId,
        max: u32,
    ) -> Result<SlotHold, CapacityError> {
        let mut state = self.lock();
        let slots = state
            .entry(tournament_id)
            .or_insert_with(|| TournamentSlots::new(max));
        slots.max = max;

        if slots.participations.contains_key(&user_id) || slots.holds.contains(&user_id) {
            return Err(CapacityError::AlreadyJoined);
        }
        if slots.current >= slots.max {
            tracing::debug!(
                tournament_id = %tournament_id,
                current = slots.current,
                max = slots.max,
                "slot reservation rejected: full"
            );
            return Err(CapacityError::Full {
                current: slots.current,
                max: slots.max,
            });
        }

        slots.holds.insert(user_id);
        slots.current += 1;
        tracing::debug!(
            tournament_id = %tournament_id,
            user_id = %user_id,
            current = slots.current,
            "slot held"
        );

        Ok(SlotHold {
            tournament_id,
            user_id,
        })
    }

    /// Converts a hold into a committed [`Participation`].
    ///
    /// Occupancy is unchanged: the hold already counted.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError::UnknownHold`] if the hold is not tracked.
    pub fn confirm(
        &self,
        hold: SlotHold,
        joined_at: DateTime<Utc>,
        refundable: bool,
    ) -> Result<Participation, CapacityError> {
        let mut state = self.lock();
        let slots = state
            .get_mut(&hold.tournament_id)
            .ok_or(CapacityError::UnknownHold)?;
        if !slots.holds.remove(&hold.user_id) {
            return Err(CapacityError::UnknownHold);
        }

        let participation = Participation {
            id: ParticipationId::new(),
            tournament_id: hold.tournament_id,
            user_id: hold.user_id,
            joined_at,
            refundable,
        };
        slots
            .participations
            .insert(hold.user_id, participation.clone());

        tracing::debug!(
            tournament_id = %hold.tournament_id,
            user_id = %hold.user_id,
            participation_id = %participation.id,
            "hold confirmed into participation"
        );

        Ok(participation)
    }

    /// Releases a hold, returning its slot to the pool (compensation path).
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError::UnknownHold`] if the hold is not tracked.
    pub fn release(&self, hold: SlotHold) -> Result<(), CapacityError> {
        let mut state = self.lock();
        let slots = state
            .get_mut(&hold.tournament_id)
            .ok_or(CapacityError::UnknownHold)?;
        if !slots.holds.remove(&hold.user_id) {
            return Err(CapacityError::UnknownHold);
        }

        // Bug-guard: never decrement below zero.
        slots.current = slots.current.saturating_sub(1);
        tracing::debug!(
            tournament_id = %hold.tournament_id,
            user_id = %hold.user_id,
            current = slots.current,
            "hold released"
        );
        Ok(())
    }

    /// Removes an active participation and frees its slot.
    ///
    /// Returns the removed record, or `None` when the user is not
    /// participating (double-leave is a no-op at this layer).
    #[must_use]
    pub fn remove_participation(
        &self,
        tournament_id: TournamentId,
        user_id: UserId,
    ) -> Option<Participation> {
        let mut state = self.lock();
        let slots = state.get_mut(&tournament_id)?;
        let participation = slots.participations.remove(&user_id)?;
        slots.current = slots.current.saturating_sub(1);
        tracing::debug!(
            tournament_id = %tournament_id,
            user_id = %user_id,
            current = slots.current,
            "participation removed"
        );
        Some(participation)
    }

    /// Re-inserts a participation removed by [`Self::remove_participation`].
    ///
    /// Compensation path for a leave whose refund step failed; restores the
    /// record and its slot.
    pub fn restore_participation(&self, participation: Participation) {
        let mut state = self.lock();
        let slots = state
            .entry(participation.tournament_id)
            .or_insert_with(|| TournamentSlots::new(1));
        slots.current = slots.current.saturating_add(1);
        slots.max = slots.max.max(slots.current);
        slots
            .participations
            .insert(participation.user_id, participation);
    }

    /// Current occupancy as `(current, max)`, or `None` for an untracked
    /// tournament (no joins yet).
    #[must_use]
    pub fn occupancy(&self, tournament_id: TournamentId) -> Option<(u32, u32)> {
        self.lock()
            .get(&tournament_id)
            .map(|slots| (slots.current, slots.max))
    }

    /// The active participation for a (tournament, user) pair, if any.
    ///
    /// In-flight holds are not participations and are not visible here.
    #[must_use]
    pub fn participation(
        &self,
        tournament_id: TournamentId,
        user_id: UserId,
    ) -> Option<Participation> {
        self.lock()
            .get(&tournament_id)
            .and_then(|slots| slots.participations.get(&user_id).cloned())
    }

    /// All active participations for a tournament.
    #[must_use]
    pub fn participants(&self, tournament_id: TournamentId) -> Vec<Participation> {
        self.lock()
            .get(&tournament_id)
            .map(|slots| slots.participations.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of active participations (excludes in-flight holds).
    #[must_use]
    pub fn participant_count(&self, tournament_id: TournamentId) -> u32 {
        self.lock()
            .get(&tournament_id)
            .map(|slots| u32::try_from(slots.participations.len()).unwrap_or(u32::MAX))
            .unwrap_or(0)
    }
}
