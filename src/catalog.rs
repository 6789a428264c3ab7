//! Tournament catalog seam.
//!
//! The catalog is an external collaborator: it supplies tournament metadata
//! (fee, capacity, timing, status) but owns neither occupancy nor
//! participation state, which belong to the [`crate::capacity`] tracker. The
//! coordinator reads metadata through this trait so tests and demos can
//! inject their own catalog.

use crate::types::{Tournament, TournamentId, TournamentStatus};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Read-only supplier of tournament metadata.
pub trait TournamentCatalog: Send + Sync {
    /// Looks up a tournament by id.
    fn tournament(&self, id: TournamentId) -> Option<Tournament>;
}

/// In-memory catalog for demos and tests.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    tournaments: Mutex<HashMap<TournamentId, Tournament>>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TournamentId, Tournament>> {
        self.tournaments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds or replaces a tournament.
    pub fn upsert(&self, tournament: Tournament) {
        self.lock().insert(tournament.id, tournament);
    }

    /// Updates the status of a stored tournament; no-op when unknown.
    pub fn set_status(&self, id: TournamentId, status: TournamentStatus) {
        if let Some(tournament) = self.lock().get_mut(&id) {
            tournament.status = status;
        }
    }
}

impl TournamentCatalog for InMemoryCatalog {
    fn tournament(&self, id: TournamentId) -> Option<Tournament> {
        self.lock().get(&id).cloned()
    }
}
