//! End-to-end join/leave scenarios.
//!
//! Exercises the coordinator against real stores: fee debits, capacity
//! limits, refund cutoffs, and the audit invariant that a balance always
//! equals the sum of the user's completed ledger entries.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use arena_ledger::{
    CapacityTracker, Clock, Coins, Config, EntryCoordinator, EntryKind, EntryRefs, FixedClock,
    InMemoryCatalog, JoinError, LedgerStore, Tournament, TournamentId, TournamentStatus, UserId,
};
use chrono::{Duration, Utc};
use std::sync::Arc;

struct World {
    coordinator: EntryCoordinator,
    ledger: Arc<LedgerStore>,
    catalog: Arc<InMemoryCatalog>,
    clock: Arc<FixedClock>,
}

fn world() -> World {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let ledger = Arc::new(LedgerStore::new(clock.clone()));
    let tracker = Arc::new(CapacityTracker::new());
    let catalog = Arc::new(InMemoryCatalog::new());
    let coordinator = EntryCoordinator::new(
        ledger.clone(),
        tracker,
        catalog.clone(),
        clock.clone(),
        Config::default(),
    );
    World {
        coordinator,
        ledger,
        catalog,
        clock,
    }
}

fn open_tournament(world: &World, fee: u64, max: u32) -> TournamentId {
    let tournament = Tournament {
        id: TournamentId::new(),
        name: "Flow Test Cup".to_string(),
        entry_fee: Coins::new(fee),
        max_participants: max,
        starts_at: world.clock.now() + Duration::hours(2),
        status: TournamentStatus::Registering,
    };
    let id = tournament.id;
    world.catalog.upsert(tournament);
    id
}

fn fund(world: &World, coins: u64) -> UserId {
    let user = UserId::new();
    world
        .ledger
        .credit(user, Coins::new(coins), EntryKind::Purchase, EntryRefs::none())
        .unwrap();
    user
}

fn assert_audit_holds(world: &World, user: UserId) {
    let balance = i64::try_from(world.coordinator.balance(user).amount()).unwrap();
    assert_eq!(balance, world.ledger.completed_total(user));
}

#[test]
fn join_fills_last_seat_and_next_user_is_rejected() {
    let w = world();
    let id = open_tournament(&w, 40, 1);
    let alice = fund(&w, 100);
    let bob = fund(&w, 100);

    let participation = w.coordinator.join(alice, id).unwrap();
    assert_eq!(participation.tournament_id, id);
    assert_eq!(w.coordinator.balance(alice), Coins::new(60));
    assert_eq!(w.coordinator.occupancy(id), (1, 1));

    let err = w.coordinator.join(bob, id).unwrap_err();
    assert_eq!(err, JoinError::TournamentFull { current: 1, max: 1 });
    assert_eq!(w.coordinator.balance(bob), Coins::new(100));
    assert_audit_holds(&w, alice);
    assert_audit_holds(&w, bob);
}

#[test]
fn insufficient_balance_changes_nothing() {
    let w = world();
    let id = open_tournament(&w, 40, 8);
    let user = fund(&w, 10);

    let err = w.coordinator.join(user, id).unwrap_err();

    assert_eq!(
        err,
        JoinError::InsufficientBalance {
            available: Coins::new(10),
            requested: Coins::new(40),
        }
    );
    assert_eq!(w.coordinator.balance(user), Coins::new(10));
    assert_eq!(w.coordinator.occupancy(id), (0, 8));
    assert_audit_holds(&w, user);
}

#[test]
fn zero_fee_join_skips_the_ledger_entirely() {
    let w = world();
    let id = open_tournament(&w, 0, 8);
    let user = UserId::new();

    w.coordinator.join(user, id).unwrap();

    assert_eq!(w.coordinator.balance(user), Coins::ZERO);
    assert_eq!(w.ledger.history(user, 0, 10).total, 0);
    assert_eq!(w.coordinator.occupancy(id), (1, 8));
}

#[test]
fn join_leave_join_settles_on_one_entry_fee() {
    let w = world();
    let id = open_tournament(&w, 40, 8);
    let user = fund(&w, 100);

    w.coordinator.join(user, id).unwrap();
    w.coordinator.leave(user, id).unwrap();
    w.coordinator.join(user, id).unwrap();

    // Net effect: one fee paid, still joined.
    assert_eq!(w.coordinator.balance(user), Coins::new(60));
    assert_eq!(w.coordinator.occupancy(id), (1, 8));

    // Audit trail: debit, refund credit, debit - entries are never deleted.
    let tournament_entries: Vec<_> = w
        .ledger
        .history(user, 0, 10)
        .items
        .into_iter()
        .filter(|e| e.tournament_id == Some(id))
        .collect();
    assert_eq!(tournament_entries.len(), 3);
    assert_eq!(tournament_entries[0].kind, EntryKind::TournamentEntry);
    assert_eq!(tournament_entries[1].kind, EntryKind::TournamentRefund);
    assert_eq!(tournament_entries[2].kind, EntryKind::TournamentEntry);
    assert_audit_holds(&w, user);
}

#[test]
fn leave_cutoff_depends_on_entry_fee() {
    let w = world();
    // Fee-bearing tournament: leaves must respect the lead time.
    let paid = open_tournament(&w, 40, 8);
    // Zero-fee tournament: leaves are fine any time before start.
    let free = open_tournament(&w, 0, 8);
    let user = fund(&w, 100);

    w.coordinator.join(user, paid).unwrap();
    w.coordinator.join(user, free).unwrap();

    // Move inside the lead-time window (default 10 minutes before start).
    w.clock.advance(Duration::hours(2) - Duration::minutes(5));

    assert!(matches!(
        w.coordinator.leave(user, paid).unwrap_err(),
        arena_ledger::LeaveError::TooLateToLeave { .. }
    ));
    assert!(w.coordinator.leave(user, free).is_ok());
}

#[test]
fn registration_closes_at_start_time() {
    let w = world();
    let id = open_tournament(&w, 40, 8);
    let user = fund(&w, 100);

    w.clock.advance(Duration::hours(3));

    assert!(matches!(
        w.coordinator.join(user, id).unwrap_err(),
        JoinError::TournamentNotOpen { .. }
    ));
}

#[test]
fn cancelled_tournament_rejects_joins() {
    let w = world();
    let id = open_tournament(&w, 40, 8);
    w.catalog.set_status(id, TournamentStatus::Cancelled);
    let user = fund(&w, 100);

    assert_eq!(
        w.coordinator.join(user, id).unwrap_err(),
        JoinError::TournamentNotOpen {
            status: TournamentStatus::Cancelled
        }
    );
}

#[test]
fn unknown_tournament_is_reported() {
    let w = world();
    let user = fund(&w, 100);
    let missing = TournamentId::new();

    assert_eq!(
        w.coordinator.join(user, missing).unwrap_err(),
        JoinError::UnknownTournament(missing)
    );
    assert!(matches!(
        w.coordinator.leave(user, missing).unwrap_err(),
        arena_ledger::LeaveError::UnknownTournament(_)
    ));
}

#[test]
fn history_pages_through_a_busy_user() {
    let w = world();
    let id = open_tournament(&w, 10, 8);
    let user = fund(&w, 100);

    for _ in 0..3 {
        w.coordinator.join(user, id).unwrap();
        w.coordinator.leave(user, id).unwrap();
    }

    // 1 purchase + 3 x (debit + credit) = 7 entries.
    let first_page = w.coordinator.history(user, 0, 4);
    assert_eq!(first_page.total, 7);
    assert_eq!(first_page.items.len(), 4);
    assert!(first_page.has_more());

    let second_page = w.coordinator.history(user, 4, 4);
    assert_eq!(second_page.items.len(), 3);
    assert!(!second_page.has_more());

    // Newest first: the purchase that funded the user comes last.
    assert_eq!(second_page.items[2].kind, EntryKind::Purchase);
    assert_audit_holds(&w, user);
}
