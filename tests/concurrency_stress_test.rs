//! Concurrency stress tests for last-slot and last-coin scenarios.
//!
//! These tests verify that under heavy concurrent load the engine admits
//! exactly as many joins as there are slots, debits a balance exactly as many
//! times as it can cover, and credits a pending purchase exactly once no
//! matter how many notification deliveries race.
//!
//! Run with: `cargo test --test concurrency_stress_test -- --nocapture`

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use arena_ledger::{
    CapacityTracker, Coins, Config, EntryCoordinator, EntryKind, EntryRefs, FixedClock,
    InMemoryCatalog, JoinError, LedgerStore, PaymentReconciler, Tournament, TournamentId,
    TournamentStatus, UserId,
};
use chrono::{Duration, Utc};
use std::sync::Arc;

fn engine() -> (Arc<EntryCoordinator>, Arc<LedgerStore>, Arc<InMemoryCatalog>) {
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let ledger = Arc::new(LedgerStore::new(clock.clone()));
    let tracker = Arc::new(CapacityTracker::new());
    let catalog = Arc::new(InMemoryCatalog::new());
    let coordinator = Arc::new(EntryCoordinator::new(
        ledger.clone(),
        tracker,
        catalog.clone(),
        clock,
        Config::default(),
    ));
    (coordinator, ledger, catalog)
}

fn open_tournament(catalog: &InMemoryCatalog, fee: u64, max: u32) -> TournamentId {
    let tournament = Tournament {
        id: TournamentId::new(),
        name: "Stress Cup".to_string(),
        entry_fee: Coins::new(fee),
        max_participants: max,
        starts_at: Utc::now() + Duration::hours(2),
        status: TournamentStatus::Registering,
    };
    let id = tournament.id;
    catalog.upsert(tournament);
    id
}

/// 100 users race for 1 slot: exactly 1 join succeeds, 99 see `TournamentFull`,
/// and the ledger reflects exactly one fee debit.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn last_slot_100_concurrent_joins() {
    let (coordinator, ledger, catalog) = engine();
    let tournament = open_tournament(&catalog, 40, 1);

    let users: Vec<UserId> = (0..100)
        .map(|_| {
            let user = UserId::new();
            ledger
                .credit(user, Coins::new(100), EntryKind::Purchase, EntryRefs::none())
                .unwrap();
            user
        })
        .collect();

    let handles: Vec<_> = users
        .iter()
        .map(|&user| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.join(user, tournament) })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let joined = results.iter().filter(|r| r.is_ok()).count();
    let full = results
        .iter()
        .filter(|r| matches!(r, Err(JoinError::TournamentFull { .. })))
        .count();

    assert_eq!(joined, 1);
    assert_eq!(full, 99);
    assert_eq!(coordinator.occupancy(tournament), (1, 1));

    // Exactly one user was charged; everyone else still holds 100.
    let charged = users
        .iter()
        .filter(|&&u| coordinator.balance(u) == Coins::new(60))
        .count();
    assert_eq!(charged, 1);
    assert_eq!(
        users
            .iter()
            .filter(|&&u| coordinator.balance(u) == Coins::new(100))
            .count(),
        99
    );
}

/// N = 24 joiners against K = 5 slots: exactly K successes, N−K rejections.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn partial_capacity_is_never_overbooked() {
    let (coordinator, ledger, catalog) = engine();
    let tournament = open_tournament(&catalog, 25, 5);

    let handles: Vec<_> = (0..24)
        .map(|_| {
            let user = UserId::new();
            ledger
                .credit(user, Coins::new(50), EntryKind::Purchase, EntryRefs::none())
                .unwrap();
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.join(user, tournament) })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 5);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(JoinError::TournamentFull { .. })))
            .count(),
        19
    );
    assert_eq!(coordinator.occupancy(tournament), (5, 5));
}

/// Concurrent debits against one balance: the re-check inside the critical
/// section admits only as many as the balance covers.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_debits_never_go_negative() {
    let (_, ledger, _) = engine();
    let user = UserId::new();
    ledger
        .credit(user, Coins::new(100), EntryKind::Purchase, EntryRefs::none())
        .unwrap();

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                ledger.debit(
                    user,
                    Coins::new(30),
                    EntryKind::TournamentEntry,
                    EntryRefs::none(),
                )
            })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    // 100 coins cover exactly three 30-coin debits.
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
    assert_eq!(ledger.balance(user), Coins::new(10));
    assert_eq!(ledger.completed_total(user), 10);
}

/// One user spamming join: one participation, one debit, the rest rejected.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_duplicate_joins_charge_once() {
    let (coordinator, ledger, catalog) = engine();
    let tournament = open_tournament(&catalog, 40, 8);
    let user = UserId::new();
    ledger
        .credit(user, Coins::new(200), EntryKind::Purchase, EntryRefs::none())
        .unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.join(user, tournament) })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(JoinError::AlreadyJoined)))
            .count(),
        15
    );
    assert_eq!(coordinator.balance(user), Coins::new(160));
    assert_eq!(coordinator.occupancy(tournament), (1, 8));
}

/// Racing success notifications for one payment credit the balance once.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn racing_reconciliations_credit_once() {
    let (_, ledger, _) = engine();
    let reconciler = Arc::new(PaymentReconciler::new(ledger.clone()));
    let user = UserId::new();
    ledger
        .record_pending(user, Coins::new(500), EntryKind::Purchase, "pi_race")
        .unwrap();

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let reconciler = Arc::clone(&reconciler);
            tokio::spawn(async move { reconciler.on_payment_succeeded("pi_race") })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    // Every delivery is accepted; exactly one actually applied.
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Ok(rec) if !rec.duplicate))
            .count(),
        1
    );
    assert_eq!(ledger.balance(user), Coins::new(500));
}
