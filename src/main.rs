//! CLI demo for the arena ledger engine.
//!
//! Walks the full flow: purchase coins, reconcile the gateway callback, join
//! a capacity-limited tournament, hit the full/insufficient paths, leave with
//! a refund, and print the audit history.

use arena_ledger::{
    CapacityTracker, Coins, Config, EntryCoordinator, InMemoryCatalog, JoinError, LedgerStore,
    MockPaymentGateway, PaymentReconciler, PurchaseService, SystemClock, Tournament, TournamentId,
    TournamentStatus, UserId,
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    arena_ledger::metrics::register_business_metrics();

    println!("=== Arena Ledger: coins and tournament entries ===\n");

    let config = Config::from_env();
    let clock = Arc::new(SystemClock);
    let ledger = Arc::new(LedgerStore::new(clock.clone()));
    let tracker = Arc::new(CapacityTracker::new());
    let catalog = Arc::new(InMemoryCatalog::new());
    let purchases = PurchaseService::new(
        ledger.clone(),
        MockPaymentGateway::shared(),
        config.clone(),
    );
    let reconciler = PaymentReconciler::new(ledger.clone());
    let coordinator = EntryCoordinator::new(
        ledger.clone(),
        tracker,
        catalog.clone(),
        clock,
        config,
    );

    let alice = UserId::new();
    let bob = UserId::new();
    let carol = UserId::new();

    // Alice buys a coin lot; the gateway later confirms it.
    println!("Alice buys 500 coins...");
    let receipt = purchases.initiate_purchase(alice, Coins::new(500)).await?;
    println!("  intent {} pending, balance {}", receipt.intent_id, coordinator.balance(alice));

    reconciler.on_payment_succeeded(&receipt.intent_id)?;
    println!("  payment confirmed, balance {}\n", coordinator.balance(alice));

    // Bob's card is declined by the gateway callback.
    println!("Bob buys 100 coins, but the payment fails...");
    let receipt = purchases.initiate_purchase(bob, Coins::new(100)).await?;
    reconciler.on_payment_failed(&receipt.intent_id)?;
    println!("  balance {}", coordinator.balance(bob));

    // A payout tops Bob up instead.
    coordinator.award_payout(bob, Coins::new(60), None)?;
    println!("  payout of 60 lands, balance {}\n", coordinator.balance(bob));

    // A two-seat tournament starting in an hour.
    let tournament = Tournament {
        id: TournamentId::new(),
        name: "Evening Clash".to_string(),
        entry_fee: Coins::new(40),
        max_participants: 2,
        starts_at: Utc::now() + Duration::hours(1),
        status: TournamentStatus::Registering,
    };
    let tournament_id = tournament.id;
    println!(
        "Tournament '{}': fee {}, {} seats",
        tournament.name, tournament.entry_fee, tournament.max_participants
    );
    catalog.upsert(tournament);

    println!("Alice joins...");
    coordinator.join(alice, tournament_id)?;
    println!("Bob joins...");
    coordinator.join(bob, tournament_id)?;
    let (current, max) = coordinator.occupancy(tournament_id);
    println!("  occupancy {current}/{max}");

    println!("Carol tries to join...");
    match coordinator.join(carol, tournament_id) {
        Err(JoinError::TournamentFull { current, max }) => {
            println!("  rejected: tournament full ({current}/{max})");
        }
        other => println!("  unexpected result: {other:?}"),
    }

    println!("\nAlice leaves before the cutoff...");
    let outcome = coordinator.leave(alice, tournament_id)?;
    println!(
        "  refunded entry {:?}, balance {}",
        outcome.refund_entry,
        coordinator.balance(alice)
    );
    let (current, max) = coordinator.occupancy(tournament_id);
    println!("  occupancy {current}/{max}");

    println!("\nAlice's history (newest first):");
    for entry in coordinator.history(alice, 0, 10).items {
        println!(
            "  {:>8} {:<17} {:>6}  {}",
            entry.signed_amount,
            entry.kind.to_string(),
            entry.status.to_string(),
            entry.created_at.format("%H:%M:%S")
        );
    }

    Ok(())
}
