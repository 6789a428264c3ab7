//! Business metrics for the ledger engine.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `arena_ledger_entries_total{kind, status}` - Ledger entries written
//! - `arena_coins_credited_total` / `arena_coins_debited_total` - Coin flow
//! - `arena_ledger_resolutions_total{status}` - Pending entries resolved
//! - `arena_tournament_joins_total{outcome}` - Join attempts by outcome
//! - `arena_tournament_leaves_total{outcome}` - Leave attempts by outcome
//! - `arena_purchases_total{outcome}` - Purchase initiations by outcome
//! - `arena_reconciliations_total{outcome}` - Gateway notifications by outcome
//! - `arena_payouts_total` - Payout credits
//!
//! Exporter wiring (Prometheus or otherwise) belongs to the host process;
//! this crate only records against the `metrics` facade.

use ::metrics::describe_counter;

/// Registers descriptions for all business metrics.
///
/// Call once at startup, before any metrics are recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "arena_ledger_entries_total",
        "Total ledger entries written, by kind and status"
    );
    describe_counter!(
        "arena_coins_credited_total",
        "Total coins credited to balances"
    );
    describe_counter!(
        "arena_coins_debited_total",
        "Total coins debited from balances"
    );
    describe_counter!(
        "arena_ledger_resolutions_total",
        "Total pending entries resolved, by terminal status"
    );
    describe_counter!(
        "arena_tournament_joins_total",
        "Total join attempts, by outcome"
    );
    describe_counter!(
        "arena_tournament_leaves_total",
        "Total leave attempts, by outcome"
    );
    describe_counter!(
        "arena_purchases_total",
        "Total purchase initiations, by outcome"
    );
    describe_counter!(
        "arena_reconciliations_total",
        "Total gateway payment notifications processed, by outcome"
    );
    describe_counter!("arena_payouts_total", "Total payout credits");
}
