//! Purchase initiation: the synchronous half of the two-phase purchase.
//!
//! Buying a coin lot creates a payment intent at the gateway and records a
//! PENDING ledger entry keyed by the intent id. The entry has no balance
//! effect until [`crate::reconciliation`] resolves it from a gateway
//! notification. Resolution is keyed by the gateway's intent id, so the
//! intent must exist before the entry is recorded; a gateway failure
//! therefore leaves no ledger record behind and is retryable by the user.

use crate::config::Config;
use crate::gateway::{GatewayError, PaymentGateway};
use crate::ledger::{LedgerError, LedgerStore};
use crate::types::{Coins, EntryId, EntryKind, UserId};
use std::sync::Arc;
use thiserror::Error;

/// Why a purchase could not be initiated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PurchaseError {
    /// Zero-coin lots cannot be purchased.
    #[error("purchase amount must be greater than zero")]
    InvalidAmount,

    /// The priced amount does not fit the gateway's integer range.
    #[error("purchase amount is too large to price")]
    AmountTooLarge,

    /// The gateway could not be used; the user may retry. No ledger record
    /// was created.
    #[error("payment gateway unavailable: {reason}")]
    GatewayUnavailable {
        /// Underlying gateway error.
        reason: String,
    },

    /// Recording the pending entry failed after the intent was created.
    ///
    /// The orphaned intent is harmless (it is never resolved) but the
    /// incident is logged for investigation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Receipt handed back to the caller after a purchase is initiated.
#[derive(Debug, Clone)]
pub struct PurchaseReceipt {
    /// The PENDING ledger entry tracking this purchase.
    pub entry_id: EntryId,
    /// Gateway intent id; reconciliation resolves against this.
    pub intent_id: String,
    /// Client secret for the front end to complete the payment.
    pub client_secret: String,
    /// Coins the user will receive once the payment completes.
    pub coins: Coins,
}

/// Initiates coin-lot purchases against the gateway and the ledger.
pub struct PurchaseService {
    ledger: Arc<LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    config: Config,
}

impl PurchaseService {
    /// Creates a purchase service.
    #[must_use]
    pub fn new(ledger: Arc<LedgerStore>, gateway: Arc<dyn PaymentGateway>, config: Config) -> Self {
        Self {
            ledger,
            gateway,
            config,
        }
    }

    /// Initiates a purchase of `coins` for a user.
    ///
    /// # Errors
    ///
    /// - [`PurchaseError::InvalidAmount`] for zero-coin lots
    /// - [`PurchaseError::GatewayUnavailable`] when intent creation fails
    ///   (retryable; nothing recorded)
    /// - [`PurchaseError::Ledger`] when the pending entry cannot be recorded
    pub async fn initiate_purchase(
        &self,
        user_id: UserId,
        coins: Coins,
    ) -> Result<PurchaseReceipt, PurchaseError> {
        if coins.is_zero() {
            return Err(PurchaseError::InvalidAmount);
        }
        let amount_cents = coins
            .amount()
            .checked_mul(self.config.coin_price_cents)
            .ok_or(PurchaseError::AmountTooLarge)?;

        let metadata = serde_json::json!({
            "user_id": user_id.to_string(),
            "coins": coins.amount(),
        });

        let intent = self
            .gateway
            .create_payment_intent(amount_cents, metadata)
            .await
            .map_err(|e| {
                tracing::warn!(user_id = %user_id, error = %e, "payment intent creation failed");
                metrics::counter!("arena_purchases_total", "outcome" => "gateway_error")
                    .increment(1);
                match e {
                    GatewayError::Unreachable { .. }
                    | GatewayError::Rejected { .. }
                    | GatewayError::Timeout => PurchaseError::GatewayUnavailable {
                        reason: e.to_string(),
                    },
                }
            })?;

        let entry_id = self
            .ledger
            .record_pending(user_id, coins, EntryKind::Purchase, &intent.intent_id)
            .map_err(|e| {
                tracing::error!(
                    user_id = %user_id,
                    intent_id = %intent.intent_id,
                    error = %e,
                    "pending purchase could not be recorded; intent orphaned"
                );
                e
            })?;

        tracing::info!(
            user_id = %user_id,
            entry_id = %entry_id,
            intent_id = %intent.intent_id,
            coins = coins.amount(),
            amount_cents,
            "purchase initiated"
        );
        metrics::counter!("arena_purchases_total", "outcome" => "initiated").increment(1);

        Ok(PurchaseReceipt {
            entry_id,
            intent_id: intent.intent_id,
            client_secret: intent.client_secret,
            coins,
        })
    }
}

impl std::fmt::Debug for PurchaseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PurchaseService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
