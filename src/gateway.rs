//! Payment gateway seam.
//!
//! Abstraction over payment processors like Stripe or `PayPal`. The engine
//! only needs one call: create a payment intent for a coin lot. Outcome
//! notifications arrive later through [`crate::reconciliation`]; signature
//! verification of those notifications is the integration layer's problem and
//! is assumed done before anything reaches this crate.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Payment gateway result.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Payment gateway error.
///
/// Everything here is retryable by the user; the engine records nothing when
/// intent creation fails.
#[derive(Debug, Clone)]
pub enum GatewayError {
    /// The gateway could not be reached.
    Unreachable {
        /// Transport-level reason.
        reason: String,
    },
    /// The gateway refused the request.
    Rejected {
        /// Refusal reason.
        reason: String,
    },
    /// The gateway did not answer in time.
    Timeout,
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unreachable { reason } => write!(f, "gateway unreachable: {reason}"),
            Self::Rejected { reason } => write!(f, "gateway rejected request: {reason}"),
            Self::Timeout => write!(f, "gateway timeout"),
        }
    }
}

impl std::error::Error for GatewayError {}

/// A created payment intent.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    /// Gateway-assigned intent id; reconciliation is keyed by this.
    pub intent_id: String,
    /// Client secret the caller hands to the front end.
    pub client_secret: String,
    /// Amount the intent covers, in cents.
    pub amount_cents: u64,
}

/// Payment gateway trait.
///
/// Returns boxed futures rather than `async fn` to stay dyn-compatible.
pub trait PaymentGateway: Send + Sync {
    /// Creates a payment intent for the given amount.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] when the gateway is unreachable or refuses.
    fn create_payment_intent(
        &self,
        amount_cents: u64,
        metadata: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<PaymentIntent>> + Send>>;
}

/// Mock payment gateway (always succeeds, for development and tests).
#[derive(Clone, Debug)]
pub struct MockPaymentGateway;

impl MockPaymentGateway {
    /// Creates a new mock gateway.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Creates an Arc-wrapped instance for sharing.
    #[must_use]
    pub fn shared() -> Arc<dyn PaymentGateway> {
        Arc::new(Self::new())
    }
}

impl Default for MockPaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentGateway for MockPaymentGateway {
    fn create_payment_intent(
        &self,
        amount_cents: u64,
        metadata: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<PaymentIntent>> + Send>> {
        Box::pin(async move {
            // Simulate network delay
            tokio::time::sleep(tokio::time::Duration::from_millis(25)).await;

            let intent_id = format!("pi_mock_{}", uuid::Uuid::new_v4().simple());
            let client_secret = format!("{intent_id}_secret_{}", uuid::Uuid::new_v4().simple());

            tracing::info!(
                intent_id = %intent_id,
                amount_cents,
                %metadata,
                "mock payment intent created"
            );

            Ok(PaymentIntent {
                intent_id,
                client_secret,
                amount_cents,
            })
        })
    }
}

/// Gateway double that always fails, for exercising the retryable path.
#[derive(Clone, Debug, Default)]
pub struct UnreachablePaymentGateway;

impl PaymentGateway for UnreachablePaymentGateway {
    fn create_payment_intent(
        &self,
        _amount_cents: u64,
        _metadata: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<PaymentIntent>> + Send>> {
        Box::pin(async move {
            Err(GatewayError::Unreachable {
                reason: "connection refused".to_string(),
            })
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_gateway_creates_intents() {
        let gateway = MockPaymentGateway::new();
        let intent = gateway
            .create_payment_intent(5000, serde_json::json!({ "user": "test" }))
            .await
            .unwrap();

        assert!(intent.intent_id.starts_with("pi_mock_"));
        assert_eq!(intent.amount_cents, 5000);
    }

    #[tokio::test]
    async fn unreachable_gateway_always_fails() {
        let gateway = UnreachablePaymentGateway;
        let result = gateway
            .create_payment_intent(5000, serde_json::Value::Null)
            .await;
        assert!(matches!(result, Err(GatewayError::Unreachable { .. })));
    }
}
