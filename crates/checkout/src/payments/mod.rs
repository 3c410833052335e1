//! Payment processor integration.
//!
//! [`PaymentProvider`] is the authorization-issuing seam; [`StripeGateway`]
//! is the production implementation. Webhook signature verification and
//! event parsing live in [`webhook`].

pub mod stripe;
pub mod webhook;

pub use stripe::StripeGateway;

use async_trait::async_trait;
use thiserror::Error;

use quayside_core::{AddressId, BuyerId, ItemId, Money};

/// Metadata discriminator attached to every authorization we create. The
/// webhook endpoint may be shared with unrelated integrations; events
/// without this tag are ignored.
pub const APP_TAG: &str = "quayside-checkout";

/// Currency for all charges; the marketplace is single-currency.
pub const CURRENCY: &str = "usd";

/// Errors from the payment provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Provider unreachable or transport-level failure.
    #[error("payment provider unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    /// Provider rejected the request.
    #[error("payment provider error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Provider response did not have the expected shape.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Metadata bag recorded on the authorization. Sufficient for the
/// settlement reconciler to identify and re-verify the charge without
/// trusting client input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentMetadata {
    pub buyer: BuyerId,
    pub items: Vec<ItemId>,
    pub address: AddressId,
    /// Subtotal declared at issuance. Evidence of intent only; settlement
    /// recomputes from authoritative prices.
    pub declared_subtotal: Money,
}

impl IntentMetadata {
    /// Serialize the item set for the provider's flat metadata map.
    #[must_use]
    pub fn items_csv(&self) -> String {
        self.items
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Request to create a payment authorization.
#[derive(Debug, Clone)]
pub struct CreateIntent {
    /// Total charge in minor units (subtotal + service fee).
    pub amount: Money,
    /// Processor customer reference for the buyer.
    pub customer_ref: String,
    /// Client-generated token making a retried request safe.
    pub idempotency_key: String,
    pub metadata: IntentMetadata,
}

/// Opaque client-facing authorization handle.
#[derive(Debug, Clone)]
pub struct ProviderAuthorization {
    /// Provider transaction id (payment intent id).
    pub payment_intent_id: String,
    /// Secret the payment UI uses to confirm the charge.
    pub client_secret: String,
    /// Ephemeral credential scoped to the customer.
    pub ephemeral_key: String,
    /// Processor customer id, echoed back for the payment UI.
    pub customer_id: String,
}

/// Issues payment authorizations against the processor.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a payment authorization for a fixed total, tagged with the
    /// metadata bag and guarded by the idempotency key: a retried request
    /// with the same key does not create a second authorization.
    ///
    /// # Errors
    ///
    /// `Unreachable` on transport failure, `Api` when the processor
    /// rejects the request.
    async fn create_payment_intent(
        &self,
        request: &CreateIntent,
    ) -> Result<ProviderAuthorization, ProviderError>;
}
