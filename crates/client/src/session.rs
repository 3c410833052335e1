//! The client-side checkout session.
//!
//! Drives the reserve -> pay -> settle flow from the buyer's device:
//! `begin_checkout` reserves the items and obtains the payment sheet
//! parameters, the app presents the payment UI, and `finish` either lets
//! the settled reservation stand or releases it when the buyer backed out.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use quayside_core::{AddressId, ItemId};

use crate::error::ClientError;

/// Thin HTTP client for the checkout service.
#[derive(Debug, Clone)]
pub struct CheckoutClient {
    http: reqwest::Client,
    base_url: String,
    bearer_token: String,
}

/// Everything the payment UI needs to present the payment sheet.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentSheet {
    pub payment_intent_id: String,
    pub client_secret: String,
    pub ephemeral_key: String,
    pub customer_id: String,
    /// Sum of item prices, minor units.
    pub subtotal: i64,
    /// Marketplace service fee, minor units.
    pub service_fee: i64,
    /// Amount the buyer will be charged, minor units.
    pub total: i64,
}

#[derive(Serialize)]
struct CreatePaymentIntentRequest<'a> {
    item_ids: &'a [ItemId],
    address_id: AddressId,
    idempotency_key: &'a str,
}

#[derive(Serialize)]
struct ReleaseRequest<'a> {
    item_ids: &'a [ItemId],
}

#[derive(Deserialize)]
struct ReleaseResponse {
    released: u64,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    code: Option<String>,
    message: Option<String>,
}

impl CheckoutClient {
    /// Create a client against a checkout service base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            bearer_token: bearer_token.into(),
        }
    }

    /// Reserve `item_ids` and open a checkout session with a fresh
    /// idempotency key.
    ///
    /// Failures are never retried here; the app decides whether to try
    /// again. An app that retries a gateway error should hold its own key
    /// and use [`begin_checkout_with_key`](Self::begin_checkout_with_key)
    /// so both attempts carry the same one. Stock contention surfaces as a
    /// [`ClientError::Api`] with code `STOCK_UNAVAILABLE`; nothing is held
    /// in that case.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the reservation or authorization fails.
    pub async fn begin_checkout(
        &self,
        item_ids: Vec<ItemId>,
        address_id: AddressId,
    ) -> Result<CheckoutSession, ClientError> {
        let idempotency_key = Uuid::new_v4().to_string();
        self.begin_checkout_with_key(item_ids, address_id, &idempotency_key)
            .await
    }

    /// Like [`begin_checkout`](Self::begin_checkout) with a caller-held
    /// idempotency key. Reusing the key across an explicit retry cannot
    /// produce a second authorization for the same attempt.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] when the reservation or authorization fails.
    pub async fn begin_checkout_with_key(
        &self,
        item_ids: Vec<ItemId>,
        address_id: AddressId,
        idempotency_key: &str,
    ) -> Result<CheckoutSession, ClientError> {
        let request = CreatePaymentIntentRequest {
            item_ids: &item_ids,
            address_id,
            idempotency_key,
        };

        let body = self.post_json("/create-payment-intent", &request).await?;
        let payment: PaymentSheet = serde_json::from_value(body)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

        Ok(CheckoutSession {
            client: self.clone(),
            items: item_ids,
            payment,
            payment_succeeded: false,
            finished: false,
        })
    }

    /// Release reserved items. Idempotent.
    async fn release(&self, items: &[ItemId]) -> Result<u64, ClientError> {
        let body = self
            .post_json("/release", &ReleaseRequest { item_ids: items })
            .await?;
        let response: ReleaseResponse = serde_json::from_value(body)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        Ok(response.released)
    }

    async fn post_json<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<serde_json::Value, ClientError> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.bearer_token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let detail = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|b| b.error);
        Err(ClientError::Api {
            status: status.as_u16(),
            code: detail
                .as_ref()
                .and_then(|d| d.code.clone())
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            message: detail
                .and_then(|d| d.message)
                .unwrap_or_else(|| "unknown checkout error".to_string()),
        })
    }
}

/// An open checkout: items reserved, authorization issued, payment UI in
/// flight. Call [`mark_payment_succeeded`](Self::mark_payment_succeeded)
/// when the payment UI reports success, then [`finish`](Self::finish)
/// exactly once on every path out of checkout.
#[derive(Debug)]
pub struct CheckoutSession {
    client: CheckoutClient,
    items: Vec<ItemId>,
    payment: PaymentSheet,
    payment_succeeded: bool,
    finished: bool,
}

impl CheckoutSession {
    /// Parameters for the payment sheet UI.
    #[must_use]
    pub fn payment_sheet(&self) -> &PaymentSheet {
        &self.payment
    }

    /// Items held by this session.
    #[must_use]
    pub fn items(&self) -> &[ItemId] {
        &self.items
    }

    /// Record that the payment UI reported a successful charge. After this,
    /// [`finish`](Self::finish) leaves the reservation for settlement
    /// instead of releasing it.
    pub fn mark_payment_succeeded(&mut self) {
        self.payment_succeeded = true;
    }

    /// Close the session. Releases the reservation unless the payment
    /// succeeded, in which case the server-side settlement flow owns the
    /// items from here.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the release call fails; the server-side
    /// reservation TTL is the backstop in that case.
    pub async fn finish(mut self) -> Result<(), ClientError> {
        if self.finished {
            return Err(ClientError::SessionState("session already finished".into()));
        }
        self.finished = true;

        if self.payment_succeeded {
            tracing::debug!(
                payment_intent_id = self.payment.payment_intent_id,
                "checkout finished; awaiting settlement"
            );
            return Ok(());
        }

        let released = self.client.release(&self.items).await?;
        tracing::debug!(released, "checkout abandoned; reservation released");
        Ok(())
    }
}

impl Drop for CheckoutSession {
    fn drop(&mut self) {
        // Advisory only: an async release can't run here. The server-side
        // TTL sweeper reclaims anything a crashed client leaves behind.
        if !self.finished {
            tracing::warn!(
                payment_intent_id = self.payment.payment_intent_id,
                "checkout session dropped without finish(); items remain reserved until TTL"
            );
        }
    }
}
