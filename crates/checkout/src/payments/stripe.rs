//! Stripe payment gateway.
//!
//! Talks to the Stripe REST API with form-encoded requests. The
//! `Idempotency-Key` header carries the client-generated token so a retried
//! issue request cannot create a second authorization.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{
    APP_TAG, CURRENCY, CreateIntent, PaymentProvider, ProviderAuthorization, ProviderError,
};

/// Pinned Stripe API version for ephemeral key creation.
const STRIPE_VERSION: &str = "2024-06-20";

/// Payment provider backed by the Stripe API.
pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: SecretString,
}

#[derive(Deserialize)]
struct PaymentIntentResponse {
    id: String,
    client_secret: Option<String>,
}

#[derive(Deserialize)]
struct EphemeralKeyResponse {
    secret: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

impl StripeGateway {
    /// Create a gateway against an API base URL (overridable for tests).
    #[must_use]
    pub fn new(api_base: impl Into<String>, secret_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
            secret_key,
        }
    }

    async fn post_form(
        &self,
        path: &str,
        form: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> Result<serde_json::Value, ProviderError> {
        let mut request = self
            .client
            .post(format!("{}{path}", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .header("Stripe-Version", STRIPE_VERSION)
            .form(form);

        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body: serde_json::Value = response.json().await?;

        if !status.is_success() {
            let message = serde_json::from_value::<ApiErrorBody>(body)
                .ok()
                .and_then(|b| b.error)
                .and_then(|e| e.message)
                .unwrap_or_else(|| "unknown provider error".to_string());
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(body)
    }
}

#[async_trait::async_trait]
impl PaymentProvider for StripeGateway {
    async fn create_payment_intent(
        &self,
        request: &CreateIntent,
    ) -> Result<ProviderAuthorization, ProviderError> {
        let meta = &request.metadata;
        let form = vec![
            ("amount".to_string(), request.amount.minor().to_string()),
            ("currency".to_string(), CURRENCY.to_string()),
            ("customer".to_string(), request.customer_ref.clone()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
            ("metadata[app]".to_string(), APP_TAG.to_string()),
            ("metadata[buyer_id]".to_string(), meta.buyer.to_string()),
            ("metadata[item_ids]".to_string(), meta.items_csv()),
            ("metadata[address_id]".to_string(), meta.address.to_string()),
            (
                "metadata[declared_subtotal]".to_string(),
                meta.declared_subtotal.minor().to_string(),
            ),
        ];

        let intent: PaymentIntentResponse = serde_json::from_value(
            self.post_form(
                "/v1/payment_intents",
                &form,
                Some(&request.idempotency_key),
            )
            .await?,
        )
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let client_secret = intent
            .client_secret
            .ok_or_else(|| ProviderError::InvalidResponse("missing client_secret".into()))?;

        let key_form = vec![("customer".to_string(), request.customer_ref.clone())];
        let ephemeral: EphemeralKeyResponse = serde_json::from_value(
            self.post_form("/v1/ephemeral_keys", &key_form, None).await?,
        )
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let ephemeral_key = ephemeral
            .secret
            .ok_or_else(|| ProviderError::InvalidResponse("missing ephemeral key secret".into()))?;

        Ok(ProviderAuthorization {
            payment_intent_id: intent.id,
            client_secret,
            ephemeral_key,
            customer_id: request.customer_ref.clone(),
        })
    }
}
