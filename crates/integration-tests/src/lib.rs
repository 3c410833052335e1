//! Integration test harness for the Quayside checkout service.
//!
//! Spins the full axum application up in-process on an ephemeral port,
//! backed by the in-memory store and event queue and a scripted payment
//! provider, so the end-to-end flow runs without `PostgreSQL` or Stripe.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use secrecy::SecretString;
use sha2::Sha256;

use quayside_checkout::config::{CheckoutConfig, PaymentConfig};
use quayside_checkout::events::MemoryEventQueue;
use quayside_checkout::middleware::auth::issue_token;
use quayside_checkout::payments::{
    CreateIntent, PaymentProvider, ProviderAuthorization, ProviderError,
};
use quayside_checkout::state::AppState;
use quayside_checkout::store::MemoryInventoryStore;
use quayside_core::{AddressId, BuyerId, ItemId};

/// High-entropy fixed secrets; the config loader rejects weak ones.
pub const AUTH_SECRET: &str = "k9Qz!t7W#mD2pXv4@bN8rL5eH1sGfJ3c";
pub const WEBHOOK_SECRET: &str = "whk_F4jR8#uL2xQ9@tB6mZ1!cV7pN3eK";

/// How the scripted provider answers `create_payment_intent`.
#[derive(Debug, Clone, Copy)]
pub enum ProviderScript {
    /// Issue a deterministic authorization.
    Succeed,
    /// Answer with a 503-class provider error.
    Unavailable,
}

/// Scripted [`PaymentProvider`] that records how often it was called.
pub struct FakeProvider {
    script: ProviderScript,
    calls: AtomicUsize,
}

impl FakeProvider {
    #[must_use]
    pub const fn new(script: ProviderScript) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of authorization requests received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    async fn create_payment_intent(
        &self,
        request: &CreateIntent,
    ) -> Result<ProviderAuthorization, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script {
            ProviderScript::Succeed => Ok(ProviderAuthorization {
                payment_intent_id: format!("pi_fake_{}", request.idempotency_key),
                client_secret: "pi_fake_secret".to_string(),
                ephemeral_key: "ek_fake".to_string(),
                customer_id: request.customer_ref.clone(),
            }),
            ProviderScript::Unavailable => Err(ProviderError::Api {
                status: 503,
                message: "provider down for maintenance".to_string(),
            }),
        }
    }
}

/// A running in-process checkout service plus handles to its internals.
pub struct TestApp {
    pub addr: SocketAddr,
    pub store: Arc<MemoryInventoryStore>,
    pub events: Arc<MemoryEventQueue>,
    pub provider: Arc<FakeProvider>,
}

impl TestApp {
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Bearer token for a buyer, one hour validity.
    #[must_use]
    pub fn token_for(&self, buyer: BuyerId) -> String {
        issue_token(buyer, &SecretString::from(AUTH_SECRET), 3600).expect("token issues")
    }

    /// Run one settlement worker pass against this app's queue and store.
    pub async fn settle_pending(&self) -> usize {
        quayside_checkout::worker::run_once(self.events.as_ref(), self.store.as_ref())
            .await
            .expect("worker pass runs")
    }
}

fn test_config() -> CheckoutConfig {
    CheckoutConfig {
        database_url: SecretString::from("postgres://unused-in-memory-tests"),
        host: "127.0.0.1".parse().expect("valid host"),
        port: 0,
        auth_secret: SecretString::from(AUTH_SECRET),
        payment: PaymentConfig {
            api_base: "http://provider.invalid".to_string(),
            secret_key: SecretString::from("sk_test_unused"),
            webhook_secret: SecretString::from(WEBHOOK_SECRET),
        },
        reservation_ttl: chrono::Duration::minutes(30),
        sentry_dsn: None,
    }
}

/// Start the checkout service on an ephemeral port.
pub async fn spawn_app(script: ProviderScript) -> TestApp {
    let store = Arc::new(MemoryInventoryStore::new());
    let events = Arc::new(MemoryEventQueue::new());
    let provider = Arc::new(FakeProvider::new(script));

    let state = AppState::new(
        test_config(),
        store.clone(),
        provider.clone(),
        events.clone(),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(listener, quayside_checkout::app(state))
            .await
            .expect("test server runs");
    });

    TestApp {
        addr,
        store,
        events,
        provider,
    }
}

/// Sign a webhook body the way the provider does: `t=<ts>,v1=<hmac-hex>`
/// over `"{ts}.{body}"`.
#[must_use]
pub fn sign_webhook(body: &[u8]) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).expect("hmac key");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    )
}

/// Build a `payment_intent.succeeded` event payload for our app tag.
#[must_use]
pub fn succeeded_event(
    event_id: &str,
    transaction_id: &str,
    buyer: BuyerId,
    items: &[ItemId],
    address: AddressId,
    declared_subtotal: i64,
    amount_received: i64,
) -> serde_json::Value {
    let csv = items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    serde_json::json!({
        "id": event_id,
        "type": "payment_intent.succeeded",
        "data": { "object": {
            "id": transaction_id,
            "amount_received": amount_received,
            "metadata": {
                "app": "quayside-checkout",
                "buyer_id": buyer.to_string(),
                "item_ids": csv,
                "address_id": address.to_string(),
                "declared_subtotal": declared_subtotal.to_string()
            }
        }}
    })
}
