//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::CheckoutConfig;
use crate::events::WebhookEventQueue;
use crate::payments::PaymentProvider;
use crate::store::InventoryStore;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// inventory store, payment provider and webhook event queue behind their
/// trait seams, so tests can swap in in-memory implementations.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: CheckoutConfig,
    store: Arc<dyn InventoryStore>,
    provider: Arc<dyn PaymentProvider>,
    events: Arc<dyn WebhookEventQueue>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        config: CheckoutConfig,
        store: Arc<dyn InventoryStore>,
        provider: Arc<dyn PaymentProvider>,
        events: Arc<dyn WebhookEventQueue>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                provider,
                events,
            }),
        }
    }

    /// Get a reference to the checkout configuration.
    #[must_use]
    pub fn config(&self) -> &CheckoutConfig {
        &self.inner.config
    }

    /// Get a reference to the inventory store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn InventoryStore> {
        &self.inner.store
    }

    /// Get a reference to the payment provider.
    #[must_use]
    pub fn provider(&self) -> &Arc<dyn PaymentProvider> {
        &self.inner.provider
    }

    /// Get a reference to the webhook event queue.
    #[must_use]
    pub fn events(&self) -> &Arc<dyn WebhookEventQueue> {
        &self.inner.events
    }
}
