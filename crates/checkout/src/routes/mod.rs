//! HTTP route handlers.

pub mod payment_intent;
pub mod release;
pub mod webhook;

use axum::Router;
use axum::routing::post;

use crate::state::AppState;

/// Build the checkout API router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/create-payment-intent", post(payment_intent::create))
        .route("/release", post(release::release))
        .route("/webhook", post(webhook::receive))
}
