//! Provider webhook intake.
//!
//! Verifies the signature over the raw body, persists the event to the
//! durable queue and acknowledges immediately. Settlement runs in the
//! webhook worker, not in the request path, so a slow database never makes
//! the provider time out and re-deliver.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use secrecy::ExposeSecret;

use crate::payments::webhook::{self, PaymentEvent};
use crate::state::AppState;

/// Header carrying the `t=...,v1=...` signature.
const SIGNATURE_HEADER: &str = "stripe-signature";

/// POST /webhook
///
/// Returns 400 for a missing or malformed signature header, 401 for a
/// well-formed signature that fails verification, and 200 for everything
/// once the signature has passed, whether or not the event is ours to
/// process. The one exception is a failed queue write, answered with 500
/// so the provider redelivers instead of the event being lost.
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        tracing::warn!("webhook delivery without signature header");
        return StatusCode::BAD_REQUEST;
    };

    let secret = state.config().payment.webhook_secret.expose_secret();
    let now = chrono::Utc::now().timestamp();
    match webhook::verify_signature(&body, signature, secret, now) {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!("webhook signature verification failed");
            return StatusCode::UNAUTHORIZED;
        }
        Err(e) => {
            tracing::warn!(error = %e, "malformed webhook signature header");
            return StatusCode::BAD_REQUEST;
        }
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            // Authentic delivery we cannot read; acknowledge and drop.
            tracing::warn!(error = %e, "webhook body is not valid JSON; dropped");
            return StatusCode::OK;
        }
    };

    let event_id = match webhook::event_id(&payload) {
        Ok(id) => id.to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "webhook payload missing event id; dropped");
            return StatusCode::OK;
        }
    };

    // Cheap pre-filter: events that settlement would ignore anyway are
    // acknowledged without touching the queue.
    match webhook::parse_event(&payload) {
        Ok(PaymentEvent::Payment { .. }) => {}
        Ok(PaymentEvent::CardSetupCompleted | PaymentEvent::Unhandled(_)) => {
            tracing::debug!(event_id, "webhook event acknowledged without processing");
            return StatusCode::OK;
        }
        // A payment event we cannot type still gets queued: the worker
        // parks it as failed, which keeps it visible for operators.
        Err(e) => {
            tracing::warn!(event_id, error = %e, "payment event missing required fields");
        }
    }

    match state.events().enqueue(&event_id, &payload).await {
        Ok(true) => {
            tracing::info!(event_id, "webhook event queued for settlement");
            StatusCode::OK
        }
        Ok(false) => {
            tracing::debug!(event_id, "duplicate webhook delivery collapsed");
            StatusCode::OK
        }
        Err(e) => {
            // Refusing the delivery makes the provider retry later.
            tracing::error!(event_id, error = %e, "failed to persist webhook event");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
