//! Settlement reconciler.
//!
//! Consumes verified payment-outcome events and converts them into durable
//! orders or compensating releases. The amount actually charged is checked
//! against a total recomputed from authoritative item prices; authorization
//! metadata is evidence of intent, never ground truth for pricing.
//!
//! Idempotence and ordering: duplicate delivery of a terminal notification
//! is a no-op (the order row keyed by provider transaction id is the
//! dedupe), and the first terminal transition wins structurally - `complete`
//! only consumes `reserved` rows and `release` never touches `sold` rows.

use quayside_core::fees;
use quayside_core::{Money, OrderId};

use crate::payments::webhook::{PaymentEvent, PaymentOutcome};
use crate::payments::{APP_TAG, IntentMetadata};
use crate::store::{CompleteOrder, InventoryStore, StoreError};

/// Permitted difference between the charged amount and the recomputed
/// total, in minor units (rounding slack, nothing more).
pub const AMOUNT_TOLERANCE_MINOR: i64 = 1;

/// What reconciliation did with an event.
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// Charge verified; order created, items sold.
    Completed(OrderId),
    /// An order for this transaction already exists; duplicate delivery.
    AlreadySettled,
    /// Failed/canceled outcome; reservation released (count of items
    /// actually flipped).
    Released(u64),
    /// Charged amount does not match the recomputed total. Reservation
    /// released, no order created.
    IntegrityMismatch { expected: Money, charged: Money },
    /// Charge succeeded but completion lost a race; reservation released,
    /// manual remediation required.
    CompletionRace,
    /// Event is not ours to settle.
    Ignored(String),
}

/// Process one payment event against the store.
///
/// # Errors
///
/// Returns [`StoreError`] only for transient store failures; the caller
/// (the webhook worker) retries those. Every business-level result,
/// including integrity failures, is an `Ok` outcome.
pub async fn process_event(
    event: &PaymentEvent,
    store: &dyn InventoryStore,
) -> Result<ReconcileOutcome, StoreError> {
    let (outcome, transaction_id, amount_received, app_tag, metadata) = match event {
        PaymentEvent::Payment {
            outcome,
            transaction_id,
            amount_received,
            app_tag,
            metadata,
        } => (outcome, transaction_id, *amount_received, app_tag, metadata),
        PaymentEvent::CardSetupCompleted => {
            return Ok(ReconcileOutcome::Ignored("card setup event".to_string()));
        }
        PaymentEvent::Unhandled(event_type) => {
            return Ok(ReconcileOutcome::Ignored(format!(
                "unhandled event type {event_type}"
            )));
        }
    };

    // The webhook endpoint may be shared with unrelated integrations.
    if app_tag.as_deref() != Some(APP_TAG) {
        return Ok(ReconcileOutcome::Ignored("foreign app tag".to_string()));
    }

    let Some(metadata) = metadata else {
        tracing::error!(
            transaction_id,
            "payment event carries our app tag but unusable metadata"
        );
        return Ok(ReconcileOutcome::Ignored("unusable metadata".to_string()));
    };

    match outcome {
        PaymentOutcome::Succeeded => {
            settle_success(store, transaction_id, amount_received, metadata).await
        }
        PaymentOutcome::Failed | PaymentOutcome::Canceled => {
            // Unconditional compensation. Release is scoped to reserved
            // rows, so a late canceled after a settled sale is a no-op.
            let released = store.release(&metadata.items).await?;
            tracing::info!(
                transaction_id,
                released,
                outcome = ?outcome,
                "reservation released after terminal payment failure"
            );
            Ok(ReconcileOutcome::Released(released))
        }
    }
}

async fn settle_success(
    store: &dyn InventoryStore,
    transaction_id: &str,
    charged: Money,
    metadata: &IntentMetadata,
) -> Result<ReconcileOutcome, StoreError> {
    // Duplicate delivery: the same notification may arrive more than once.
    if let Some(order_id) = store.find_order_by_transaction(transaction_id).await? {
        tracing::debug!(transaction_id, %order_id, "duplicate settlement notification");
        return Ok(ReconcileOutcome::AlreadySettled);
    }

    // Recompute from authoritative prices, never from the declared subtotal.
    let prices = match store.current_prices(&metadata.items).await {
        Ok(prices) => prices,
        Err(StoreError::DataCorruption(detail)) => {
            let released = store.release(&metadata.items).await?;
            tracing::error!(
                transaction_id,
                released,
                detail,
                alert = "integrity_mismatch",
                "settlement references unknown items; reservation released"
            );
            return Ok(ReconcileOutcome::IntegrityMismatch {
                expected: Money::ZERO,
                charged,
            });
        }
        Err(e) => return Err(e),
    };

    let subtotal: Money = prices.iter().map(|(_, price)| *price).sum();
    if subtotal != metadata.declared_subtotal {
        tracing::warn!(
            transaction_id,
            declared = metadata.declared_subtotal.minor(),
            recomputed = subtotal.minor(),
            "declared subtotal diverges from authoritative prices"
        );
    }

    let expected = fees::order_total(subtotal);
    if expected.abs_diff(charged).minor() > AMOUNT_TOLERANCE_MINOR {
        let released = store.release(&metadata.items).await?;
        tracing::error!(
            transaction_id,
            expected = expected.minor(),
            charged = charged.minor(),
            released,
            alert = "integrity_mismatch",
            "charged amount does not match recomputed total; no order created"
        );
        return Ok(ReconcileOutcome::IntegrityMismatch { expected, charged });
    }

    let order = CompleteOrder {
        buyer: metadata.buyer,
        items: metadata.items.clone(),
        address: metadata.address,
        total: expected,
        service_fee: fees::service_fee(subtotal),
        transaction_id: transaction_id.to_string(),
    };

    match store.complete(&order).await {
        Ok(order_id) => {
            tracing::info!(transaction_id, %order_id, total = expected.minor(), "order settled");
            Ok(ReconcileOutcome::Completed(order_id))
        }
        Err(StoreError::CompletionConflict) => {
            // The charge already happened; money and inventory have
            // diverged. Release what is still held and page a human.
            let released = store.release(&metadata.items).await?;
            tracing::error!(
                transaction_id,
                released,
                alert = "reconciliation_failure",
                "charge succeeded but completion lost a race; manual remediation required"
            );
            Ok(ReconcileOutcome::CompletionRace)
        }
        Err(e) => Err(e),
    }
}
