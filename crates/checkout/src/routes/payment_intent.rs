//! Checkout initiation: reserve items and issue a payment authorization.

use std::collections::HashSet;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use quayside_core::fees;
use quayside_core::{AddressId, BuyerId, ItemId};

use crate::error::{AppError, Result};
use crate::extract::AppJson;
use crate::middleware::AuthedBuyer;
use crate::payments::{CreateIntent, IntentMetadata};
use crate::state::AppState;

/// Upper bound on items in one checkout; keeps the metadata CSV within the
/// provider's per-field limit.
const MAX_ITEMS_PER_CHECKOUT: usize = 20;

#[derive(Debug, Deserialize)]
pub struct CreatePaymentIntentRequest {
    pub item_ids: Vec<ItemId>,
    pub address_id: AddressId,
    /// Client-generated token; a retried request with the same token does
    /// not create a second authorization. Generated server-side when
    /// absent.
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatePaymentIntentResponse {
    pub payment_intent_id: String,
    pub client_secret: String,
    pub ephemeral_key: String,
    pub customer_id: String,
    /// Sum of current item prices, minor units.
    pub subtotal: i64,
    /// Marketplace service fee, minor units.
    pub service_fee: i64,
    /// Amount the authorization was created for, minor units.
    pub total: i64,
}

/// POST /create-payment-intent
///
/// Atomically reserves the requested items, then issues a payment
/// authorization for the recomputed total. On any failure after the
/// reservation succeeded, the reservation is released before the error is
/// returned; items are never left held by a checkout that got no
/// authorization.
pub async fn create(
    State(state): State<AppState>,
    AuthedBuyer(buyer): AuthedBuyer,
    AppJson(request): AppJson<CreatePaymentIntentRequest>,
) -> Result<Json<CreatePaymentIntentResponse>> {
    validate(&request)?;

    let idempotency_key = request
        .idempotency_key
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let store = state.store();
    let reservation = store.reserve(&request.item_ids, buyer).await?;

    // Everything past this point must compensate on failure.
    let customer_ref = match store.customer_ref(buyer).await {
        Ok(Some(customer_ref)) => customer_ref,
        Ok(None) => {
            release_quietly(&state, &request.item_ids, buyer).await;
            tracing::warn!(%buyer, "checkout attempted without a payment profile");
            return Err(AppError::CustomerNotFound);
        }
        Err(e) => {
            release_quietly(&state, &request.item_ids, buyer).await;
            return Err(e.into());
        }
    };

    let subtotal = reservation.subtotal;
    let service_fee = fees::service_fee(subtotal);
    let total = fees::order_total(subtotal);

    let intent = CreateIntent {
        amount: total,
        customer_ref,
        idempotency_key,
        metadata: IntentMetadata {
            buyer,
            items: request.item_ids.clone(),
            address: request.address_id,
            declared_subtotal: subtotal,
        },
    };

    let authorization = match state.provider().create_payment_intent(&intent).await {
        Ok(authorization) => authorization,
        Err(e) => {
            release_quietly(&state, &request.item_ids, buyer).await;
            return Err(e.into());
        }
    };

    tracing::info!(
        %buyer,
        payment_intent_id = authorization.payment_intent_id,
        items = request.item_ids.len(),
        total = total.minor(),
        "payment authorization issued"
    );

    Ok(Json(CreatePaymentIntentResponse {
        payment_intent_id: authorization.payment_intent_id,
        client_secret: authorization.client_secret,
        ephemeral_key: authorization.ephemeral_key,
        customer_id: authorization.customer_id,
        subtotal: subtotal.minor(),
        service_fee: service_fee.minor(),
        total: total.minor(),
    }))
}

fn validate(request: &CreatePaymentIntentRequest) -> Result<()> {
    if request.item_ids.is_empty() {
        return Err(AppError::Validation("item_ids must not be empty".into()));
    }
    if request.item_ids.len() > MAX_ITEMS_PER_CHECKOUT {
        return Err(AppError::Validation(format!(
            "at most {MAX_ITEMS_PER_CHECKOUT} items per checkout"
        )));
    }
    let unique: HashSet<Uuid> = request.item_ids.iter().map(|id| id.as_uuid()).collect();
    if unique.len() != request.item_ids.len() {
        return Err(AppError::Validation("item_ids contains duplicates".into()));
    }
    if request
        .idempotency_key
        .as_deref()
        .is_some_and(|key| key.trim().is_empty())
    {
        return Err(AppError::Validation(
            "idempotency_key must not be blank".into(),
        ));
    }
    Ok(())
}

/// Best-effort compensating release, scoped to the reserving buyer; the
/// TTL sweeper is the backstop if this fails too.
async fn release_quietly(state: &AppState, items: &[ItemId], buyer: BuyerId) {
    if let Err(e) = state.store().release_for(items, buyer).await {
        tracing::error!(error = %e, "failed to release reservation after checkout error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(item_ids: Vec<ItemId>, idempotency_key: Option<&str>) -> CreatePaymentIntentRequest {
        CreatePaymentIntentRequest {
            item_ids,
            address_id: AddressId::generate(),
            idempotency_key: idempotency_key.map(ToString::to_string),
        }
    }

    #[test]
    fn test_empty_items_rejected() {
        assert!(validate(&request(vec![], Some("key-1"))).is_err());
    }

    #[test]
    fn test_duplicate_items_rejected() {
        let id = ItemId::generate();
        assert!(validate(&request(vec![id, id], Some("key-1"))).is_err());
    }

    #[test]
    fn test_blank_idempotency_key_rejected() {
        assert!(validate(&request(vec![ItemId::generate()], Some("  "))).is_err());
    }

    #[test]
    fn test_missing_idempotency_key_accepted() {
        assert!(validate(&request(vec![ItemId::generate()], None)).is_ok());
    }

    #[test]
    fn test_valid_request_accepted() {
        let items = vec![ItemId::generate(), ItemId::generate()];
        assert!(validate(&request(items, Some("key-1"))).is_ok());
    }
}
