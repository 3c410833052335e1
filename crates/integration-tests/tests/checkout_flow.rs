//! End-to-end checkout flow tests.
//!
//! Each test runs the real axum application in-process against the
//! in-memory store, drives it with the real client crate and delivers
//! signed webhook events the way the payment provider would.

use quayside_client::CheckoutClient;
use quayside_core::{AddressId, BuyerId, ItemId, ItemStatus, Money};
use quayside_integration_tests::{ProviderScript, TestApp, sign_webhook, spawn_app, succeeded_event};

struct Listings {
    buyer: BuyerId,
    items: Vec<ItemId>,
    address: AddressId,
}

/// Two items priced 1000 and 2000 minor units; buyer has a payment profile.
async fn seed_listings(app: &TestApp) -> Listings {
    let items = vec![ItemId::generate(), ItemId::generate()];
    app.store.insert_item(items[0], Money::from_minor(1_000)).await;
    app.store.insert_item(items[1], Money::from_minor(2_000)).await;

    let buyer = BuyerId::generate();
    app.store.set_customer_ref(buyer, "cus_integration").await;

    Listings {
        buyer,
        items,
        address: AddressId::generate(),
    }
}

async fn deliver_webhook(app: &TestApp, payload: &serde_json::Value) -> reqwest::StatusCode {
    let body = serde_json::to_vec(payload).expect("serializes");
    let signature = sign_webhook(&body);
    reqwest::Client::new()
        .post(format!("{}/webhook", app.base_url()))
        .header("Stripe-Signature", signature)
        .header("Content-Type", "application/json")
        .body(body)
        .send()
        .await
        .expect("delivers")
        .status()
}

#[tokio::test]
async fn test_full_checkout_success() {
    let app = spawn_app(ProviderScript::Succeed).await;
    let seeded = seed_listings(&app).await;

    let client = CheckoutClient::new(app.base_url(), app.token_for(seeded.buyer));
    let mut session = client
        .begin_checkout(seeded.items.clone(), seeded.address)
        .await
        .expect("checkout opens");

    // 5% of 3000 rounded half-up plus the 500 fixed component.
    let sheet = session.payment_sheet();
    assert_eq!(sheet.subtotal, 3_000);
    assert_eq!(sheet.service_fee, 650);
    assert_eq!(sheet.total, 3_650);
    let transaction_id = sheet.payment_intent_id.clone();

    for id in &seeded.items {
        assert_eq!(app.store.status_of(*id).await, Some(ItemStatus::Reserved));
    }

    // Payment UI reports success; the provider notifies us out of band.
    session.mark_payment_succeeded();
    session.finish().await.expect("finishes");

    let event = succeeded_event(
        "evt_success_1",
        &transaction_id,
        seeded.buyer,
        &seeded.items,
        seeded.address,
        3_000,
        3_650,
    );
    assert_eq!(deliver_webhook(&app, &event).await, 200);
    assert_eq!(app.settle_pending().await, 1);

    for id in &seeded.items {
        assert_eq!(app.store.status_of(*id).await, Some(ItemStatus::Sold));
    }
    let orders = app.store.orders().await;
    assert_eq!(orders.len(), 1);
    let order = orders.first().expect("one order");
    assert_eq!(order.total, Money::from_minor(3_650));
    assert_eq!(order.service_fee, Money::from_minor(650));
    assert_eq!(order.transaction_id, transaction_id);
}

#[tokio::test]
async fn test_settlement_amount_mismatch_releases_items() {
    let app = spawn_app(ProviderScript::Succeed).await;
    let seeded = seed_listings(&app).await;

    let client = CheckoutClient::new(app.base_url(), app.token_for(seeded.buyer));
    let mut session = client
        .begin_checkout(seeded.items.clone(), seeded.address)
        .await
        .expect("checkout opens");
    let transaction_id = session.payment_sheet().payment_intent_id.clone();
    session.mark_payment_succeeded();
    session.finish().await.expect("finishes");

    // Charged amount does not cover the recomputed total.
    let event = succeeded_event(
        "evt_mismatch_1",
        &transaction_id,
        seeded.buyer,
        &seeded.items,
        seeded.address,
        3_000,
        3_600,
    );
    assert_eq!(deliver_webhook(&app, &event).await, 200);
    app.settle_pending().await;

    for id in &seeded.items {
        assert_eq!(app.store.status_of(*id).await, Some(ItemStatus::Available));
    }
    assert!(app.store.orders().await.is_empty());
}

#[tokio::test]
async fn test_duplicate_webhook_delivery_settles_once() {
    let app = spawn_app(ProviderScript::Succeed).await;
    let seeded = seed_listings(&app).await;

    let client = CheckoutClient::new(app.base_url(), app.token_for(seeded.buyer));
    let session = client
        .begin_checkout(seeded.items.clone(), seeded.address)
        .await
        .expect("checkout opens");
    let transaction_id = session.payment_sheet().payment_intent_id.clone();

    let event = succeeded_event(
        "evt_dup_1",
        &transaction_id,
        seeded.buyer,
        &seeded.items,
        seeded.address,
        3_000,
        3_650,
    );
    assert_eq!(deliver_webhook(&app, &event).await, 200);
    assert_eq!(deliver_webhook(&app, &event).await, 200);
    app.settle_pending().await;
    app.settle_pending().await;

    assert_eq!(app.store.orders().await.len(), 1);

    drop(session);
}

#[tokio::test]
async fn test_contested_items_one_buyer_wins() {
    let app = spawn_app(ProviderScript::Succeed).await;
    let seeded = seed_listings(&app).await;

    let rival = BuyerId::generate();
    app.store.set_customer_ref(rival, "cus_rival").await;

    let winner_client = CheckoutClient::new(app.base_url(), app.token_for(seeded.buyer));
    let _session = winner_client
        .begin_checkout(seeded.items.clone(), seeded.address)
        .await
        .expect("first checkout wins");
    assert_eq!(app.provider.calls(), 1);

    // Overlapping set: all-or-nothing means the rival gets nothing, and no
    // authorization is issued for the losing attempt.
    let rival_client = CheckoutClient::new(app.base_url(), app.token_for(rival));
    let err = rival_client
        .begin_checkout(seeded.items.clone(), AddressId::generate())
        .await
        .expect_err("second checkout loses");

    assert!(err.is_stock_unavailable());
    assert_eq!(app.provider.calls(), 1);
}

#[tokio::test]
async fn test_abandoned_checkout_releases_items() {
    let app = spawn_app(ProviderScript::Succeed).await;
    let seeded = seed_listings(&app).await;

    let client = CheckoutClient::new(app.base_url(), app.token_for(seeded.buyer));
    let session = client
        .begin_checkout(seeded.items.clone(), seeded.address)
        .await
        .expect("checkout opens");

    // Buyer backs out before paying.
    session.finish().await.expect("releases");

    for id in &seeded.items {
        assert_eq!(app.store.status_of(*id).await, Some(ItemStatus::Available));
    }
}

#[tokio::test]
async fn test_missing_payment_profile_rejects_and_releases() {
    let app = spawn_app(ProviderScript::Succeed).await;
    let items = vec![ItemId::generate()];
    app.store.insert_item(items[0], Money::from_minor(1_500)).await;

    // Buyer has no processor customer on file.
    let buyer = BuyerId::generate();
    let client = CheckoutClient::new(app.base_url(), app.token_for(buyer));
    let err = client
        .begin_checkout(items.clone(), AddressId::generate())
        .await
        .expect_err("rejected");

    match &err {
        quayside_client::ClientError::Api { status, code, .. } => {
            assert_eq!(*status, 400);
            assert_eq!(code, "CUSTOMER_NOT_FOUND");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
    assert_eq!(app.provider.calls(), 0);
    assert_eq!(app.store.status_of(items[0]).await, Some(ItemStatus::Available));
}

#[tokio::test]
async fn test_provider_outage_rejects_and_releases() {
    let app = spawn_app(ProviderScript::Unavailable).await;
    let seeded = seed_listings(&app).await;

    let client = CheckoutClient::new(app.base_url(), app.token_for(seeded.buyer));
    let err = client
        .begin_checkout(seeded.items.clone(), seeded.address)
        .await
        .expect_err("provider outage surfaces");

    match &err {
        quayside_client::ClientError::Api { status, .. } => assert_eq!(*status, 503),
        other => panic!("expected Api error, got {other:?}"),
    }
    // Nothing stays held by a checkout that got no authorization.
    for id in &seeded.items {
        assert_eq!(app.store.status_of(*id).await, Some(ItemStatus::Available));
    }
}

#[tokio::test]
async fn test_checkout_without_idempotency_key_succeeds() {
    let app = spawn_app(ProviderScript::Succeed).await;
    let seeded = seed_listings(&app).await;

    // The key is optional; the service generates one when absent.
    let response = reqwest::Client::new()
        .post(format!("{}/create-payment-intent", app.base_url()))
        .bearer_auth(app.token_for(seeded.buyer))
        .json(&serde_json::json!({
            "item_ids": &seeded.items,
            "address_id": seeded.address,
        }))
        .send()
        .await
        .expect("responds");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["total"], 3_650);
    assert_eq!(app.provider.calls(), 1);
}

#[tokio::test]
async fn test_malformed_checkout_body_gets_error_envelope() {
    let app = spawn_app(ProviderScript::Succeed).await;
    let seeded = seed_listings(&app).await;

    // item_ids missing entirely: same envelope as every other failure.
    let response = reqwest::Client::new()
        .post(format!("{}/create-payment-intent", app.base_url()))
        .bearer_auth(app.token_for(seeded.buyer))
        .json(&serde_json::json!({ "address_id": seeded.address }))
        .send()
        .await
        .expect("responds");

    assert_eq!(response.status(), 422);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["error"]["code"], "VALIDATION");
}

#[tokio::test]
async fn test_release_only_affects_the_callers_reservation() {
    let app = spawn_app(ProviderScript::Succeed).await;
    let seeded = seed_listings(&app).await;

    let client = CheckoutClient::new(app.base_url(), app.token_for(seeded.buyer));
    let _session = client
        .begin_checkout(seeded.items.clone(), seeded.address)
        .await
        .expect("checkout opens");

    // Another authenticated buyer tries to free the items mid-payment.
    let intruder = BuyerId::generate();
    let response = reqwest::Client::new()
        .post(format!("{}/release", app.base_url()))
        .bearer_auth(app.token_for(intruder))
        .json(&serde_json::json!({ "item_ids": &seeded.items }))
        .send()
        .await
        .expect("responds");

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["released"], 0);
    for id in &seeded.items {
        assert_eq!(app.store.status_of(*id).await, Some(ItemStatus::Reserved));
    }
}

#[tokio::test]
async fn test_unauthenticated_checkout_rejected() {
    let app = spawn_app(ProviderScript::Succeed).await;
    let seeded = seed_listings(&app).await;

    let client = CheckoutClient::new(app.base_url(), "not-a-token");
    let err = client
        .begin_checkout(seeded.items.clone(), seeded.address)
        .await
        .expect_err("rejected");

    match &err {
        quayside_client::ClientError::Api { status, .. } => assert_eq!(*status, 401),
        other => panic!("expected Api error, got {other:?}"),
    }
    for id in &seeded.items {
        assert_eq!(app.store.status_of(*id).await, Some(ItemStatus::Available));
    }
}
