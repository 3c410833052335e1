//! In-memory implementation of the inventory store.
//!
//! Used by tests and local development. A single mutex over the item map is
//! the serialization point, giving the same all-or-nothing reserve and
//! status-scoped release/complete semantics as the `PostgreSQL` store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use quayside_core::{BuyerId, ItemId, ItemStatus, Money, OrderId};

use super::{CompleteOrder, InventoryStore, Reservation, StoreError};

#[derive(Debug, Clone)]
struct MemoryItem {
    price: Money,
    status: ItemStatus,
    reserved_by: Option<BuyerId>,
    reserved_at: Option<DateTime<Utc>>,
}

/// A completed order held in memory.
#[derive(Debug, Clone)]
pub struct MemoryOrder {
    pub id: OrderId,
    pub buyer: BuyerId,
    pub items: Vec<ItemId>,
    pub total: Money,
    pub service_fee: Money,
    pub transaction_id: String,
}

#[derive(Default)]
struct Inner {
    items: HashMap<ItemId, MemoryItem>,
    orders: Vec<MemoryOrder>,
    customer_refs: HashMap<BuyerId, String>,
}

/// Inventory store held entirely in memory.
#[derive(Default)]
pub struct MemoryInventoryStore {
    inner: Mutex<Inner>,
}

impl MemoryInventoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an available item with the given price.
    pub async fn insert_item(&self, id: ItemId, price: Money) {
        let mut inner = self.inner.lock().await;
        inner.items.insert(
            id,
            MemoryItem {
                price,
                status: ItemStatus::Available,
                reserved_by: None,
                reserved_at: None,
            },
        );
    }

    /// Set the payment-processor customer reference for a buyer.
    pub async fn set_customer_ref(&self, buyer: BuyerId, customer_ref: impl Into<String>) {
        let mut inner = self.inner.lock().await;
        inner.customer_refs.insert(buyer, customer_ref.into());
    }

    /// Change an item's price (price-drift scenarios in tests).
    pub async fn set_price(&self, id: ItemId, price: Money) {
        let mut inner = self.inner.lock().await;
        if let Some(item) = inner.items.get_mut(&id) {
            item.price = price;
        }
    }

    /// Backdate a reservation timestamp (sweeper tests).
    pub async fn backdate_reservation(&self, id: ItemId, reserved_at: DateTime<Utc>) {
        let mut inner = self.inner.lock().await;
        if let Some(item) = inner.items.get_mut(&id) {
            item.reserved_at = Some(reserved_at);
        }
    }

    /// Current status of an item, if it exists.
    pub async fn status_of(&self, id: ItemId) -> Option<ItemStatus> {
        let inner = self.inner.lock().await;
        inner.items.get(&id).map(|item| item.status)
    }

    /// Snapshot of completed orders.
    pub async fn orders(&self) -> Vec<MemoryOrder> {
        let inner = self.inner.lock().await;
        inner.orders.clone()
    }
}

#[async_trait]
impl InventoryStore for MemoryInventoryStore {
    async fn reserve(&self, items: &[ItemId], buyer: BuyerId) -> Result<Reservation, StoreError> {
        let mut inner = self.inner.lock().await;

        // First pass: every item must exist and be available, or nothing
        // is locked.
        let mut subtotal = Money::ZERO;
        for id in items {
            match inner.items.get(id) {
                Some(item) if item.status == ItemStatus::Available => {
                    subtotal = subtotal
                        .checked_add(item.price)
                        .ok_or_else(|| StoreError::DataCorruption("subtotal overflow".into()))?;
                }
                _ => return Err(StoreError::StockUnavailable),
            }
        }

        let now = Utc::now();
        for id in items {
            if let Some(item) = inner.items.get_mut(id) {
                item.status = ItemStatus::Reserved;
                item.reserved_by = Some(buyer);
                item.reserved_at = Some(now);
            }
        }

        Ok(Reservation {
            items: items.to_vec(),
            buyer,
            subtotal,
        })
    }

    async fn release(&self, items: &[ItemId]) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let mut released = 0;
        for id in items {
            if let Some(item) = inner.items.get_mut(id) {
                if item.status == ItemStatus::Reserved {
                    item.status = ItemStatus::Available;
                    item.reserved_by = None;
                    item.reserved_at = None;
                    released += 1;
                }
            }
        }
        Ok(released)
    }

    async fn release_for(&self, items: &[ItemId], buyer: BuyerId) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let mut released = 0;
        for id in items {
            if let Some(item) = inner.items.get_mut(id) {
                if item.status == ItemStatus::Reserved && item.reserved_by == Some(buyer) {
                    item.status = ItemStatus::Available;
                    item.reserved_by = None;
                    item.reserved_at = None;
                    released += 1;
                }
            }
        }
        Ok(released)
    }

    async fn complete(&self, order: &CompleteOrder) -> Result<OrderId, StoreError> {
        let mut inner = self.inner.lock().await;

        let intact = order.items.iter().all(|id| {
            inner.items.get(id).is_some_and(|item| {
                item.status == ItemStatus::Reserved && item.reserved_by == Some(order.buyer)
            })
        });
        if !intact {
            return Err(StoreError::CompletionConflict);
        }

        for id in &order.items {
            if let Some(item) = inner.items.get_mut(id) {
                item.status = ItemStatus::Sold;
            }
        }

        let id = OrderId::generate();
        inner.orders.push(MemoryOrder {
            id,
            buyer: order.buyer,
            items: order.items.clone(),
            total: order.total,
            service_fee: order.service_fee,
            transaction_id: order.transaction_id.clone(),
        });

        Ok(id)
    }

    async fn current_prices(
        &self,
        items: &[ItemId],
    ) -> Result<Vec<(ItemId, Money)>, StoreError> {
        let inner = self.inner.lock().await;
        items
            .iter()
            .map(|id| {
                inner
                    .items
                    .get(id)
                    .map(|item| (*id, item.price))
                    .ok_or_else(|| StoreError::DataCorruption(format!("unknown item {id}")))
            })
            .collect()
    }

    async fn find_order_by_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<OrderId>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .orders
            .iter()
            .find(|o| o.transaction_id == transaction_id)
            .map(|o| o.id))
    }

    async fn customer_ref(&self, buyer: BuyerId) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.customer_refs.get(&buyer).cloned())
    }

    async fn expire_reservations(&self, ttl: Duration) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - ttl;
        let mut inner = self.inner.lock().await;
        let mut swept = 0;
        for item in inner.items.values_mut() {
            if item.status == ItemStatus::Reserved
                && item.reserved_at.is_some_and(|at| at < cutoff)
            {
                item.status = ItemStatus::Available;
                item.reserved_by = None;
                item.reserved_at = None;
                swept += 1;
            }
        }
        Ok(swept)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quayside_core::AddressId;

    use super::*;

    async fn store_with_items(prices: &[i64]) -> (MemoryInventoryStore, Vec<ItemId>) {
        let store = MemoryInventoryStore::new();
        let mut ids = Vec::new();
        for price in prices {
            let id = ItemId::generate();
            store.insert_item(id, Money::from_minor(*price)).await;
            ids.push(id);
        }
        (store, ids)
    }

    fn complete_order(buyer: BuyerId, items: &[ItemId], txn: &str) -> CompleteOrder {
        CompleteOrder {
            buyer,
            items: items.to_vec(),
            address: AddressId::generate(),
            total: Money::from_minor(3_650),
            service_fee: Money::from_minor(650),
            transaction_id: txn.to_string(),
        }
    }

    #[tokio::test]
    async fn test_reserve_returns_authoritative_subtotal() {
        let (store, ids) = store_with_items(&[1_000, 2_000]).await;
        let buyer = BuyerId::generate();

        let reservation = store.reserve(&ids, buyer).await.expect("reserve succeeds");
        assert_eq!(reservation.subtotal, Money::from_minor(3_000));
        for id in &ids {
            assert_eq!(store.status_of(*id).await, Some(ItemStatus::Reserved));
        }
    }

    #[tokio::test]
    async fn test_reserve_is_all_or_nothing() {
        let (store, ids) = store_with_items(&[1_000, 2_000]).await;
        let first = BuyerId::generate();
        let second = BuyerId::generate();

        store
            .reserve(&ids[1..], first)
            .await
            .expect("first reserve succeeds");

        // Second buyer wants both items; one is taken, so neither locks.
        let err = store
            .reserve(&ids, second)
            .await
            .expect_err("overlapping reserve fails");
        assert!(matches!(err, StoreError::StockUnavailable));
        assert_eq!(store.status_of(ids[0]).await, Some(ItemStatus::Available));
    }

    #[tokio::test]
    async fn test_concurrent_overlapping_reserves_have_one_winner() {
        let (store, ids) = store_with_items(&[1_000, 2_000, 3_000]).await;
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let ids = ids.clone();
            handles.push(tokio::spawn(async move {
                store.reserve(&ids, BuyerId::generate()).await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.expect("task completes").is_ok() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1, "exactly one buyer wins the contested set");
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (store, ids) = store_with_items(&[1_000]).await;
        let buyer = BuyerId::generate();
        store.reserve(&ids, buyer).await.expect("reserve succeeds");

        assert_eq!(store.release(&ids).await.expect("first release"), 1);
        assert_eq!(store.release(&ids).await.expect("second release"), 0);
        assert_eq!(store.status_of(ids[0]).await, Some(ItemStatus::Available));
    }

    #[tokio::test]
    async fn test_release_for_ignores_other_buyers_reservation() {
        let (store, ids) = store_with_items(&[1_000]).await;
        let owner = BuyerId::generate();
        store.reserve(&ids, owner).await.expect("reserve succeeds");

        let stranger = BuyerId::generate();
        assert_eq!(
            store.release_for(&ids, stranger).await.expect("release"),
            0
        );
        assert_eq!(store.status_of(ids[0]).await, Some(ItemStatus::Reserved));

        assert_eq!(store.release_for(&ids, owner).await.expect("release"), 1);
        assert_eq!(store.status_of(ids[0]).await, Some(ItemStatus::Available));
    }

    #[tokio::test]
    async fn test_release_never_reverts_a_sale() {
        let (store, ids) = store_with_items(&[1_000, 2_000]).await;
        let buyer = BuyerId::generate();
        store.reserve(&ids, buyer).await.expect("reserve succeeds");
        store
            .complete(&complete_order(buyer, &ids, "pi_123"))
            .await
            .expect("complete succeeds");

        assert_eq!(store.release(&ids).await.expect("release"), 0);
        for id in &ids {
            assert_eq!(store.status_of(*id).await, Some(ItemStatus::Sold));
        }
    }

    #[tokio::test]
    async fn test_complete_requires_intact_reservation() {
        let (store, ids) = store_with_items(&[1_000, 2_000]).await;
        let buyer = BuyerId::generate();
        store.reserve(&ids, buyer).await.expect("reserve succeeds");
        store.release(&ids[..1]).await.expect("partial release");

        let err = store
            .complete(&complete_order(buyer, &ids, "pi_123"))
            .await
            .expect_err("completion conflicts");
        assert!(matches!(err, StoreError::CompletionConflict));
        // The surviving reservation is untouched by the failed completion.
        assert_eq!(store.status_of(ids[1]).await, Some(ItemStatus::Reserved));
    }

    #[tokio::test]
    async fn test_complete_rejects_other_buyers_reservation() {
        let (store, ids) = store_with_items(&[1_000]).await;
        let owner = BuyerId::generate();
        store.reserve(&ids, owner).await.expect("reserve succeeds");

        let err = store
            .complete(&complete_order(BuyerId::generate(), &ids, "pi_999"))
            .await
            .expect_err("wrong buyer cannot complete");
        assert!(matches!(err, StoreError::CompletionConflict));
    }

    #[tokio::test]
    async fn test_expire_reservations_sweeps_only_stale() {
        let (store, ids) = store_with_items(&[1_000, 2_000]).await;
        let buyer = BuyerId::generate();
        store.reserve(&ids, buyer).await.expect("reserve succeeds");
        store
            .backdate_reservation(ids[0], Utc::now() - Duration::hours(2))
            .await;

        let swept = store
            .expire_reservations(Duration::minutes(30))
            .await
            .expect("sweep succeeds");
        assert_eq!(swept, 1);
        assert_eq!(store.status_of(ids[0]).await, Some(ItemStatus::Available));
        assert_eq!(store.status_of(ids[1]).await, Some(ItemStatus::Reserved));
    }
}
