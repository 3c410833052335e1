//! The transactional inventory store.
//!
//! The relational store's reservation and completion procedures are an
//! external collaborator with a fixed contract: `reserve` locks a set of
//! items all-or-nothing, `release` is the idempotent compensating action,
//! and `complete` turns a reservation plus a settled charge into a durable
//! order. Everything here executes atomically relative to item status; the
//! store is the serialization point for concurrent checkouts.

pub mod memory;
pub mod postgres;

pub use memory::MemoryInventoryStore;
pub use postgres::PgInventoryStore;

use async_trait::async_trait;
use chrono::Duration;
use thiserror::Error;

use quayside_core::{AddressId, BuyerId, ItemId, Money, OrderId};

/// Errors from the inventory store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// One or more items in the requested set are not available. Nothing
    /// was locked.
    #[error("one or more items are not available")]
    StockUnavailable,

    /// Completion could not consume the full reserved set (a concurrent
    /// sale or release already took one of the items).
    #[error("completion conflict: reservation no longer intact")]
    CompletionConflict,

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored data violates an invariant the application relies on.
    #[error("data corruption: {0}")]
    DataCorruption(String),
}

/// A successful all-or-nothing lock over a set of items.
///
/// Exists only as a transient side effect of `reserve`; the item status
/// rows are the durable record.
#[derive(Debug, Clone)]
pub struct Reservation {
    /// Items now held for the buyer.
    pub items: Vec<ItemId>,
    /// Buyer holding the reservation.
    pub buyer: BuyerId,
    /// Authoritative sum of current item prices at lock time.
    pub subtotal: Money,
}

/// Inputs to the atomic completion operation.
#[derive(Debug, Clone)]
pub struct CompleteOrder {
    pub buyer: BuyerId,
    pub items: Vec<ItemId>,
    pub address: AddressId,
    pub total: Money,
    pub service_fee: Money,
    /// Provider transaction id (payment intent id) recorded on the order.
    pub transaction_id: String,
}

/// Contract for the transactional store (§ reservation coordinator and
/// completion procedure).
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Atomically reserve the full item set for a buyer.
    ///
    /// All-or-nothing: if any item is not `available`, no item in the set
    /// is locked and the call fails with [`StoreError::StockUnavailable`].
    /// On success returns the authoritative subtotal computed from current
    /// prices; client-declared prices never feed fee calculation.
    ///
    /// Safe under concurrent invocation for overlapping sets: exactly one
    /// caller wins each contested item.
    ///
    /// # Errors
    ///
    /// `StockUnavailable` on contention, `Database` on query failure.
    async fn reserve(&self, items: &[ItemId], buyer: BuyerId) -> Result<Reservation, StoreError>;

    /// Revert `reserved -> available` for the given set.
    ///
    /// Idempotent: items already `available` are untouched, and items
    /// already `sold` are never reverted (a completed sale is terminal).
    /// Returns the number of items actually released.
    ///
    /// Unscoped; for server-internal callers only (reconciler, sweeper).
    /// Anything acting on behalf of a buyer goes through
    /// [`release_for`](Self::release_for).
    ///
    /// # Errors
    ///
    /// `Database` on query failure.
    async fn release(&self, items: &[ItemId]) -> Result<u64, StoreError>;

    /// Like [`release`](Self::release), but only touches items reserved by
    /// `buyer`. Another buyer's live reservation is left intact, so a
    /// hostile release request cannot free items mid-payment.
    ///
    /// # Errors
    ///
    /// `Database` on query failure.
    async fn release_for(&self, items: &[ItemId], buyer: BuyerId) -> Result<u64, StoreError>;

    /// Atomically create the order and flip the reserved set to `sold`,
    /// recording the provider transaction id.
    ///
    /// # Errors
    ///
    /// `CompletionConflict` if any item is no longer reserved for the
    /// buyer, `Database` on query failure.
    async fn complete(&self, order: &CompleteOrder) -> Result<OrderId, StoreError>;

    /// Fetch current authoritative prices for an item set.
    ///
    /// # Errors
    ///
    /// `DataCorruption` if any requested item does not exist.
    async fn current_prices(&self, items: &[ItemId])
    -> Result<Vec<(ItemId, Money)>, StoreError>;

    /// Look up an existing order by provider transaction id (duplicate
    /// settlement detection).
    ///
    /// # Errors
    ///
    /// `Database` on query failure.
    async fn find_order_by_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<OrderId>, StoreError>;

    /// Payment-processor customer reference for a buyer, if the profile
    /// carries one.
    ///
    /// # Errors
    ///
    /// `Database` on query failure.
    async fn customer_ref(&self, buyer: BuyerId) -> Result<Option<String>, StoreError>;

    /// Release reservations older than `ttl`. Returns the number swept.
    ///
    /// # Errors
    ///
    /// `Database` on query failure.
    async fn expire_reservations(&self, ttl: Duration) -> Result<u64, StoreError>;

    /// Cheap connectivity check for readiness probes.
    ///
    /// # Errors
    ///
    /// `Database` if the store is unreachable.
    async fn ping(&self) -> Result<(), StoreError>;
}
