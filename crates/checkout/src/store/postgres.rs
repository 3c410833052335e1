//! `PostgreSQL` implementation of the inventory store.
//!
//! Reservation is a single `UPDATE ... WHERE status = 'available'` inside a
//! transaction; a short row count means contention and rolls everything
//! back. Release and completion scope their updates to the status they are
//! allowed to leave, so replays and races degrade to no-ops instead of
//! corrupting terminal states.

use async_trait::async_trait;
use chrono::Duration;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use quayside_core::{BuyerId, ItemId, Money, OrderId};

use super::{CompleteOrder, InventoryStore, Reservation, StoreError};

/// Inventory store backed by `PostgreSQL`.
#[derive(Clone)]
pub struct PgInventoryStore {
    pool: PgPool,
}

impl PgInventoryStore {
    /// Create a new store over a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn uuids(items: &[ItemId]) -> Vec<Uuid> {
        items.iter().map(|id| id.as_uuid()).collect()
    }
}

#[async_trait]
impl InventoryStore for PgInventoryStore {
    async fn reserve(&self, items: &[ItemId], buyer: BuyerId) -> Result<Reservation, StoreError> {
        let ids = Self::uuids(items);
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r"
            UPDATE checkout.item
            SET status = 'reserved', reserved_by = $2, reserved_at = now(),
                updated_at = now()
            WHERE id = ANY($1) AND status = 'available'
            RETURNING price_minor
            ",
        )
        .bind(&ids)
        .bind(buyer.as_uuid())
        .fetch_all(&mut *tx)
        .await?;

        if updated.len() != items.len() {
            // Contention or unknown item: nothing in the set is locked.
            tx.rollback().await?;
            return Err(StoreError::StockUnavailable);
        }

        let mut subtotal = Money::ZERO;
        for row in &updated {
            let price: i64 = row.try_get("price_minor")?;
            subtotal = subtotal
                .checked_add(Money::from_minor(price))
                .ok_or_else(|| StoreError::DataCorruption("subtotal overflow".into()))?;
        }

        tx.commit().await?;

        Ok(Reservation {
            items: items.to_vec(),
            buyer,
            subtotal,
        })
    }

    async fn release(&self, items: &[ItemId]) -> Result<u64, StoreError> {
        // Scoped to 'reserved' so a completed sale is never reverted and
        // double release is a no-op.
        let result = sqlx::query(
            r"
            UPDATE checkout.item
            SET status = 'available', reserved_by = NULL, reserved_at = NULL,
                updated_at = now()
            WHERE id = ANY($1) AND status = 'reserved'
            ",
        )
        .bind(Self::uuids(items))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn release_for(&self, items: &[ItemId], buyer: BuyerId) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r"
            UPDATE checkout.item
            SET status = 'available', reserved_by = NULL, reserved_at = NULL,
                updated_at = now()
            WHERE id = ANY($1) AND status = 'reserved' AND reserved_by = $2
            ",
        )
        .bind(Self::uuids(items))
        .bind(buyer.as_uuid())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn complete(&self, order: &CompleteOrder) -> Result<OrderId, StoreError> {
        let order_id = OrderId::generate();
        let ids = Self::uuids(&order.items);
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r"
            UPDATE checkout.item
            SET status = 'sold', updated_at = now()
            WHERE id = ANY($1) AND status = 'reserved' AND reserved_by = $2
            ",
        )
        .bind(&ids)
        .bind(order.buyer.as_uuid())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != order.items.len() as u64 {
            tx.rollback().await?;
            return Err(StoreError::CompletionConflict);
        }

        sqlx::query(
            r#"
            INSERT INTO checkout."order"
                (id, buyer_id, address_id, total_minor, service_fee_minor,
                 provider_transaction_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(order.buyer.as_uuid())
        .bind(order.address.as_uuid())
        .bind(order.total.minor())
        .bind(order.service_fee.minor())
        .bind(&order.transaction_id)
        .execute(&mut *tx)
        .await?;

        for id in &ids {
            sqlx::query(r"INSERT INTO checkout.order_item (order_id, item_id) VALUES ($1, $2)")
                .bind(order_id.as_uuid())
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(order_id)
    }

    async fn current_prices(
        &self,
        items: &[ItemId],
    ) -> Result<Vec<(ItemId, Money)>, StoreError> {
        let rows = sqlx::query(
            r"SELECT id, price_minor FROM checkout.item WHERE id = ANY($1)",
        )
        .bind(Self::uuids(items))
        .fetch_all(&self.pool)
        .await?;

        if rows.len() != items.len() {
            return Err(StoreError::DataCorruption(format!(
                "expected {} items, found {}",
                items.len(),
                rows.len()
            )));
        }

        rows.into_iter()
            .map(|row| {
                let id: Uuid = row.try_get("id")?;
                let price: i64 = row.try_get("price_minor")?;
                Ok((ItemId::new(id), Money::from_minor(price)))
            })
            .collect()
    }

    async fn find_order_by_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<OrderId>, StoreError> {
        let row = sqlx::query(
            r#"SELECT id FROM checkout."order" WHERE provider_transaction_id = $1"#,
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => {
                let id: Uuid = r.try_get("id")?;
                Ok(Some(OrderId::new(id)))
            }
            None => Ok(None),
        }
    }

    async fn customer_ref(&self, buyer: BuyerId) -> Result<Option<String>, StoreError> {
        let row = sqlx::query(
            r"SELECT customer_ref FROM checkout.buyer_profile WHERE buyer_id = $1",
        )
        .bind(buyer.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(r.try_get("customer_ref")?),
            None => Ok(None),
        }
    }

    async fn expire_reservations(&self, ttl: Duration) -> Result<u64, StoreError> {
        let cutoff = chrono::Utc::now() - ttl;
        let result = sqlx::query(
            r"
            UPDATE checkout.item
            SET status = 'available', reserved_by = NULL, reserved_at = NULL,
                updated_at = now()
            WHERE status = 'reserved' AND reserved_at < $1
            ",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
