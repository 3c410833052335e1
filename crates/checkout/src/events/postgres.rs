//! `PostgreSQL` implementation of the webhook event queue.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{EventQueueError, StoredEvent, WebhookEventQueue};

/// Webhook event queue backed by `checkout.webhook_event`.
#[derive(Clone)]
pub struct PgEventQueue {
    pool: PgPool,
}

impl PgEventQueue {
    /// Create a new queue over a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookEventQueue for PgEventQueue {
    async fn enqueue(
        &self,
        provider_event_id: &str,
        payload: &serde_json::Value,
    ) -> Result<bool, EventQueueError> {
        let result = sqlx::query(
            r"
            INSERT INTO checkout.webhook_event (id, provider_event_id, payload)
            VALUES ($1, $2, $3)
            ON CONFLICT (provider_event_id) DO NOTHING
            ",
        )
        .bind(Uuid::new_v4())
        .bind(provider_event_id)
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn claim_pending(&self, limit: i64) -> Result<Vec<StoredEvent>, EventQueueError> {
        // A single worker task owns the queue; oldest events first so
        // retries cannot starve new arrivals indefinitely.
        let rows = sqlx::query(
            r"
            SELECT id, provider_event_id, payload, attempts
            FROM checkout.webhook_event
            WHERE status = 'pending'
            ORDER BY received_at
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(StoredEvent {
                    id: row.try_get("id")?,
                    provider_event_id: row.try_get("provider_event_id")?,
                    payload: row.try_get("payload")?,
                    attempts: row.try_get("attempts")?,
                })
            })
            .collect()
    }

    async fn mark_processed(&self, id: Uuid) -> Result<(), EventQueueError> {
        sqlx::query(
            r"
            UPDATE checkout.webhook_event
            SET status = 'processed', attempts = attempts + 1, processed_at = now()
            WHERE id = $1
            ",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, terminal: bool) -> Result<(), EventQueueError> {
        let status = if terminal { "failed" } else { "pending" };
        sqlx::query(
            r"
            UPDATE checkout.webhook_event
            SET status = $2, attempts = attempts + 1
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
