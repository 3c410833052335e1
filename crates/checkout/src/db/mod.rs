//! Database operations for checkout `PostgreSQL`.
//!
//! # Schema: `checkout`
//!
//! ## Tables
//!
//! - `item` - Marketplace listings and their availability state
//! - `buyer_profile` - Buyer to payment-processor customer mapping
//! - `"order"` - Settled orders, keyed by provider transaction id
//! - `order_item` - Items belonging to an order
//! - `webhook_event` - Durable queue of acknowledged provider events
//!
//! # Migrations
//!
//! Migrations live in `crates/checkout/migrations/` and run automatically
//! on startup via [`run_migrations`].

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Run embedded migrations against the pool.
///
/// # Errors
///
/// Returns `sqlx::migrate::MigrateError` if a migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
