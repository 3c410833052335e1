//! Quayside Checkout - reservation and settlement service.
//!
//! This binary serves the buyer-facing checkout API on port 3000.
//!
//! # Architecture
//!
//! - Axum web framework, JSON API
//! - `PostgreSQL` as the transactional inventory and order store
//! - Stripe for payment authorizations and settlement webhooks
//! - In-process workers for webhook settlement and reservation expiry
//!
//! # Security
//!
//! Buyer endpoints require an HS256 bearer token. The webhook endpoint is
//! authenticated by HMAC signature over the raw body instead.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quayside_checkout::config::CheckoutConfig;
use quayside_checkout::events::PgEventQueue;
use quayside_checkout::payments::StripeGateway;
use quayside_checkout::state::AppState;
use quayside_checkout::store::PgInventoryStore;
use quayside_checkout::{app, db, worker};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &CheckoutConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = CheckoutConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Initialize tracing with EnvFilter and Sentry integration
    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "quayside_checkout=info,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    // Initialize database connection pool and run migrations
    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    tracing::info!("Database pool created, migrations applied");

    let store = Arc::new(PgInventoryStore::new(pool.clone()));
    let provider = Arc::new(StripeGateway::new(
        config.payment.api_base.clone(),
        config.payment.secret_key.clone(),
    ));
    let events = Arc::new(PgEventQueue::new(pool));

    let reservation_ttl = config.reservation_ttl;
    let state = AppState::new(config.clone(), store.clone(), provider, events.clone());

    // Background workers: settlement and reservation expiry
    tokio::spawn(worker::run_event_worker(events, store.clone()));
    tokio::spawn(worker::run_reservation_sweeper(store, reservation_ttl));

    // Build router with Sentry layers outermost for full request coverage
    let router = app(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    // Start server
    let addr = config.socket_addr();
    tracing::info!("checkout listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
