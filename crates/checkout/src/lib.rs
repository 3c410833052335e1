//! Quayside checkout service library.
//!
//! Reserves marketplace items atomically, issues payment authorizations and
//! reconciles asynchronous settlement notifications into orders. The binary
//! in `main.rs` wires the `PostgreSQL` store and the Stripe gateway into
//! [`app`]; tests wire in-memory implementations instead.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod extract;
pub mod middleware;
pub mod payments;
pub mod reconcile;
pub mod routes;
pub mod state;
pub mod store;
pub mod worker;

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Router, routing::get};

use crate::state::AppState;

/// Build the full application router, health endpoints included.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes::routes())
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Verifies store connectivity before returning OK.
/// Returns 503 Service Unavailable if the store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store().ping().await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
