//! Voluntary reservation release (checkout abandoned client-side).

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use quayside_core::ItemId;

use crate::error::{AppError, Result};
use crate::extract::AppJson;
use crate::middleware::AuthedBuyer;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ReleaseRequest {
    pub item_ids: Vec<ItemId>,
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    /// Items actually flipped back to available. Items already released,
    /// already sold, or held by another buyer are not counted; the call is
    /// idempotent.
    pub released: u64,
}

/// POST /release
///
/// Scoped to the caller: only reservations held by the authenticated buyer
/// are released, so one buyer cannot free another's items mid-payment.
pub async fn release(
    State(state): State<AppState>,
    AuthedBuyer(buyer): AuthedBuyer,
    AppJson(request): AppJson<ReleaseRequest>,
) -> Result<Json<ReleaseResponse>> {
    if request.item_ids.is_empty() {
        return Err(AppError::Validation("item_ids must not be empty".into()));
    }

    let released = state.store().release_for(&request.item_ids, buyer).await?;
    tracing::info!(%buyer, released, "reservation released by client");

    Ok(Json(ReleaseResponse { released }))
}
