//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server-class errors to
//! Sentry before responding to the client. All route handlers should return
//! `Result<T, AppError>`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::payments::ProviderError;
use crate::store::StoreError;

/// Application-level error type for the checkout service.
#[derive(Debug, Error)]
pub enum AppError {
    /// Request body failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Caller is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// One or more requested items are no longer available.
    #[error("Stock unavailable")]
    StockUnavailable,

    /// Buyer has no payment customer on file.
    #[error("Customer not found")]
    CustomerNotFound,

    /// Payment provider operation failed.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Store operation failed.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::StockUnavailable => Self::StockUnavailable,
            other => Self::Store(other),
        }
    }
}

impl AppError {
    /// Stable machine-readable code for the JSON error body.
    const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::StockUnavailable => "STOCK_UNAVAILABLE",
            Self::CustomerNotFound => "CUSTOMER_NOT_FOUND",
            Self::Provider(_) => "PROVIDER_UNAVAILABLE",
            Self::Store(_) | Self::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if matches!(self, Self::Store(_) | Self::Internal(_) | Self::Provider(_)) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = match &self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::StockUnavailable => StatusCode::CONFLICT,
            Self::CustomerNotFound => StatusCode::BAD_REQUEST,
            Self::Provider(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Store(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Provider(_) => "Payment provider unavailable".to_string(),
            Self::StockUnavailable => {
                "One or more items are no longer available".to_string()
            }
            Self::CustomerNotFound => "No payment profile found for this account".to_string(),
            _ => self.to_string(),
        };

        let body = Json(json!({
            "error": { "code": self.code(), "message": message }
        }));

        (status, body).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
