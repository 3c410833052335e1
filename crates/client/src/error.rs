//! Client-side checkout errors.

use thiserror::Error;

/// Errors surfaced by the checkout client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure talking to the checkout service.
    #[error("checkout service unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// The checkout service rejected the request.
    #[error("checkout error ({status}) {code}: {message}")]
    Api {
        status: u16,
        /// Machine-readable code from the error body, e.g. `STOCK_UNAVAILABLE`.
        code: String,
        message: String,
    },

    /// Response body did not have the expected shape.
    #[error("invalid response from checkout service: {0}")]
    InvalidResponse(String),

    /// Session used out of order (e.g. finished twice).
    #[error("invalid session state: {0}")]
    SessionState(String),
}

impl ClientError {
    /// True when the failure means someone else got the items first.
    #[must_use]
    pub fn is_stock_unavailable(&self) -> bool {
        matches!(self, Self::Api { code, .. } if code == "STOCK_UNAVAILABLE")
    }

    /// A message suitable for showing to the buyer.
    #[must_use]
    pub fn user_message(&self) -> &str {
        match self {
            Self::Api { code, message, .. } => {
                if code == "STOCK_UNAVAILABLE" {
                    "Sorry, someone else just grabbed one of these items."
                } else if code == "CUSTOMER_NOT_FOUND" {
                    "Please add a payment method to your account first."
                } else {
                    message
                }
            }
            Self::Transport(_) | Self::InvalidResponse(_) => {
                "We couldn't reach checkout. Please try again."
            }
            Self::SessionState(_) => "Something went wrong. Please start checkout again.",
        }
    }
}
