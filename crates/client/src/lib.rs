//! Quayside checkout client.
//!
//! Client-side companion to the checkout service: opens a checkout session
//! (reserve + payment authorization), exposes the payment sheet parameters
//! and guarantees a release on every abandoned path.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod error;
pub mod session;

pub use error::ClientError;
pub use session::{CheckoutClient, CheckoutSession, PaymentSheet};
