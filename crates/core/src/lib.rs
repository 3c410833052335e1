//! Quayside Core - Shared types library.
//!
//! This crate provides common types used across all Quayside components:
//! - `checkout` - Reservation & settlement service
//! - `client` - Buyer-side checkout session library
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP clients. This keeps it lightweight and allows it
//! to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, money, and item status
//! - [`fees`] - The service fee calculator shared by issuance and settlement

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod fees;
pub mod types;

pub use types::*;
