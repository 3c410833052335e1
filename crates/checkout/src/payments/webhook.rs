//! Webhook signature verification and event parsing.
//!
//! The provider signs each delivery with `t=<unix>,v1=<hmac-sha256-hex>`
//! over `"{t}.{raw body}"`. Verification must pass before any field of the
//! payload is trusted; timestamps older than the tolerance are rejected to
//! blunt replay.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

use quayside_core::{AddressId, BuyerId, ItemId, Money};

use super::IntentMetadata;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age of a signed timestamp, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Errors for a malformed signature header.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signature header missing timestamp")]
    MissingTimestamp,
    #[error("signature header missing v1 signature")]
    MissingSignature,
    #[error("signature header malformed: {0}")]
    Malformed(String),
}

/// Verify a webhook signature header against the raw payload.
///
/// Returns `Ok(false)` for a well-formed header that fails verification
/// (wrong key, altered payload, stale timestamp).
///
/// # Errors
///
/// Returns [`SignatureError`] when the header itself cannot be parsed.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now_unix: i64,
) -> Result<bool, SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut signature: Option<Vec<u8>> = None;

    for part in header.split(',') {
        let Some((key, value)) = part.split_once('=') else {
            return Err(SignatureError::Malformed(part.to_string()));
        };
        match key.trim() {
            "t" => {
                let ts = value
                    .parse::<i64>()
                    .map_err(|e| SignatureError::Malformed(e.to_string()))?;
                timestamp = Some(ts);
            }
            "v1" => match hex::decode(value) {
                Ok(bytes) => signature = Some(bytes),
                // Wrong encoding can't possibly match; treat as failed, not malformed.
                Err(_) => signature = Some(Vec::new()),
            },
            _ => {} // ignore unknown schemes (v0 etc.)
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
    let signature = signature.ok_or(SignatureError::MissingSignature)?;

    if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Ok(false);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| SignatureError::Malformed(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    Ok(mac.verify_slice(&signature).is_ok())
}

/// Terminal outcome reported for a payment authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
    Canceled,
}

/// A parsed provider event.
#[derive(Debug, Clone)]
pub enum PaymentEvent {
    /// Terminal payment outcome for one of our authorizations (or another
    /// integration's; see `app_tag`).
    Payment {
        outcome: PaymentOutcome,
        /// Provider transaction id (payment intent id).
        transaction_id: String,
        /// Amount actually charged, minor units. Zero for failed/canceled.
        amount_received: Money,
        /// Metadata discriminator recorded at issuance.
        app_tag: Option<String>,
        metadata: Option<IntentMetadata>,
    },
    /// Stored-card setup completed; acknowledged but no settlement work.
    CardSetupCompleted,
    /// Any event type we do not handle.
    Unhandled(String),
}

/// Errors parsing an event payload.
#[derive(Debug, Error)]
pub enum EventParseError {
    #[error("event missing field: {0}")]
    MissingField(&'static str),
    #[error("event field invalid: {0}")]
    InvalidField(String),
}

/// The provider-assigned event id, used for duplicate-delivery collapse.
///
/// # Errors
///
/// Returns [`EventParseError::MissingField`] when absent.
pub fn event_id(payload: &Value) -> Result<&str, EventParseError> {
    payload
        .get("id")
        .and_then(Value::as_str)
        .ok_or(EventParseError::MissingField("id"))
}

/// Parse a verified webhook payload into a [`PaymentEvent`].
///
/// # Errors
///
/// Returns [`EventParseError`] when a payment event lacks the fields the
/// reconciler needs.
pub fn parse_event(payload: &Value) -> Result<PaymentEvent, EventParseError> {
    let event_type = payload
        .get("type")
        .and_then(Value::as_str)
        .ok_or(EventParseError::MissingField("type"))?;

    let outcome = match event_type {
        "payment_intent.succeeded" => PaymentOutcome::Succeeded,
        "payment_intent.payment_failed" => PaymentOutcome::Failed,
        "payment_intent.canceled" => PaymentOutcome::Canceled,
        "setup_intent.succeeded" => return Ok(PaymentEvent::CardSetupCompleted),
        other => return Ok(PaymentEvent::Unhandled(other.to_string())),
    };

    let object = payload
        .pointer("/data/object")
        .ok_or(EventParseError::MissingField("data.object"))?;

    let transaction_id = object
        .get("id")
        .and_then(Value::as_str)
        .ok_or(EventParseError::MissingField("data.object.id"))?
        .to_string();

    let amount_received = object
        .get("amount_received")
        .and_then(Value::as_i64)
        .unwrap_or(0);

    let meta = object.get("metadata");
    let app_tag = meta
        .and_then(|m| m.get("app"))
        .and_then(Value::as_str)
        .map(ToString::to_string);
    let metadata = meta.and_then(|m| parse_metadata(m).ok());

    Ok(PaymentEvent::Payment {
        outcome,
        transaction_id,
        amount_received: Money::from_minor(amount_received),
        app_tag,
        metadata,
    })
}

fn parse_metadata(meta: &Value) -> Result<IntentMetadata, EventParseError> {
    let buyer: BuyerId = str_field(meta, "buyer_id")?
        .parse()
        .map_err(|_| EventParseError::InvalidField("buyer_id".into()))?;
    let address: AddressId = str_field(meta, "address_id")?
        .parse()
        .map_err(|_| EventParseError::InvalidField("address_id".into()))?;

    let items = str_field(meta, "item_ids")?
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<ItemId>()
                .map_err(|_| EventParseError::InvalidField(format!("item id {s}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if items.is_empty() {
        return Err(EventParseError::InvalidField("item_ids empty".into()));
    }

    let declared_subtotal = str_field(meta, "declared_subtotal")?
        .parse::<i64>()
        .map_err(|_| EventParseError::InvalidField("declared_subtotal".into()))?;

    Ok(IntentMetadata {
        buyer,
        items,
        address,
        declared_subtotal: Money::from_minor(declared_subtotal),
    })
}

fn str_field<'a>(meta: &'a Value, key: &'static str) -> Result<&'a str, EventParseError> {
    meta.get(key)
        .and_then(Value::as_str)
        .ok_or(EventParseError::MissingField(key))
}
