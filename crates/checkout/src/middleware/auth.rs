//! Authentication extractor for buyer-facing endpoints.
//!
//! Buyers authenticate with an HS256 bearer token whose `sub` claim is the
//! buyer id. The webhook endpoint is deliberately NOT behind this extractor;
//! it authenticates by signature instead.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use quayside_core::BuyerId;

use crate::error::AppError;
use crate::state::AppState;

/// Bearer token claims.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// Buyer id.
    sub: String,
    /// Expiry, seconds since the Unix epoch.
    exp: i64,
}

/// Extractor that requires a valid buyer bearer token.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(AuthedBuyer(buyer): AuthedBuyer) -> impl IntoResponse {
///     format!("buyer {buyer}")
/// }
/// ```
pub struct AuthedBuyer(pub BuyerId);

impl FromRequestParts<AppState> for AuthedBuyer {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing authorization header".to_string()))?;

        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("expected bearer token".to_string()))?;

        let buyer = decode_token(token, &state.config().auth_secret)
            .map_err(|e| AppError::Unauthorized(e.to_string()))?;

        Ok(Self(buyer))
    }
}

/// Decode and validate a bearer token, returning the buyer id.
fn decode_token(token: &str, secret: &SecretString) -> Result<BuyerId, TokenError> {
    let key = DecodingKey::from_secret(secret.expose_secret().as_bytes());
    let data = jsonwebtoken::decode::<Claims>(token, &key, &Validation::new(Algorithm::HS256))?;
    data.claims
        .sub
        .parse::<BuyerId>()
        .map_err(|_| TokenError::InvalidSubject)
}

/// Issue a bearer token for a buyer, valid for `ttl_secs` seconds.
///
/// # Errors
///
/// Returns [`TokenError`] if signing fails.
pub fn issue_token(
    buyer: BuyerId,
    secret: &SecretString,
    ttl_secs: i64,
) -> Result<String, TokenError> {
    let claims = Claims {
        sub: buyer.to_string(),
        exp: chrono::Utc::now().timestamp() + ttl_secs,
    };
    let key = EncodingKey::from_secret(secret.expose_secret().as_bytes());
    Ok(jsonwebtoken::encode(&Header::default(), &claims, &key)?)
}

/// Errors issuing or decoding bearer tokens.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token invalid: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("token subject is not a buyer id")]
    InvalidSubject,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> SecretString {
        SecretString::from("k9Qz!t7W#mD2pXv4@bN8rL5eH1sGfJ3c")
    }

    #[test]
    fn test_token_round_trip() {
        let buyer = BuyerId::generate();
        let token = issue_token(buyer, &secret(), 3600).expect("issues");
        let decoded = decode_token(&token, &secret()).expect("decodes");
        assert_eq!(decoded, buyer);
    }

    #[test]
    fn test_expired_token_rejected() {
        let buyer = BuyerId::generate();
        let token = issue_token(buyer, &secret(), -3600).expect("issues");
        assert!(decode_token(&token, &secret()).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let buyer = BuyerId::generate();
        let token = issue_token(buyer, &secret(), 3600).expect("issues");
        let other = SecretString::from("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6d");
        assert!(decode_token(&token, &other).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(decode_token("not-a-token", &secret()).is_err());
    }

    #[test]
    fn test_non_uuid_subject_rejected() {
        let claims = Claims {
            sub: "buyer-42".to_string(),
            exp: chrono::Utc::now().timestamp() + 3600,
        };
        let key = EncodingKey::from_secret(secret().expose_secret().as_bytes());
        let token = jsonwebtoken::encode(&Header::default(), &claims, &key).expect("encodes");
        assert!(matches!(
            decode_token(&token, &secret()),
            Err(TokenError::InvalidSubject)
        ));
    }
}
