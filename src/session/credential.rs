//! Bearer credential and the claim decoding needed to tell whether it has expired.
//! The signature is never checked here; the server verifies it. Only `exp` matters.

use std::fmt;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::clock::Clock;

// base64url, tolerating issuers that keep the '=' padding
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("expected 3 dot-separated segments, found {0}")]
    Malformed(usize),

    #[error("undecodable token payload: {0}")]
    Payload(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    /// Expiry, seconds since epoch.
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

pub fn decode_claims(token: &str) -> Result<TokenClaims, TokenError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(TokenError::Malformed(parts.len()));
    }
    let bytes = PAYLOAD_ENGINE
        .decode(parts[1])
        .map_err(|e| TokenError::Payload(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| TokenError::Payload(e.to_string()))
}

/// True when the token's `exp` lies before `now`. A token that cannot be decoded counts as expired.
pub fn is_expired(token: &str, clock: &dyn Clock) -> bool {
    match decode_claims(token) {
        Ok(claims) => claims.exp < clock.now_epoch_secs(),
        Err(_) => true,
    }
}

/// An issued bearer token plus its decoded expiry. Replaced wholesale on refresh, never edited.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    expires_at: i64,
}

impl Credential {
    pub fn parse<S: Into<String>>(token: S) -> Result<Self, TokenError> {
        let token = token.into();
        let claims = decode_claims(&token)?;
        Ok(Self { token, expires_at: claims.exp })
    }

    pub fn token(&self) -> &str { &self.token }

    pub fn expires_at(&self) -> i64 { self.expires_at }

    pub fn is_expired_at(&self, now_epoch_secs: i64) -> bool { self.expires_at < now_epoch_secs }

    pub fn bearer(&self) -> String { format!("Bearer {}", self.token) }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // keep tokens out of logs
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
