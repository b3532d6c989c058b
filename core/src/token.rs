//! Access-token handling: the opaque credential and its unverified claims.
//!
//! # Design
//! The client never holds the signing key, so it cannot verify the token.
//! `Credential::claims` decodes the payload segment only; the backend is
//! the sole authority on signature and expiry. `exp` is surfaced for
//! display and is not acted on here.

use std::fmt;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::{Deserialize, Deserializer};

use crate::error::TokenError;
use crate::types::Identity;

/// base64url that tolerates both padded and unpadded segments.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A bearer token issued by the auth endpoints.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for the `authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }

    /// Decode the payload segment without verifying the signature.
    pub fn claims(&self) -> Result<Claims, TokenError> {
        let mut segments = self.0.split('.');
        let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_), None) if !payload.is_empty() => payload,
            _ => return Err(TokenError::Malformed),
        };
        let bytes = PAYLOAD_ENGINE
            .decode(payload)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| TokenError::Claims(e.to_string()))
    }

    pub fn identity(&self) -> Result<Identity, TokenError> {
        self.claims().map(Claims::identity)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// The subset of the token payload the client reads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Claims {
    #[serde(deserialize_with = "numeric_sub")]
    pub sub: i64,
    pub email: String,
    #[serde(default)]
    pub exp: Option<i64>,
}

impl Claims {
    pub fn identity(self) -> Identity {
        Identity {
            id: self.sub,
            email: self.email,
        }
    }
}

/// `sub` is a string per RFC 7519 but some issuers emit a bare number.
fn numeric_sub<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Sub {
        Number(i64),
        Text(String),
    }

    match Sub::deserialize(deserializer)? {
        Sub::Number(n) => Ok(n),
        Sub::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
