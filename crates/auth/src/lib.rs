//! Bearer tokens for the metrics endpoint.
//!
//! A token is `base64("<username>:<timestamp_ms>:<hex HMAC-SHA256>")` where the
//! MAC covers `"<username>:<timestamp_ms>"`. Tokens are valid for a fixed age
//! after issue.

use base64::Engine;
use chrono::{DateTime, Duration, TimeDelta, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Hex length of an HMAC-SHA256 signature.
const SIGNATURE_HEX_LEN: usize = 64;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingHeader,
    #[error("Authorization header is not a Bearer token")]
    NotBearer,
    #[error("token is not valid base64")]
    Base64,
    #[error("token is not valid UTF-8")]
    NotUtf8,
    #[error("token has {0} parts, expected at least 3")]
    TooFewParts(usize),
    #[error("token timestamp `{0}` is not a number")]
    InvalidTimestamp(String),
    #[error("token expired {age_hours}h after issue (limit {max_hours}h)")]
    Expired { age_hours: i64, max_hours: i64 },
    #[error("token signature is not {SIGNATURE_HEX_LEN} lowercase hex digits")]
    MalformedSignature,
    #[error("token signature does not match")]
    SignatureMismatch,
    #[error("username must be non-empty and must not contain ':'")]
    InvalidUsername,
    #[error("token max age of {0}h is out of range")]
    InvalidMaxAge(i64),
}

impl AuthError {
    /// Whether the request carried no credentials at all, as opposed to bad ones.
    pub fn is_missing(&self) -> bool {
        matches!(self, AuthError::MissingHeader | AuthError::NotBearer)
    }
}

// ---------------------------------------------------------------------------
// Secret
// ---------------------------------------------------------------------------

/// Server-side signing secret.
#[derive(Clone)]
pub struct TokenSecret {
    bytes: Vec<u8>,
}

impl TokenSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: secret.into(),
        }
    }

    /// Generate a random 256-bit secret, hex encoded so it can live in an
    /// environment variable.
    pub fn generate() -> String {
        use rand::RngCore;
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        hex::encode(key)
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length; `new_from_slice` cannot fail for it.
        match HmacSha256::new_from_slice(&self.bytes) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC-SHA256 accepts any key length"),
        }
    }
}

impl std::fmt::Debug for TokenSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenSecret(..)")
    }
}

// ---------------------------------------------------------------------------
// Issue & verify
// ---------------------------------------------------------------------------

/// What a valid token says about its bearer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub username: String,
    pub issued_at: DateTime<Utc>,
}

/// Lowercase hex HMAC of `"<username>:<timestamp_ms>"`.
pub fn sign(username: &str, timestamp_ms: i64, secret: &TokenSecret) -> String {
    let mut mac = secret.mac();
    mac.update(format!("{username}:{timestamp_ms}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Issue a token for `username` stamped at `now`.
pub fn issue_token(username: &str, secret: &TokenSecret, now: DateTime<Utc>) -> Result<String, AuthError> {
    if username.is_empty() || username.contains(':') {
        return Err(AuthError::InvalidUsername);
    }
    let timestamp_ms = now.timestamp_millis();
    let signature = sign(username, timestamp_ms, secret);
    let raw = format!("{username}:{timestamp_ms}:{signature}");
    Ok(base64::engine::general_purpose::STANDARD.encode(raw))
}

/// Verify `token` with the default 24 hour age limit.
pub fn verify_token(token: &str, secret: &TokenSecret, now: DateTime<Utc>) -> Result<TokenClaims, AuthError> {
    TokenVerifier::with_default_age(secret.clone()).verify(token, now)
}

/// Extract the token from an `Authorization` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let value = header.ok_or(AuthError::MissingHeader)?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::NotBearer)
}

/// Verifies tokens against one secret and a maximum age.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    secret: TokenSecret,
    max_age: Duration,
}

impl TokenVerifier {
    pub fn new(secret: TokenSecret, max_age: Duration) -> Self {
        Self { secret, max_age }
    }

    /// Verifier with a max age given in hours, as it appears in config and on
    /// the command line. The age must be positive and representable.
    pub fn with_max_age_hours(secret: TokenSecret, hours: i64) -> Result<Self, AuthError> {
        match TimeDelta::try_hours(hours) {
            Some(max_age) if hours > 0 => Ok(Self::new(secret, max_age)),
            _ => Err(AuthError::InvalidMaxAge(hours)),
        }
    }

    /// Tokens expire 24 hours after issue.
    pub fn with_default_age(secret: TokenSecret) -> Self {
        Self::new(secret, Duration::hours(24))
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, AuthError> {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(token.trim())
            .map_err(|_| AuthError::Base64)?;
        let decoded = String::from_utf8(decoded).map_err(|_| AuthError::NotUtf8)?;

        let parts: Vec<&str> = decoded.split(':').collect();
        if parts.len() < 3 {
            return Err(AuthError::TooFewParts(parts.len()));
        }
        let username = parts[0];
        let timestamp_raw = parts[1];
        // Anything after the second separator belongs to the signature.
        let signature = parts[2..].join(":");

        let timestamp_ms: i64 = timestamp_raw
            .parse()
            .map_err(|_| AuthError::InvalidTimestamp(timestamp_raw.to_string()))?;
        let issued_at = Utc
            .timestamp_millis_opt(timestamp_ms)
            .single()
            .ok_or_else(|| AuthError::InvalidTimestamp(timestamp_raw.to_string()))?;

        let age = now - issued_at;
        if age > self.max_age {
            return Err(AuthError::Expired {
                age_hours: age.num_hours(),
                max_hours: self.max_age.num_hours(),
            });
        }

        if signature.len() != SIGNATURE_HEX_LEN
            || !signature.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(AuthError::MalformedSignature);
        }
        let expected = hex::decode(&signature).map_err(|_| AuthError::MalformedSignature)?;

        let mut mac = self.secret.mac();
        mac.update(format!("{username}:{timestamp_raw}").as_bytes());
        mac.verify_slice(&expected)
            .map_err(|_| AuthError::SignatureMismatch)?;

        debug!(username, "Bearer token verified");
        Ok(TokenClaims {
            username: username.to_string(),
            issued_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
