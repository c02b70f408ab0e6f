//! Stateless sync tokens
//!
//! A token is `<payload>.<signature>`: the base64url (unpadded) JSON
//! claims, and the base64url HMAC-SHA256 of that payload segment. Nothing
//! is stored server-side; verification needs only the secret.

use std::fmt;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use crypto::mac::{hmac_sha256, verify_hmac_sha256, HMAC_SHA256_LEN};
use crypto::random::random_hex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

pub const SYNC_TOKEN_VERSION: u32 = 1;

/// Random bytes in a token nonce
const NONCE_BYTES: usize = 16;

/// Claims carried by a sync token; times are Unix milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SyncTokenClaims {
    pub version: u32,
    pub user_id: String,
    pub issued_at: i64,
    pub expires_at: i64,
    pub nonce: String,
}

/// Issues and verifies sync tokens with one secret
pub struct SyncTokenSigner {
    secret: SecretString,
}

impl fmt::Debug for SyncTokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncTokenSigner")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl SyncTokenSigner {
    /// # Errors
    ///
    /// `SyncError::Configuration` for an empty secret.
    pub fn new(secret: SecretString) -> SyncResult<Self> {
        if secret.expose_secret().is_empty() {
            return Err(SyncError::Configuration(
                "sync token secret must not be empty".to_string(),
            ));
        }
        Ok(Self { secret })
    }

    fn key(&self) -> &[u8] {
        self.secret.expose_secret().as_bytes()
    }

    /// Issue a token for `user_id` valid for `ttl` from now
    pub fn create(&self, user_id: &str, ttl: Duration) -> SyncResult<String> {
        self.create_at(user_id, ttl, Utc::now())
    }

    pub fn create_at(&self, user_id: &str, ttl: Duration, now: DateTime<Utc>) -> SyncResult<String> {
        let issued_at = now.timestamp_millis();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let claims = SyncTokenClaims {
            version: SYNC_TOKEN_VERSION,
            user_id: user_id.to_string(),
            issued_at,
            expires_at: issued_at.saturating_add(ttl_ms),
            nonce: random_hex(NONCE_BYTES),
        };

        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let signature = hmac_sha256(self.key(), payload.as_bytes())?;

        tracing::debug!(user_id, expires_at = claims.expires_at, "Issued sync token");

        Ok(format!("{payload}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Claims of a valid, unexpired token; `None` for anything else
    pub fn verify(&self, token: &str) -> Option<SyncTokenClaims> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Option<SyncTokenClaims> {
        let (payload, signature) = token.split_once('.')?;

        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        if signature.len() != HMAC_SHA256_LEN {
            return None;
        }
        if !verify_hmac_sha256(self.key(), payload.as_bytes(), &signature).ok()? {
            tracing::debug!("Sync token signature mismatch");
            return None;
        }

        let claims: SyncTokenClaims =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).ok()?).ok()?;
        if claims.version != SYNC_TOKEN_VERSION || claims.user_id.is_empty() {
            return None;
        }
        if claims.expires_at <= now.timestamp_millis() {
            tracing::debug!(user_id = %claims.user_id, "Sync token expired");
            return None;
        }

        Some(claims)
    }
}
