//! Environment configuration

use std::fmt;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::{SyncError, SyncResult};
use crate::store::SyncDbConfig;
use crate::token::SyncTokenSigner;

pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(12 * 60 * 60);

pub struct SyncConfig {
    pub database: SyncDbConfig,
    pub token_secret: SecretString,
    pub token_ttl: Duration,
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("database", &self.database)
            .field("token_secret", &"[REDACTED]")
            .field("token_ttl", &self.token_ttl)
            .finish()
    }
}

impl SyncDbConfig {
    /// Database settings from the process environment; never fails
    pub fn from_env() -> Self {
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let defaults = SyncDbConfig::default();
        SyncDbConfig {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections: lookup("SYNC_DB_MAX_CONNECTIONS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_connections),
            busy_timeout: lookup("SYNC_DB_BUSY_TIMEOUT_MS")
                .and_then(|s| s.parse().ok())
                .map_or(defaults.busy_timeout, Duration::from_millis),
            enable_wal: defaults.enable_wal,
        }
    }
}

impl SyncConfig {
    /// Read configuration from the process environment
    ///
    /// # Errors
    ///
    /// `SyncError::Configuration` when neither `SYNC_TOKEN_SECRET` nor
    /// `AUTH_SECRET` is set.
    pub fn from_env() -> SyncResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to its value
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SyncResult<Self> {
        let database = SyncDbConfig::from_lookup(&lookup);

        let token_secret = lookup("SYNC_TOKEN_SECRET")
            .filter(|s| !s.is_empty())
            .or_else(|| lookup("AUTH_SECRET").filter(|s| !s.is_empty()))
            .map(SecretString::new)
            .ok_or_else(|| {
                SyncError::Configuration(
                    "SYNC_TOKEN_SECRET (or AUTH_SECRET) must be set".to_string(),
                )
            })?;

        let token_ttl = lookup("SYNC_TOKEN_TTL_SECS")
            .and_then(|s| s.parse().ok())
            .map_or(DEFAULT_TOKEN_TTL, Duration::from_secs);

        Ok(Self {
            database,
            token_secret,
            token_ttl,
        })
    }

    pub fn token_signer(&self) -> SyncResult<SyncTokenSigner> {
        SyncTokenSigner::new(SecretString::new(
            self.token_secret.expose_secret().clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SyncConfig::from_lookup(lookup(&[("SYNC_TOKEN_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.database.database_url, "sqlite:stagedoor.db");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.token_ttl, DEFAULT_TOKEN_TTL);
        assert_eq!(config.token_secret.expose_secret(), "s3cret");
    }

    #[test]
    fn test_overrides() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("SYNC_DB_MAX_CONNECTIONS", "2"),
            ("SYNC_TOKEN_TTL_SECS", "90"),
            ("SYNC_TOKEN_SECRET", "s3cret"),
        ]))
        .unwrap();
        assert_eq!(config.database.database_url, "sqlite::memory:");
        assert_eq!(config.database.max_connections, 2);
        assert_eq!(config.token_ttl, Duration::from_secs(90));
    }

    #[test]
    fn test_auth_secret_fallback() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("SYNC_TOKEN_SECRET", ""),
            ("AUTH_SECRET", "fallback"),
        ]))
        .unwrap();
        assert_eq!(config.token_secret.expose_secret(), "fallback");
        assert!(config.token_signer().is_ok());
    }

    #[test]
    fn test_missing_secret_fails() {
        let err = SyncConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = SyncConfig::from_lookup(lookup(&[("AUTH_SECRET", "hunter2")])).unwrap();
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
