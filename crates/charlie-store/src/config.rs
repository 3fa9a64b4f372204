//! Store configuration loading and validation.
//!
//! Config comes from a YAML file or straight from the environment. The
//! database URL scheme selects the dialect: `sqlite:` for the embedded
//! single-file engine, `postgres:`/`postgresql:` for the server engine.
//! `${VAR}` references in string values are expanded from the environment
//! so config files never need to embed secrets.

use serde::Deserialize;
use std::path::Path;

use crate::dialect::DialectKind;
use crate::error::{Result, StoreError};

fn default_max_connections() -> u32 {
    10
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Top-level store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Database URL (`sqlite:...` or `postgres://...`).
    pub database_url: String,

    /// Base64-encoded 32-byte key for credential encryption.
    pub encryption_key: Option<String>,

    /// Connection pool size. The embedded dialect is pinned to a single
    /// connection regardless of this value; see `DbPool::connect`.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Embedded-dialect busy timeout before a lock attempt gives up.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl StoreConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let expanded = expand_env_vars(&raw)?;
        let config: StoreConfig = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the environment (`DATABASE_URL`,
    /// `STORE_ENCRYPTION_KEY`, `STORE_MAX_CONNECTIONS`).
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| StoreError::Config("DATABASE_URL is not set".to_string()))?;
        let encryption_key = std::env::var("STORE_ENCRYPTION_KEY").ok();
        let max_connections = match std::env::var("STORE_MAX_CONNECTIONS") {
            Ok(v) => v
                .parse()
                .map_err(|_| StoreError::Config("STORE_MAX_CONNECTIONS must be a number".to_string()))?,
            Err(_) => default_max_connections(),
        };
        let config = StoreConfig {
            database_url,
            encryption_key,
            max_connections,
            busy_timeout_ms: default_busy_timeout_ms(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration before anything connects.
    pub fn validate(&self) -> Result<()> {
        self.dialect_kind()?;
        if self.max_connections == 0 {
            return Err(StoreError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if let Some(key) = &self.encryption_key {
            // Fails fast on malformed key material.
            crate::crypto::CredentialCipher::from_base64_key(key)?;
        }
        Ok(())
    }

    /// Dialect implied by the database URL scheme.
    pub fn dialect_kind(&self) -> Result<DialectKind> {
        DialectKind::from_url(&self.database_url)
    }
}

/// Expand `${VAR}` references from the environment.
fn expand_env_vars(input: &str) -> Result<String> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        let end = tail.find('}').ok_or_else(|| {
            StoreError::Config("unterminated ${...} reference in config".to_string())
        })?;
        let var = &tail[..end];
        let value = std::env::var(var)
            .map_err(|_| StoreError::Config(format!("environment variable {} is not set", var)))?;
        output.push_str(&value);
        rest = &tail[end + 1..];
    }
    output.push_str(rest);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml() {
        let config: StoreConfig = serde_yaml::from_str(
            "database_url: \"sqlite::memory:\"\nmax_connections: 4\n",
        )
        .unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.busy_timeout_ms, 5_000);
        config.validate().unwrap();
        assert_eq!(config.dialect_kind().unwrap(), DialectKind::Sqlite);
    }

    #[test]
    fn test_postgres_url() {
        let config: StoreConfig =
            serde_yaml::from_str("database_url: postgres://app@db/charlie\n").unwrap();
        assert_eq!(config.dialect_kind().unwrap(), DialectKind::Postgres);
    }

    #[test]
    fn test_unknown_scheme_rejected() {
        let config: StoreConfig =
            serde_yaml::from_str("database_url: mysql://db/charlie\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("CHARLIE_TEST_DB_PASS", "hunter2");
        let out = expand_env_vars("url: postgres://app:${CHARLIE_TEST_DB_PASS}@db").unwrap();
        assert_eq!(out, "url: postgres://app:hunter2@db");
        assert!(expand_env_vars("x: ${CHARLIE_TEST_UNSET_VAR}").is_err());
        assert!(expand_env_vars("x: ${broken").is_err());
    }

    #[test]
    fn test_bad_encryption_key_rejected() {
        let config: StoreConfig = serde_yaml::from_str(
            "database_url: \"sqlite::memory:\"\nencryption_key: not-base64!!\n",
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
