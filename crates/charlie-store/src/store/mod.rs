//! Owner-scoped entity access.
//!
//! Every read and write is scoped to the user in the [`RequestContext`];
//! a row belonging to another user is indistinguishable from a missing row.
//! Operations that race on shared rows go through [`with_conflict_retry`],
//! and a context deadline turns an overrunning operation into
//! [`StoreError::Timeout`].

pub mod analytics;
pub mod billing;
pub mod components;
pub mod connections;
pub mod conversations;
pub mod files;
pub mod knowledge;
pub mod mcp_servers;
pub mod missions;
pub mod projects;
pub mod settings;
pub mod users;
pub mod workflows;

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::StoreConfig;
use crate::crypto::CredentialCipher;
use crate::db::DbPool;
use crate::dialect::DialectKind;
use crate::error::{Result, StoreError};

/// Entity access layer over a connected pool.
#[derive(Clone, Debug)]
pub struct Store {
    pool: DbPool,
    cipher: Option<CredentialCipher>,
}

impl Store {
    pub fn new(pool: DbPool, cipher: Option<CredentialCipher>) -> Self {
        Self { pool, cipher }
    }

    /// Connect and build the cipher from configuration.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let pool = DbPool::connect(config).await?;
        let cipher = match &config.encryption_key {
            Some(key) => Some(CredentialCipher::from_base64_key(key)?),
            None => None,
        };
        Ok(Self { pool, cipher })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub(crate) fn cipher(&self) -> Result<&CredentialCipher> {
        self.cipher.as_ref().ok_or_else(|| {
            StoreError::Config("no encryption key configured for credential storage".to_string())
        })
    }

    /// Row-lock suffix for read-modify-write transactions. The embedded
    /// dialect runs on a single connection, so writers are already serial.
    pub(crate) fn lock_suffix(&self) -> &'static str {
        match self.pool.kind() {
            DialectKind::Postgres => " FOR UPDATE",
            DialectKind::Sqlite => "",
        }
    }
}

/// Identity and deadline for one logical request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user_id: String,
    pub deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            deadline: None,
        }
    }

    pub fn with_timeout(user_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            user_id: user_id.into(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Run an operation under this context's deadline, if any.
    pub(crate) async fn guard<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, fut).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout { operation }),
            },
            None => fut.await,
        }
    }
}

/// Pagination window. Pages are 1-based; size is clamped to 1..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    page: u32,
    page_size: u32,
}

impl Page {
    pub const DEFAULT_SIZE: u32 = 20;
    pub const MAX_SIZE: u32 = 100;

    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, Self::MAX_SIZE),
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, Self::DEFAULT_SIZE)
    }
}

const RETRY_ATTEMPTS: u32 = 3;

/// Retry an operation that lost to concurrent writers, with a short
/// backoff between attempts. Anything other than a conflict returns
/// immediately.
pub(crate) async fn with_conflict_retry<T, F, Fut>(mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(StoreError::Conflict(message)) => {
                attempt += 1;
                if attempt >= RETRY_ATTEMPTS {
                    return Err(StoreError::Conflict(message));
                }
                tracing::debug!(attempt, "conflict, retrying");
                tokio::time::sleep(Duration::from_millis(u64::from(attempt) * 10)).await;
            }
            other => return other,
        }
    }
}

/// Fresh entity id.
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Opaque token for embeds and bridge auth; no dashes so it reads as a
/// single selectable word in URLs.
pub(crate) fn new_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub(crate) fn now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use crate::migrate::Migrator;

    /// In-memory store migrated to head, with a throwaway cipher.
    pub async fn store() -> Store {
        let pool = DbPool::connect_sqlite_memory().await.unwrap();
        Migrator::new(pool.clone()).unwrap().up(None).await.unwrap();
        let cipher =
            CredentialCipher::from_base64_key(&CredentialCipher::generate_key_base64()).unwrap();
        Store::new(pool, Some(cipher))
    }

    /// A store plus a registered user's context.
    pub async fn store_with_user() -> (Store, RequestContext) {
        let store = store().await;
        let user = store
            .upsert_user_by_clerk_id("clerk_1", "one@example.com", None, None)
            .await
            .unwrap();
        (store, RequestContext::new(user.id))
    }

    /// A second user on the same store, for cross-user isolation tests.
    pub async fn second_user(store: &Store) -> RequestContext {
        let user = store
            .upsert_user_by_clerk_id("clerk_2", "two@example.com", None, None)
            .await
            .unwrap();
        RequestContext::new(user.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_clamping() {
        let p = Page::new(0, 0);
        assert_eq!(p.limit(), 1);
        assert_eq!(p.offset(), 0);

        let p = Page::new(3, 500);
        assert_eq!(p.limit(), 100);
        assert_eq!(p.offset(), 200);

        assert_eq!(Page::default().limit(), 20);
    }

    #[tokio::test]
    async fn test_conflict_retry_gives_up() {
        let mut calls = 0;
        let result: Result<()> = with_conflict_retry(|| {
            calls += 1;
            async { Err(StoreError::Conflict("busy".into())) }
        })
        .await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_conflict_retry_passes_other_errors_through() {
        let mut calls = 0;
        let result: Result<()> = with_conflict_retry(|| {
            calls += 1;
            async { Err(StoreError::validation("bad")) }
        })
        .await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_deadline_expires() {
        let ctx = RequestContext::with_timeout("u1", Duration::from_millis(5));
        let result: Result<()> = ctx
            .guard("slow_op", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(
            result,
            Err(StoreError::Timeout {
                operation: "slow_op"
            })
        ));
    }
}
