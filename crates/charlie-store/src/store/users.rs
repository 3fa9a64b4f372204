//! User accounts.
//!
//! Identity comes from an external auth provider; the upsert keyed on the
//! provider id is the single entry point, so a user row always exists by the
//! time any other operation runs.

use chrono::{DateTime, Utc};

use super::{new_id, new_token, now, Store};
use crate::db::DbRow;
use crate::error::{Result, StoreError};
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub clerk_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
    pub mcp_bridge_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn row_to_user(row: &DbRow) -> Result<User> {
    Ok(User {
        id: row.get_text("id")?,
        clerk_id: row.get_text("clerk_id")?,
        email: row.get_text("email")?,
        first_name: row.get_opt_text("first_name")?,
        last_name: row.get_opt_text("last_name")?,
        is_active: row.get_bool("is_active")?,
        mcp_bridge_token: row.get_opt_text("mcp_bridge_token")?,
        created_at: row.get_timestamp("created_at")?,
        updated_at: row.get_timestamp("updated_at")?,
    })
}

const USER_COLUMNS: &str = "id, clerk_id, email, first_name, last_name, is_active, \
     mcp_bridge_token, created_at, updated_at";

impl Store {
    /// Create or refresh the user row for an auth-provider identity.
    pub async fn upsert_user_by_clerk_id(
        &self,
        clerk_id: &str,
        email: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<User> {
        if clerk_id.is_empty() || email.is_empty() {
            return Err(StoreError::validation("clerk_id and email are required"));
        }
        let ts = now();
        let row = self
            .pool()
            .fetch_one(
                &format!(
                    "INSERT INTO users (id, clerk_id, email, first_name, last_name, \
                                        is_active, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                     ON CONFLICT (clerk_id) DO UPDATE SET \
                         email = excluded.email, \
                         first_name = excluded.first_name, \
                         last_name = excluded.last_name, \
                         updated_at = excluded.updated_at \
                     RETURNING {}",
                    USER_COLUMNS
                ),
                &[
                    Value::from(new_id()),
                    Value::from(clerk_id),
                    Value::from(email),
                    Value::from(first_name),
                    Value::from(last_name),
                    Value::from(true),
                    Value::from(ts),
                    Value::from(ts),
                ],
            )
            .await?;
        row_to_user(&row)
    }

    pub async fn get_user(&self, user_id: &str) -> Result<User> {
        let row = self
            .pool()
            .fetch_optional(
                &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
                &[Value::from(user_id)],
            )
            .await?
            .ok_or_else(|| StoreError::not_found("user", user_id))?;
        row_to_user(&row)
    }

    pub async fn find_user_by_clerk_id(&self, clerk_id: &str) -> Result<Option<User>> {
        let row = self
            .pool()
            .fetch_optional(
                &format!("SELECT {} FROM users WHERE clerk_id = ?", USER_COLUMNS),
                &[Value::from(clerk_id)],
            )
            .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    /// Mint a fresh bridge token, replacing any previous one.
    pub async fn issue_mcp_bridge_token(&self, user_id: &str) -> Result<String> {
        let token = new_token();
        let affected = self
            .pool()
            .execute(
                "UPDATE users SET mcp_bridge_token = ?, updated_at = ? WHERE id = ?",
                &[
                    Value::from(token.clone()),
                    Value::from(now()),
                    Value::from(user_id),
                ],
            )
            .await?;
        if affected == 0 {
            return Err(StoreError::not_found("user", user_id));
        }
        Ok(token)
    }

    pub async fn revoke_mcp_bridge_token(&self, user_id: &str) -> Result<()> {
        let affected = self
            .pool()
            .execute(
                "UPDATE users SET mcp_bridge_token = ?, updated_at = ? WHERE id = ?",
                &[Value::null_text(), Value::from(now()), Value::from(user_id)],
            )
            .await?;
        if affected == 0 {
            return Err(StoreError::not_found("user", user_id));
        }
        Ok(())
    }

    /// Resolve a bridge token to its user. Inactive accounts do not resolve.
    pub async fn find_user_by_bridge_token(&self, token: &str) -> Result<User> {
        let row = self
            .pool()
            .fetch_optional(
                &format!(
                    "SELECT {} FROM users WHERE mcp_bridge_token = ? AND is_active = ?",
                    USER_COLUMNS
                ),
                &[Value::from(token), Value::from(true)],
            )
            .await?
            .ok_or_else(|| StoreError::not_found("user", "bridge token"))?;
        row_to_user(&row)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil;
    use crate::error::StoreError;

    #[tokio::test]
    async fn test_upsert_is_idempotent_on_clerk_id() {
        let store = testutil::store().await;
        let first = store
            .upsert_user_by_clerk_id("clerk_a", "a@example.com", Some("Ada"), None)
            .await
            .unwrap();
        let second = store
            .upsert_user_by_clerk_id("clerk_a", "new@example.com", Some("Ada"), Some("L"))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.email, "new@example.com");
        assert_eq!(second.last_name.as_deref(), Some("L"));
    }

    #[tokio::test]
    async fn test_bridge_token_lifecycle() {
        let store = testutil::store().await;
        let user = store
            .upsert_user_by_clerk_id("clerk_a", "a@example.com", None, None)
            .await
            .unwrap();

        let token = store.issue_mcp_bridge_token(&user.id).await.unwrap();
        let resolved = store.find_user_by_bridge_token(&token).await.unwrap();
        assert_eq!(resolved.id, user.id);

        // reissue invalidates the old token
        let fresh = store.issue_mcp_bridge_token(&user.id).await.unwrap();
        assert_ne!(fresh, token);
        assert!(store.find_user_by_bridge_token(&token).await.is_err());

        store.revoke_mcp_bridge_token(&user.id).await.unwrap();
        assert!(store.find_user_by_bridge_token(&fresh).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let store = testutil::store().await;
        let err = store.get_user("missing").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(matches!(
            store.issue_mcp_bridge_token("missing").await.unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_empty_identity_rejected() {
        let store = testutil::store().await;
        assert!(store
            .upsert_user_by_clerk_id("", "a@example.com", None, None)
            .await
            .is_err());
    }
}
