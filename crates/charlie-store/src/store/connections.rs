//! Third-party app connections brokered through Composio.
//!
//! A connection starts pending and becomes active once the OAuth dance
//! finishes and an account identifier is known. One active connection per
//! (user, app, account) is enforced by a named unique constraint; the
//! duplicate surfaces as AlreadyExists.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use super::{new_id, now, Page, RequestContext, Store};
use crate::db::DbRow;
use crate::error::{Result, StoreError};
use crate::sanitize;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct UserConnection {
    pub id: String,
    pub user_id: String,
    pub app_name: String,
    pub app_display_name: Option<String>,
    pub composio_connection_id: Option<String>,
    pub composio_entity_id: String,
    pub status: String,
    pub account_identifier: Option<String>,
    pub scopes: Option<JsonValue>,
    pub available_actions: Option<JsonValue>,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn row_to_connection(row: &DbRow) -> Result<UserConnection> {
    Ok(UserConnection {
        id: row.get_text("id")?,
        user_id: row.get_text("user_id")?,
        app_name: row.get_text("app_name")?,
        app_display_name: row.get_opt_text("app_display_name")?,
        composio_connection_id: row.get_opt_text("composio_connection_id")?,
        composio_entity_id: row.get_text("composio_entity_id")?,
        status: row.get_text("status")?,
        account_identifier: row.get_opt_text("account_identifier")?,
        scopes: row.get_opt_json("scopes")?,
        available_actions: row.get_opt_json("available_actions")?,
        connected_at: row.get_opt_timestamp("connected_at")?,
        last_used_at: row.get_opt_timestamp("last_used_at")?,
        expires_at: row.get_opt_timestamp("expires_at")?,
        last_error: row.get_opt_text("last_error")?,
        created_at: row.get_timestamp("created_at")?,
        updated_at: row.get_timestamp("updated_at")?,
    })
}

const CONNECTION_COLUMNS: &str = "id, user_id, app_name, app_display_name, composio_connection_id, \
     composio_entity_id, status, account_identifier, scopes, \
     available_actions, connected_at, last_used_at, expires_at, last_error, \
     created_at, updated_at";

impl Store {
    /// Start the OAuth flow: a pending row with no account yet.
    pub async fn initiate_connection(
        &self,
        ctx: &RequestContext,
        app_name: &str,
        app_display_name: Option<&str>,
        composio_entity_id: &str,
    ) -> Result<UserConnection> {
        ctx.guard("initiate_connection", async {
            if app_name.is_empty() || composio_entity_id.is_empty() {
                return Err(StoreError::validation(
                    "app_name and composio_entity_id are required",
                ));
            }
            let ts = now();
            let row = self
                .pool()
                .fetch_one(
                    &format!(
                        "INSERT INTO user_connections (id, user_id, app_name, \
                                 app_display_name, composio_entity_id, status, \
                                 created_at, updated_at) \
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
                        CONNECTION_COLUMNS
                    ),
                    &[
                        Value::from(new_id()),
                        Value::from(ctx.user_id.as_str()),
                        Value::from(app_name),
                        Value::from(app_display_name),
                        Value::from(composio_entity_id),
                        Value::from("pending"),
                        Value::from(ts),
                        Value::from(ts),
                    ],
                )
                .await?;
            row_to_connection(&row)
        })
        .await
    }

    /// Complete the flow. A second active connection to the same account
    /// trips the unique constraint and returns AlreadyExists.
    pub async fn activate_connection(
        &self,
        ctx: &RequestContext,
        connection_id: &str,
        composio_connection_id: &str,
        account_identifier: &str,
        scopes: Option<JsonValue>,
        available_actions: Option<JsonValue>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<UserConnection> {
        ctx.guard("activate_connection", async {
            self.fetch_connection(ctx, connection_id).await?;
            let ts = now();
            self.pool()
                .execute(
                    "UPDATE user_connections SET composio_connection_id = ?, \
                             account_identifier = ?, status = ?, scopes = ?, \
                             available_actions = ?, connected_at = ?, expires_at = ?, \
                             last_error = ?, updated_at = ? \
                     WHERE id = ? AND user_id = ?",
                    &[
                        Value::from(composio_connection_id),
                        Value::from(account_identifier),
                        Value::from("active"),
                        Value::from(scopes.map(sanitize::clean_json)),
                        Value::from(available_actions.map(sanitize::clean_json)),
                        Value::from(ts),
                        Value::from(expires_at),
                        Value::null_text(),
                        Value::from(ts),
                        Value::from(connection_id),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            self.fetch_connection(ctx, connection_id).await
        })
        .await
    }

    pub async fn fail_connection(
        &self,
        ctx: &RequestContext,
        connection_id: &str,
        error: &str,
    ) -> Result<()> {
        ctx.guard("fail_connection", async {
            let affected = self
                .pool()
                .execute(
                    "UPDATE user_connections SET status = ?, last_error = ?, updated_at = ? \
                     WHERE id = ? AND user_id = ?",
                    &[
                        Value::from("failed"),
                        Value::from(error),
                        Value::from(now()),
                        Value::from(connection_id),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            if affected == 0 {
                return Err(StoreError::not_found("connection", connection_id));
            }
            Ok(())
        })
        .await
    }

    pub async fn touch_connection(&self, ctx: &RequestContext, connection_id: &str) -> Result<()> {
        ctx.guard("touch_connection", async {
            let affected = self
                .pool()
                .execute(
                    "UPDATE user_connections SET last_used_at = ? WHERE id = ? AND user_id = ?",
                    &[
                        Value::from(now()),
                        Value::from(connection_id),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            if affected == 0 {
                return Err(StoreError::not_found("connection", connection_id));
            }
            Ok(())
        })
        .await
    }

    pub async fn get_connection(
        &self,
        ctx: &RequestContext,
        connection_id: &str,
    ) -> Result<UserConnection> {
        ctx.guard("get_connection", async {
            self.fetch_connection(ctx, connection_id).await
        })
        .await
    }

    /// Newest first; optionally filtered by status.
    pub async fn list_connections(
        &self,
        ctx: &RequestContext,
        status: Option<&str>,
        page: Page,
    ) -> Result<Vec<UserConnection>> {
        ctx.guard("list_connections", async {
            let sql = format!(
                "SELECT {} FROM user_connections WHERE user_id = ?{} \
                 ORDER BY created_at DESC LIMIT ? OFFSET ?",
                CONNECTION_COLUMNS,
                if status.is_some() { " AND status = ?" } else { "" }
            );
            let mut params = vec![Value::from(ctx.user_id.as_str())];
            if let Some(status) = status {
                params.push(Value::from(status));
            }
            params.push(Value::from(page.limit()));
            params.push(Value::from(page.offset()));

            let rows = self.pool().fetch_all(&sql, &params).await?;
            rows.iter().map(row_to_connection).collect()
        })
        .await
    }

    pub async fn delete_connection(
        &self,
        ctx: &RequestContext,
        connection_id: &str,
    ) -> Result<()> {
        ctx.guard("delete_connection", async {
            let affected = self
                .pool()
                .execute(
                    "DELETE FROM user_connections WHERE id = ? AND user_id = ?",
                    &[
                        Value::from(connection_id),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            if affected == 0 {
                return Err(StoreError::not_found("connection", connection_id));
            }
            Ok(())
        })
        .await
    }

    async fn fetch_connection(
        &self,
        ctx: &RequestContext,
        connection_id: &str,
    ) -> Result<UserConnection> {
        let row = self
            .pool()
            .fetch_optional(
                &format!(
                    "SELECT {} FROM user_connections WHERE id = ? AND user_id = ?",
                    CONNECTION_COLUMNS
                ),
                &[
                    Value::from(connection_id),
                    Value::from(ctx.user_id.as_str()),
                ],
            )
            .await?
            .ok_or_else(|| StoreError::not_found("connection", connection_id))?;
        row_to_connection(&row)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil;
    use super::*;

    #[tokio::test]
    async fn test_initiate_and_activate() {
        let (store, ctx) = testutil::store_with_user().await;
        let pending = store
            .initiate_connection(&ctx, "github", Some("GitHub"), "entity-1")
            .await
            .unwrap();
        assert_eq!(pending.status, "pending");
        assert_eq!(pending.account_identifier, None);

        let active = store
            .activate_connection(
                &ctx,
                &pending.id,
                "conn-1",
                "octocat",
                Some(serde_json::json!(["repo"])),
                None,
                None,
            )
            .await
            .unwrap();
        assert_eq!(active.status, "active");
        assert_eq!(active.account_identifier.as_deref(), Some("octocat"));
        assert!(active.connected_at.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_account_rejected() {
        let (store, ctx) = testutil::store_with_user().await;
        let first = store
            .initiate_connection(&ctx, "github", None, "entity-1")
            .await
            .unwrap();
        store
            .activate_connection(&ctx, &first.id, "conn-1", "octocat", None, None, None)
            .await
            .unwrap();

        let second = store
            .initiate_connection(&ctx, "github", None, "entity-1")
            .await
            .unwrap();
        let err = store
            .activate_connection(&ctx, &second.id, "conn-2", "octocat", None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));

        // a different account on the same app is fine
        let third = store
            .initiate_connection(&ctx, "github", None, "entity-1")
            .await
            .unwrap();
        store
            .activate_connection(&ctx, &third.id, "conn-3", "hubot", None, None, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_same_account_different_users_ok() {
        let (store, ctx) = testutil::store_with_user().await;
        let other = testutil::second_user(&store).await;
        for user in [&ctx, &other] {
            let pending = store
                .initiate_connection(user, "slack", None, "entity")
                .await
                .unwrap();
            store
                .activate_connection(user, &pending.id, "conn", "team-42", None, None, None)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_status_filter() {
        let (store, ctx) = testutil::store_with_user().await;
        let a = store
            .initiate_connection(&ctx, "github", None, "e")
            .await
            .unwrap();
        store
            .activate_connection(&ctx, &a.id, "c", "acct", None, None, None)
            .await
            .unwrap();
        let b = store
            .initiate_connection(&ctx, "slack", None, "e")
            .await
            .unwrap();
        store.fail_connection(&ctx, &b.id, "denied").await.unwrap();

        let active = store
            .list_connections(&ctx, Some("active"), Page::default())
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].app_name, "github");

        let failed = store
            .list_connections(&ctx, Some("failed"), Page::default())
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].last_error.as_deref(), Some("denied"));
    }
}
