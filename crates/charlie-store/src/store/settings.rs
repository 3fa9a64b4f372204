//! Per-user preferences.
//!
//! One row per user, created lazily. `tours_completed` is a JSON array of
//! tour ids; marking a tour is idempotent.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use super::{new_id, now, RequestContext, Store};
use crate::db::DbRow;
use crate::error::{Result, StoreError};
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct UserSettings {
    pub id: String,
    pub user_id: String,
    pub default_llm_provider: Option<String>,
    pub api_keys_encrypted: Option<JsonValue>,
    pub theme: String,
    pub sidebar_collapsed: bool,
    pub onboarding_completed: bool,
    pub tours_completed: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update; None leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub default_llm_provider: Option<Option<String>>,
    pub theme: Option<String>,
    pub sidebar_collapsed: Option<bool>,
    pub onboarding_completed: Option<bool>,
}

fn row_to_settings(row: &DbRow) -> Result<UserSettings> {
    Ok(UserSettings {
        id: row.get_text("id")?,
        user_id: row.get_text("user_id")?,
        default_llm_provider: row.get_opt_text("default_llm_provider")?,
        api_keys_encrypted: row.get_opt_json("api_keys_encrypted")?,
        theme: row.get_text("theme")?,
        sidebar_collapsed: row.get_bool("sidebar_collapsed")?,
        onboarding_completed: row.get_bool("onboarding_completed")?,
        tours_completed: row.get_opt_json("tours_completed")?,
        created_at: row.get_timestamp("created_at")?,
        updated_at: row.get_timestamp("updated_at")?,
    })
}

const SETTINGS_COLUMNS: &str = "id, user_id, default_llm_provider, api_keys_encrypted, theme, \
     sidebar_collapsed, onboarding_completed, tours_completed, \
     created_at, updated_at";

impl Store {
    pub async fn get_or_create_settings(&self, ctx: &RequestContext) -> Result<UserSettings> {
        ctx.guard(
            "get_or_create_settings",
            self.get_or_create_settings_unguarded(ctx),
        )
        .await
    }

    pub async fn update_settings(
        &self,
        ctx: &RequestContext,
        update: SettingsUpdate,
    ) -> Result<UserSettings> {
        ctx.guard("update_settings", async {
            let mut settings = self.get_or_create_settings_unguarded(ctx).await?;
            if let Some(v) = update.default_llm_provider {
                settings.default_llm_provider = v;
            }
            if let Some(theme) = update.theme {
                if theme != "light" && theme != "dark" {
                    return Err(StoreError::validation(format!(
                        "unknown theme: {}",
                        theme
                    )));
                }
                settings.theme = theme;
            }
            if let Some(v) = update.sidebar_collapsed {
                settings.sidebar_collapsed = v;
            }
            if let Some(v) = update.onboarding_completed {
                settings.onboarding_completed = v;
            }
            settings.updated_at = now();

            self.pool()
                .execute(
                    "UPDATE user_settings SET default_llm_provider = ?, theme = ?, \
                             sidebar_collapsed = ?, onboarding_completed = ?, updated_at = ? \
                     WHERE user_id = ?",
                    &[
                        Value::from(settings.default_llm_provider.clone()),
                        Value::from(settings.theme.as_str()),
                        Value::from(settings.sidebar_collapsed),
                        Value::from(settings.onboarding_completed),
                        Value::from(settings.updated_at),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            Ok(settings)
        })
        .await
    }

    /// Record a completed product tour. Repeats are no-ops.
    pub async fn mark_tour_completed(
        &self,
        ctx: &RequestContext,
        tour_id: &str,
    ) -> Result<UserSettings> {
        ctx.guard("mark_tour_completed", async {
            if tour_id.is_empty() {
                return Err(StoreError::validation("tour id is required"));
            }
            let mut settings = self.get_or_create_settings_unguarded(ctx).await?;

            let mut tours = match settings.tours_completed.take() {
                Some(JsonValue::Array(items)) => items,
                _ => Vec::new(),
            };
            if !tours.iter().any(|t| t == tour_id) {
                tours.push(JsonValue::String(tour_id.to_string()));
            }
            settings.tours_completed = Some(JsonValue::Array(tours));
            settings.updated_at = now();

            self.pool()
                .execute(
                    "UPDATE user_settings SET tours_completed = ?, updated_at = ? \
                     WHERE user_id = ?",
                    &[
                        Value::from(settings.tours_completed.clone()),
                        Value::from(settings.updated_at),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            Ok(settings)
        })
        .await
    }

    async fn get_or_create_settings_unguarded(
        &self,
        ctx: &RequestContext,
    ) -> Result<UserSettings> {
        if let Some(row) = self
            .pool()
            .fetch_optional(
                &format!(
                    "SELECT {} FROM user_settings WHERE user_id = ?",
                    SETTINGS_COLUMNS
                ),
                &[Value::from(ctx.user_id.as_str())],
            )
            .await?
        {
            return row_to_settings(&row);
        }
        let ts = now();
        let row = self
            .pool()
            .fetch_one(
                &format!(
                    "INSERT INTO user_settings (id, user_id, theme, sidebar_collapsed, \
                             onboarding_completed, tours_completed, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
                    SETTINGS_COLUMNS
                ),
                &[
                    Value::from(new_id()),
                    Value::from(ctx.user_id.as_str()),
                    Value::from("light"),
                    Value::from(false),
                    Value::from(false),
                    Value::from(serde_json::json!([])),
                    Value::from(ts),
                    Value::from(ts),
                ],
            )
            .await?;
        row_to_settings(&row)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil;
    use super::*;

    #[tokio::test]
    async fn test_lazy_creation_is_stable() {
        let (store, ctx) = testutil::store_with_user().await;
        let first = store.get_or_create_settings(&ctx).await.unwrap();
        let second = store.get_or_create_settings(&ctx).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.theme, "light");
        assert!(!first.onboarding_completed);
    }

    #[tokio::test]
    async fn test_theme_validation() {
        let (store, ctx) = testutil::store_with_user().await;
        let updated = store
            .update_settings(
                &ctx,
                SettingsUpdate {
                    theme: Some("dark".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.theme, "dark");

        assert!(store
            .update_settings(
                &ctx,
                SettingsUpdate {
                    theme: Some("solarized".into()),
                    ..Default::default()
                },
            )
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_tour_completion_idempotent() {
        let (store, ctx) = testutil::store_with_user().await;
        store.mark_tour_completed(&ctx, "canvas").await.unwrap();
        store.mark_tour_completed(&ctx, "canvas").await.unwrap();
        let settings = store.mark_tour_completed(&ctx, "billing").await.unwrap();
        assert_eq!(
            settings.tours_completed,
            Some(serde_json::json!(["canvas", "billing"]))
        );
    }

    #[tokio::test]
    async fn test_settings_isolated_per_user() {
        let (store, ctx) = testutil::store_with_user().await;
        let other = testutil::second_user(&store).await;
        store.mark_tour_completed(&ctx, "canvas").await.unwrap();
        let theirs = store.get_or_create_settings(&other).await.unwrap();
        assert_eq!(theirs.tours_completed, Some(serde_json::json!([])));
    }
}
