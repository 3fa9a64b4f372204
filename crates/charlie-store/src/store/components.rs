//! Agent components: the configurable assistants users build.
//!
//! A component can optionally be published to the shared gallery and
//! exposed through an embed token for anonymous widget access. The embed
//! lookup is the only read here that is not owner-scoped.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use super::{new_id, new_token, now, Page, RequestContext, Store};
use crate::db::DbRow;
use crate::error::{Result, StoreError};
use crate::sanitize;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct AgentComponent {
    pub id: String,
    pub user_id: String,
    pub project_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub icon: String,
    pub color: String,
    pub avatar_url: Option<String>,
    pub qa_who: Option<String>,
    pub qa_rules: Option<String>,
    pub qa_tricks: Option<String>,
    pub system_prompt: Option<String>,
    pub advanced_config: Option<JsonValue>,
    pub component_file_path: Option<String>,
    pub component_class_name: Option<String>,
    pub is_published: bool,
    pub selected_tools: Option<JsonValue>,
    pub knowledge_source_ids: Option<JsonValue>,
    pub is_embeddable: bool,
    pub embed_config: Option<JsonValue>,
    pub embed_token: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewComponent {
    pub project_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub system_prompt: Option<String>,
    pub qa_who: Option<String>,
    pub qa_rules: Option<String>,
    pub qa_tricks: Option<String>,
}

/// Partial update; None leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ComponentUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub avatar_url: Option<Option<String>>,
    pub qa_who: Option<Option<String>>,
    pub qa_rules: Option<Option<String>>,
    pub qa_tricks: Option<Option<String>>,
    pub system_prompt: Option<Option<String>>,
    pub advanced_config: Option<Option<JsonValue>>,
    pub selected_tools: Option<Option<JsonValue>>,
    pub knowledge_source_ids: Option<Option<JsonValue>>,
    pub is_active: Option<bool>,
}

fn row_to_component(row: &DbRow) -> Result<AgentComponent> {
    Ok(AgentComponent {
        id: row.get_text("id")?,
        user_id: row.get_text("user_id")?,
        project_id: row.get_opt_text("project_id")?,
        name: row.get_text("name")?,
        description: row.get_opt_text("description")?,
        icon: row.get_text("icon")?,
        color: row.get_text("color")?,
        avatar_url: row.get_opt_text("avatar_url")?,
        qa_who: row.get_opt_text("qa_who")?,
        qa_rules: row.get_opt_text("qa_rules")?,
        qa_tricks: row.get_opt_text("qa_tricks")?,
        system_prompt: row.get_opt_text("system_prompt")?,
        advanced_config: row.get_opt_json("advanced_config")?,
        component_file_path: row.get_opt_text("component_file_path")?,
        component_class_name: row.get_opt_text("component_class_name")?,
        is_published: row.get_bool("is_published")?,
        selected_tools: row.get_opt_json("selected_tools")?,
        knowledge_source_ids: row.get_opt_json("knowledge_source_ids")?,
        is_embeddable: row.get_bool("is_embeddable")?,
        embed_config: row.get_opt_json("embed_config")?,
        embed_token: row.get_opt_text("embed_token")?,
        is_active: row.get_bool("is_active")?,
        created_at: row.get_timestamp("created_at")?,
        updated_at: row.get_timestamp("updated_at")?,
    })
}

const COMPONENT_COLUMNS: &str = "id, user_id, project_id, name, description, icon, color, avatar_url, \
     qa_who, qa_rules, qa_tricks, system_prompt, advanced_config, \
     component_file_path, component_class_name, is_published, selected_tools, \
     knowledge_source_ids, is_embeddable, embed_config, embed_token, \
     is_active, created_at, updated_at";

fn clean_opt_json(value: Option<JsonValue>) -> Option<JsonValue> {
    value.map(sanitize::clean_json)
}

/// advanced_config carries model routing plus free-form extras; the model
/// fields themselves are mandatory strings.
fn check_advanced_config(config: &JsonValue) -> Result<()> {
    let map = config
        .as_object()
        .ok_or_else(|| StoreError::validation("advanced_config must be an object"))?;
    for key in ["model_provider", "model_name"] {
        match map.get(key) {
            Some(JsonValue::String(s)) if !s.is_empty() => {}
            _ => {
                return Err(StoreError::validation(format!(
                    "advanced_config requires a non-empty {} string",
                    key
                )))
            }
        }
    }
    Ok(())
}

fn check_id_array(value: &JsonValue, field: &str) -> Result<()> {
    match value {
        JsonValue::Array(items) if items.iter().all(JsonValue::is_string) => Ok(()),
        _ => Err(StoreError::validation(format!(
            "{} must be an array of strings",
            field
        ))),
    }
}

impl Store {
    pub async fn create_component(
        &self,
        ctx: &RequestContext,
        new: NewComponent,
    ) -> Result<AgentComponent> {
        ctx.guard("create_component", async {
            if new.name.trim().is_empty() {
                return Err(StoreError::validation("component name is required"));
            }
            if let Some(project_id) = &new.project_id {
                self.get_project_unguarded(ctx, project_id).await?;
            }

            let ts = now();
            let row = self
                .pool()
                .fetch_one(
                    &format!(
                        "INSERT INTO agent_components \
                             (id, user_id, project_id, name, description, icon, color, \
                              qa_who, qa_rules, qa_tricks, system_prompt, is_published, \
                              is_embeddable, is_active, created_at, updated_at) \
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                         RETURNING {}",
                        COMPONENT_COLUMNS
                    ),
                    &[
                        Value::from(new_id()),
                        Value::from(ctx.user_id.as_str()),
                        Value::from(new.project_id),
                        Value::from(new.name.trim()),
                        Value::from(new.description),
                        Value::from(new.icon.as_deref().unwrap_or("bot")),
                        Value::from(new.color.as_deref().unwrap_or("#7C3AED")),
                        Value::from(new.qa_who),
                        Value::from(new.qa_rules),
                        Value::from(new.qa_tricks),
                        Value::from(new.system_prompt),
                        Value::from(false),
                        Value::from(false),
                        Value::from(true),
                        Value::from(ts),
                        Value::from(ts),
                    ],
                )
                .await?;
            row_to_component(&row)
        })
        .await
    }

    pub async fn get_component(
        &self,
        ctx: &RequestContext,
        component_id: &str,
    ) -> Result<AgentComponent> {
        ctx.guard("get_component", async {
            self.fetch_component(ctx, component_id).await
        })
        .await
    }

    /// Newest first; optionally narrowed to one project.
    pub async fn list_components(
        &self,
        ctx: &RequestContext,
        project_id: Option<&str>,
        page: Page,
    ) -> Result<Vec<AgentComponent>> {
        ctx.guard("list_components", async {
            let sql = format!(
                "SELECT {} FROM agent_components WHERE user_id = ?{} \
                 ORDER BY created_at DESC LIMIT ? OFFSET ?",
                COMPONENT_COLUMNS,
                if project_id.is_some() {
                    " AND project_id = ?"
                } else {
                    ""
                }
            );
            let mut params = vec![Value::from(ctx.user_id.as_str())];
            if let Some(project_id) = project_id {
                params.push(Value::from(project_id));
            }
            params.push(Value::from(page.limit()));
            params.push(Value::from(page.offset()));

            let rows = self.pool().fetch_all(&sql, &params).await?;
            rows.iter().map(row_to_component).collect()
        })
        .await
    }

    pub async fn update_component(
        &self,
        ctx: &RequestContext,
        component_id: &str,
        update: ComponentUpdate,
    ) -> Result<AgentComponent> {
        ctx.guard("update_component", async {
            let mut component = self.fetch_component(ctx, component_id).await?;
            if let Some(name) = update.name {
                if name.trim().is_empty() {
                    return Err(StoreError::validation("component name is required"));
                }
                component.name = name.trim().to_string();
            }
            if let Some(v) = update.description {
                component.description = v;
            }
            if let Some(v) = update.icon {
                component.icon = v;
            }
            if let Some(v) = update.color {
                component.color = v;
            }
            if let Some(v) = update.avatar_url {
                component.avatar_url = v;
            }
            if let Some(v) = update.qa_who {
                component.qa_who = v;
            }
            if let Some(v) = update.qa_rules {
                component.qa_rules = v;
            }
            if let Some(v) = update.qa_tricks {
                component.qa_tricks = v;
            }
            if let Some(v) = update.system_prompt {
                component.system_prompt = v;
            }
            if let Some(v) = update.advanced_config {
                if let Some(config) = &v {
                    check_advanced_config(config)?;
                }
                component.advanced_config = clean_opt_json(v);
            }
            if let Some(v) = update.selected_tools {
                if let Some(tools) = &v {
                    check_id_array(tools, "selected_tools")?;
                }
                component.selected_tools = clean_opt_json(v);
            }
            if let Some(v) = update.knowledge_source_ids {
                if let Some(ids) = &v {
                    check_id_array(ids, "knowledge_source_ids")?;
                }
                component.knowledge_source_ids = clean_opt_json(v);
            }
            if let Some(v) = update.is_active {
                component.is_active = v;
            }
            component.updated_at = now();

            self.pool()
                .execute(
                    "UPDATE agent_components SET name = ?, description = ?, icon = ?, \
                             color = ?, avatar_url = ?, qa_who = ?, qa_rules = ?, \
                             qa_tricks = ?, system_prompt = ?, advanced_config = ?, \
                             selected_tools = ?, knowledge_source_ids = ?, is_active = ?, \
                             updated_at = ? \
                     WHERE id = ? AND user_id = ?",
                    &[
                        Value::from(component.name.as_str()),
                        Value::from(component.description.clone()),
                        Value::from(component.icon.as_str()),
                        Value::from(component.color.as_str()),
                        Value::from(component.avatar_url.clone()),
                        Value::from(component.qa_who.clone()),
                        Value::from(component.qa_rules.clone()),
                        Value::from(component.qa_tricks.clone()),
                        Value::from(component.system_prompt.clone()),
                        Value::from(component.advanced_config.clone()),
                        Value::from(component.selected_tools.clone()),
                        Value::from(component.knowledge_source_ids.clone()),
                        Value::from(component.is_active),
                        Value::from(component.updated_at),
                        Value::from(component_id),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            Ok(component)
        })
        .await
    }

    /// Move to another project, or to None for "no project". The target
    /// project must belong to the same user.
    pub async fn move_component_to_project(
        &self,
        ctx: &RequestContext,
        component_id: &str,
        project_id: Option<&str>,
    ) -> Result<()> {
        ctx.guard("move_component_to_project", async {
            self.fetch_component(ctx, component_id).await?;
            if let Some(project_id) = project_id {
                self.get_project_unguarded(ctx, project_id).await?;
            }
            self.pool()
                .execute(
                    "UPDATE agent_components SET project_id = ?, updated_at = ? \
                     WHERE id = ? AND user_id = ?",
                    &[
                        Value::from(project_id),
                        Value::from(now()),
                        Value::from(component_id),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            Ok(())
        })
        .await
    }

    pub async fn set_component_published(
        &self,
        ctx: &RequestContext,
        component_id: &str,
        published: bool,
    ) -> Result<()> {
        ctx.guard("set_component_published", async {
            self.fetch_component(ctx, component_id).await?;
            self.pool()
                .execute(
                    "UPDATE agent_components SET is_published = ?, updated_at = ? \
                     WHERE id = ? AND user_id = ?",
                    &[
                        Value::from(published),
                        Value::from(now()),
                        Value::from(component_id),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            Ok(())
        })
        .await
    }

    /// Turn on embedding and mint a token. Re-enabling keeps the existing
    /// token so already-deployed widgets survive.
    pub async fn enable_component_embed(
        &self,
        ctx: &RequestContext,
        component_id: &str,
        embed_config: Option<JsonValue>,
    ) -> Result<String> {
        ctx.guard("enable_component_embed", async {
            let component = self.fetch_component(ctx, component_id).await?;
            let token = component.embed_token.unwrap_or_else(new_token);
            self.pool()
                .execute(
                    "UPDATE agent_components SET is_embeddable = ?, embed_token = ?, \
                             embed_config = ?, updated_at = ? \
                     WHERE id = ? AND user_id = ?",
                    &[
                        Value::from(true),
                        Value::from(token.as_str()),
                        Value::from(clean_opt_json(embed_config)),
                        Value::from(now()),
                        Value::from(component_id),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            Ok(token)
        })
        .await
    }

    /// Turn off embedding and discard the token.
    pub async fn disable_component_embed(
        &self,
        ctx: &RequestContext,
        component_id: &str,
    ) -> Result<()> {
        ctx.guard("disable_component_embed", async {
            self.fetch_component(ctx, component_id).await?;
            self.pool()
                .execute(
                    "UPDATE agent_components SET is_embeddable = ?, embed_token = ?, \
                             updated_at = ? \
                     WHERE id = ? AND user_id = ?",
                    &[
                        Value::from(false),
                        Value::null_text(),
                        Value::from(now()),
                        Value::from(component_id),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            Ok(())
        })
        .await
    }

    /// Anonymous embed lookup. Only embeddable active components resolve.
    pub async fn find_component_by_embed_token(&self, token: &str) -> Result<AgentComponent> {
        let row = self
            .pool()
            .fetch_optional(
                &format!(
                    "SELECT {} FROM agent_components \
                     WHERE embed_token = ? AND is_embeddable = ? AND is_active = ?",
                    COMPONENT_COLUMNS
                ),
                &[Value::from(token), Value::from(true), Value::from(true)],
            )
            .await?
            .ok_or_else(|| StoreError::not_found("component", "embed token"))?;
        row_to_component(&row)
    }

    pub async fn delete_component(&self, ctx: &RequestContext, component_id: &str) -> Result<()> {
        ctx.guard("delete_component", async {
            let affected = self
                .pool()
                .execute(
                    "DELETE FROM agent_components WHERE id = ? AND user_id = ?",
                    &[Value::from(component_id), Value::from(ctx.user_id.as_str())],
                )
                .await?;
            if affected == 0 {
                return Err(StoreError::not_found("component", component_id));
            }
            Ok(())
        })
        .await
    }

    async fn fetch_component(
        &self,
        ctx: &RequestContext,
        component_id: &str,
    ) -> Result<AgentComponent> {
        let row = self
            .pool()
            .fetch_optional(
                &format!(
                    "SELECT {} FROM agent_components WHERE id = ? AND user_id = ?",
                    COMPONENT_COLUMNS
                ),
                &[Value::from(component_id), Value::from(ctx.user_id.as_str())],
            )
            .await?
            .ok_or_else(|| StoreError::not_found("component", component_id))?;
        row_to_component(&row)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil;
    use super::*;

    async fn make(store: &Store, ctx: &RequestContext, name: &str) -> AgentComponent {
        store
            .create_component(
                ctx,
                NewComponent {
                    name: name.into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (store, ctx) = testutil::store_with_user().await;
        let component = make(&store, &ctx, "Helper").await;
        let fetched = store.get_component(&ctx, &component.id).await.unwrap();
        assert_eq!(fetched.name, "Helper");
        assert!(!fetched.is_published);
        assert!(fetched.is_active);
    }

    #[tokio::test]
    async fn test_cross_user_isolation() {
        let (store, ctx) = testutil::store_with_user().await;
        let other = testutil::second_user(&store).await;
        let component = make(&store, &ctx, "Mine").await;
        assert!(matches!(
            store.get_component(&other, &component.id).await.unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_move_rejects_foreign_project() {
        let (store, ctx) = testutil::store_with_user().await;
        let other = testutil::second_user(&store).await;
        let component = make(&store, &ctx, "Mover").await;
        let foreign = store.ensure_default_project(&other).await.unwrap();
        assert!(matches!(
            store
                .move_component_to_project(&ctx, &component.id, Some(&foreign.id))
                .await
                .unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_config_blob_shapes_enforced() {
        let (store, ctx) = testutil::store_with_user().await;
        let component = make(&store, &ctx, "Shaped").await;

        // model routing fields are mandatory inside advanced_config
        let err = store
            .update_component(
                &ctx,
                &component.id,
                ComponentUpdate {
                    advanced_config: Some(Some(serde_json::json!({"temperature": 0.2}))),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let ok = store
            .update_component(
                &ctx,
                &component.id,
                ComponentUpdate {
                    advanced_config: Some(Some(serde_json::json!({
                        "model_provider": "openai",
                        "model_name": "gpt-4o",
                        "temperature": 0.2
                    }))),
                    selected_tools: Some(Some(serde_json::json!(["search", "calculator"]))),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(
            ok.selected_tools,
            Some(serde_json::json!(["search", "calculator"]))
        );

        assert!(store
            .update_component(
                &ctx,
                &component.id,
                ComponentUpdate {
                    selected_tools: Some(Some(serde_json::json!([1, 2]))),
                    ..Default::default()
                },
            )
            .await
            .is_err());
        assert!(store
            .update_component(
                &ctx,
                &component.id,
                ComponentUpdate {
                    knowledge_source_ids: Some(Some(serde_json::json!({"ids": []}))),
                    ..Default::default()
                },
            )
            .await
            .is_err());

        // clearing a blob needs no shape
        let cleared = store
            .update_component(
                &ctx,
                &component.id,
                ComponentUpdate {
                    advanced_config: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cleared.advanced_config, None);
    }

    #[tokio::test]
    async fn test_embed_token_lifecycle() {
        let (store, ctx) = testutil::store_with_user().await;
        let component = make(&store, &ctx, "Widget").await;

        let token = store
            .enable_component_embed(&ctx, &component.id, Some(serde_json::json!({"theme": "dark"})))
            .await
            .unwrap();
        let public = store.find_component_by_embed_token(&token).await.unwrap();
        assert_eq!(public.id, component.id);

        // re-enabling keeps the token stable
        let again = store
            .enable_component_embed(&ctx, &component.id, None)
            .await
            .unwrap();
        assert_eq!(again, token);

        store
            .disable_component_embed(&ctx, &component.id)
            .await
            .unwrap();
        assert!(store.find_component_by_embed_token(&token).await.is_err());
    }

    #[tokio::test]
    async fn test_embed_config_sanitized() {
        let (store, ctx) = testutil::store_with_user().await;
        let component = make(&store, &ctx, "Widget").await;
        let token = store
            .enable_component_embed(
                &ctx,
                &component.id,
                serde_json::json!({"opacity": f64::NAN}).into(),
            )
            .await
            .unwrap();
        let public = store.find_component_by_embed_token(&token).await.unwrap();
        assert_eq!(
            public.embed_config,
            Some(serde_json::json!({"opacity": null}))
        );
    }

    #[tokio::test]
    async fn test_list_scoped_to_project() {
        let (store, ctx) = testutil::store_with_user().await;
        let project = store.ensure_default_project(&ctx).await.unwrap();
        let inside = store
            .create_component(
                &ctx,
                NewComponent {
                    name: "Inside".into(),
                    project_id: Some(project.id.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        make(&store, &ctx, "Outside").await;

        let listed = store
            .list_components(&ctx, Some(&project.id), Page::default())
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, inside.id);

        let all = store
            .list_components(&ctx, None, Page::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }
}
