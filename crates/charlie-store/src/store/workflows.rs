//! Workflows: canvas flow definitions executed by the flow engine.
//!
//! Flow documents arrive from the engine and may carry non-finite floats
//! in node positions; everything JSON is cleaned before storage.
//! Conversations reference workflows without a foreign key, so deletion
//! clears those references itself.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use super::{new_id, now, Page, RequestContext, Store};
use crate::db::DbRow;
use crate::error::{Result, StoreError};
use crate::sanitize;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Workflow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub langflow_flow_id: Option<String>,
    pub flow_data: Option<JsonValue>,
    pub agent_component_ids: Option<JsonValue>,
    pub is_active: bool,
    pub is_public: bool,
    pub is_agent_skill: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewWorkflow {
    pub name: String,
    pub description: Option<String>,
    pub langflow_flow_id: Option<String>,
    pub flow_data: Option<JsonValue>,
    pub agent_component_ids: Option<JsonValue>,
}

/// Partial update; None leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct WorkflowUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub langflow_flow_id: Option<Option<String>>,
    pub flow_data: Option<Option<JsonValue>>,
    pub agent_component_ids: Option<Option<JsonValue>>,
    pub is_active: Option<bool>,
    pub is_public: Option<bool>,
    pub is_agent_skill: Option<bool>,
}

fn row_to_workflow(row: &DbRow) -> Result<Workflow> {
    Ok(Workflow {
        id: row.get_text("id")?,
        user_id: row.get_text("user_id")?,
        name: row.get_text("name")?,
        description: row.get_opt_text("description")?,
        langflow_flow_id: row.get_opt_text("langflow_flow_id")?,
        flow_data: row.get_opt_json("flow_data")?,
        agent_component_ids: row.get_opt_json("agent_component_ids")?,
        is_active: row.get_bool("is_active")?,
        is_public: row.get_bool("is_public")?,
        is_agent_skill: row.get_bool("is_agent_skill")?,
        created_at: row.get_timestamp("created_at")?,
        updated_at: row.get_timestamp("updated_at")?,
    })
}

const WORKFLOW_COLUMNS: &str = "id, user_id, name, description, langflow_flow_id, flow_data, \
     agent_component_ids, is_active, is_public, is_agent_skill, \
     created_at, updated_at";

impl Store {
    pub async fn create_workflow(&self, ctx: &RequestContext, new: NewWorkflow) -> Result<Workflow> {
        ctx.guard("create_workflow", async {
            if new.name.trim().is_empty() {
                return Err(StoreError::validation("workflow name is required"));
            }
            let ts = now();
            let row = self
                .pool()
                .fetch_one(
                    &format!(
                        "INSERT INTO workflows (id, user_id, name, description, \
                                 langflow_flow_id, flow_data, agent_component_ids, \
                                 is_active, is_public, is_agent_skill, \
                                 created_at, updated_at) \
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
                        WORKFLOW_COLUMNS
                    ),
                    &[
                        Value::from(new_id()),
                        Value::from(ctx.user_id.as_str()),
                        Value::from(new.name.trim()),
                        Value::from(new.description),
                        Value::from(new.langflow_flow_id),
                        Value::from(new.flow_data.map(sanitize::clean_json)),
                        Value::from(new.agent_component_ids.map(sanitize::clean_json)),
                        Value::from(true),
                        Value::from(false),
                        Value::from(false),
                        Value::from(ts),
                        Value::from(ts),
                    ],
                )
                .await?;
            row_to_workflow(&row)
        })
        .await
    }

    pub async fn get_workflow(&self, ctx: &RequestContext, workflow_id: &str) -> Result<Workflow> {
        ctx.guard("get_workflow", async {
            self.fetch_workflow(ctx, workflow_id).await
        })
        .await
    }

    pub async fn find_workflow_by_langflow_flow_id(
        &self,
        ctx: &RequestContext,
        flow_id: &str,
    ) -> Result<Option<Workflow>> {
        ctx.guard("find_workflow_by_langflow_flow_id", async {
            let row = self
                .pool()
                .fetch_optional(
                    &format!(
                        "SELECT {} FROM workflows \
                         WHERE user_id = ? AND langflow_flow_id = ?",
                        WORKFLOW_COLUMNS
                    ),
                    &[Value::from(ctx.user_id.as_str()), Value::from(flow_id)],
                )
                .await?;
            row.as_ref().map(row_to_workflow).transpose()
        })
        .await
    }

    /// Newest first; optionally only agent skills (or only plain flows).
    pub async fn list_workflows(
        &self,
        ctx: &RequestContext,
        agent_skill: Option<bool>,
        page: Page,
    ) -> Result<Vec<Workflow>> {
        ctx.guard("list_workflows", async {
            let sql = format!(
                "SELECT {} FROM workflows WHERE user_id = ?{} \
                 ORDER BY created_at DESC LIMIT ? OFFSET ?",
                WORKFLOW_COLUMNS,
                if agent_skill.is_some() {
                    " AND is_agent_skill = ?"
                } else {
                    ""
                }
            );
            let mut params = vec![Value::from(ctx.user_id.as_str())];
            if let Some(skill) = agent_skill {
                params.push(Value::from(skill));
            }
            params.push(Value::from(page.limit()));
            params.push(Value::from(page.offset()));

            let rows = self.pool().fetch_all(&sql, &params).await?;
            rows.iter().map(row_to_workflow).collect()
        })
        .await
    }

    pub async fn update_workflow(
        &self,
        ctx: &RequestContext,
        workflow_id: &str,
        update: WorkflowUpdate,
    ) -> Result<Workflow> {
        ctx.guard("update_workflow", async {
            let mut workflow = self.fetch_workflow(ctx, workflow_id).await?;
            if let Some(name) = update.name {
                if name.trim().is_empty() {
                    return Err(StoreError::validation("workflow name is required"));
                }
                workflow.name = name.trim().to_string();
            }
            if let Some(v) = update.description {
                workflow.description = v;
            }
            if let Some(v) = update.langflow_flow_id {
                workflow.langflow_flow_id = v;
            }
            if let Some(v) = update.flow_data {
                workflow.flow_data = v.map(sanitize::clean_json);
            }
            if let Some(v) = update.agent_component_ids {
                workflow.agent_component_ids = v.map(sanitize::clean_json);
            }
            if let Some(v) = update.is_active {
                workflow.is_active = v;
            }
            if let Some(v) = update.is_public {
                workflow.is_public = v;
            }
            if let Some(v) = update.is_agent_skill {
                workflow.is_agent_skill = v;
            }
            workflow.updated_at = now();

            self.pool()
                .execute(
                    "UPDATE workflows SET name = ?, description = ?, langflow_flow_id = ?, \
                             flow_data = ?, agent_component_ids = ?, is_active = ?, \
                             is_public = ?, is_agent_skill = ?, updated_at = ? \
                     WHERE id = ? AND user_id = ?",
                    &[
                        Value::from(workflow.name.as_str()),
                        Value::from(workflow.description.clone()),
                        Value::from(workflow.langflow_flow_id.clone()),
                        Value::from(workflow.flow_data.clone()),
                        Value::from(workflow.agent_component_ids.clone()),
                        Value::from(workflow.is_active),
                        Value::from(workflow.is_public),
                        Value::from(workflow.is_agent_skill),
                        Value::from(workflow.updated_at),
                        Value::from(workflow_id),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            Ok(workflow)
        })
        .await
    }

    /// Delete a workflow and detach any conversations pointing at it.
    pub async fn delete_workflow(&self, ctx: &RequestContext, workflow_id: &str) -> Result<()> {
        ctx.guard("delete_workflow", async {
            self.fetch_workflow(ctx, workflow_id).await?;

            let mut tx = self.pool().begin().await?;
            tx.execute(
                "UPDATE conversations SET workflow_id = NULL \
                 WHERE workflow_id = ? AND user_id = ?",
                &[Value::from(workflow_id), Value::from(ctx.user_id.as_str())],
            )
            .await?;
            tx.execute(
                "DELETE FROM workflows WHERE id = ? AND user_id = ?",
                &[Value::from(workflow_id), Value::from(ctx.user_id.as_str())],
            )
            .await?;
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    pub(crate) async fn fetch_workflow(
        &self,
        ctx: &RequestContext,
        workflow_id: &str,
    ) -> Result<Workflow> {
        let row = self
            .pool()
            .fetch_optional(
                &format!(
                    "SELECT {} FROM workflows WHERE id = ? AND user_id = ?",
                    WORKFLOW_COLUMNS
                ),
                &[Value::from(workflow_id), Value::from(ctx.user_id.as_str())],
            )
            .await?
            .ok_or_else(|| StoreError::not_found("workflow", workflow_id))?;
        row_to_workflow(&row)
    }
}

#[cfg(test)]
mod tests {
    use super::super::conversations::NewConversation;
    use super::super::testutil;
    use super::*;

    async fn make(store: &Store, ctx: &RequestContext, name: &str) -> Workflow {
        store
            .create_workflow(
                ctx,
                NewWorkflow {
                    name: name.into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_lookup_by_flow_id() {
        let (store, ctx) = testutil::store_with_user().await;
        store
            .create_workflow(
                &ctx,
                NewWorkflow {
                    name: "Flow".into(),
                    langflow_flow_id: Some("lf-1".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let found = store
            .find_workflow_by_langflow_flow_id(&ctx, "lf-1")
            .await
            .unwrap();
        assert!(found.is_some());

        let other = testutil::second_user(&store).await;
        assert!(store
            .find_workflow_by_langflow_flow_id(&other, "lf-1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_detaches_conversations() {
        let (store, ctx) = testutil::store_with_user().await;
        let workflow = make(&store, &ctx, "Doomed").await;
        let conversation = store
            .create_conversation(
                &ctx,
                NewConversation {
                    workflow_id: Some(workflow.id.clone()),
                    title: Some("Chat".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        store.delete_workflow(&ctx, &workflow.id).await.unwrap();

        let detached = store
            .get_conversation(&ctx, &conversation.id)
            .await
            .unwrap();
        assert_eq!(detached.workflow_id, None);
    }

    #[tokio::test]
    async fn test_update_toggles_skill_flag() {
        let (store, ctx) = testutil::store_with_user().await;
        let workflow = make(&store, &ctx, "Skill").await;
        let updated = store
            .update_workflow(
                &ctx,
                &workflow.id,
                WorkflowUpdate {
                    is_agent_skill: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.is_agent_skill);
    }

    #[tokio::test]
    async fn test_skill_filter() {
        let (store, ctx) = testutil::store_with_user().await;
        make(&store, &ctx, "Plain").await;
        let skill = make(&store, &ctx, "Skill").await;
        store
            .update_workflow(
                &ctx,
                &skill.id,
                WorkflowUpdate {
                    is_agent_skill: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let skills = store
            .list_workflows(&ctx, Some(true), Page::default())
            .await
            .unwrap();
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].name, "Skill");

        let all = store
            .list_workflows(&ctx, None, Page::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_cross_user_workflow_not_found() {
        let (store, ctx) = testutil::store_with_user().await;
        let other = testutil::second_user(&store).await;
        let workflow = make(&store, &ctx, "Private").await;
        assert!(matches!(
            store.get_workflow(&other, &workflow.id).await.unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }
}
