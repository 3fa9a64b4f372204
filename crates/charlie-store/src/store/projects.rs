//! Project folders.
//!
//! Every user gets a default project on first touch; it cannot be deleted.
//! Children reference projects with ON DELETE SET NULL, so deleting a
//! project orphans its contents back to "no project" rather than dropping
//! them.

use chrono::{DateTime, Utc};

use super::{new_id, now, Page, RequestContext, Store};
use crate::db::DbRow;
use crate::error::{Result, StoreError};
use crate::value::Value;

pub const DEFAULT_PROJECT_NAME: &str = "Default Project";

#[derive(Debug, Clone)]
pub struct Project {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub icon: String,
    pub color: String,
    pub is_default: bool,
    pub is_archived: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
}

/// Partial update; None leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub sort_order: Option<i32>,
}

fn row_to_project(row: &DbRow) -> Result<Project> {
    Ok(Project {
        id: row.get_text("id")?,
        user_id: row.get_text("user_id")?,
        name: row.get_text("name")?,
        description: row.get_opt_text("description")?,
        icon: row.get_text("icon")?,
        color: row.get_text("color")?,
        is_default: row.get_bool("is_default")?,
        is_archived: row.get_bool("is_archived")?,
        sort_order: row.get_i32("sort_order")?,
        created_at: row.get_timestamp("created_at")?,
        updated_at: row.get_timestamp("updated_at")?,
    })
}

const PROJECT_COLUMNS: &str = "id, user_id, name, description, icon, color, is_default, \
     is_archived, sort_order, created_at, updated_at";

impl Store {
    /// The user's default project, created on first call.
    pub async fn ensure_default_project(&self, ctx: &RequestContext) -> Result<Project> {
        ctx.guard("ensure_default_project", async {
            if let Some(row) = self
                .pool()
                .fetch_optional(
                    &format!(
                        "SELECT {} FROM projects WHERE user_id = ? AND is_default = ?",
                        PROJECT_COLUMNS
                    ),
                    &[Value::from(ctx.user_id.as_str()), Value::from(true)],
                )
                .await?
            {
                return row_to_project(&row);
            }

            let ts = now();
            let row = self
                .pool()
                .fetch_one(
                    &format!(
                        "INSERT INTO projects (id, user_id, name, icon, color, is_default, \
                                               is_archived, sort_order, created_at, updated_at) \
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
                        PROJECT_COLUMNS
                    ),
                    &[
                        Value::from(new_id()),
                        Value::from(ctx.user_id.as_str()),
                        Value::from(DEFAULT_PROJECT_NAME),
                        Value::from("folder"),
                        Value::from("#f97316"),
                        Value::from(true),
                        Value::from(false),
                        Value::from(0i32),
                        Value::from(ts),
                        Value::from(ts),
                    ],
                )
                .await?;
            row_to_project(&row)
        })
        .await
    }

    pub async fn create_project(&self, ctx: &RequestContext, new: NewProject) -> Result<Project> {
        ctx.guard("create_project", async {
            if new.name.trim().is_empty() {
                return Err(StoreError::validation("project name is required"));
            }

            // new projects sort after everything the user already has
            let next_sort = self
                .pool()
                .fetch_one(
                    "SELECT COALESCE(MAX(sort_order), 0) + 1 AS next_sort \
                     FROM projects WHERE user_id = ?",
                    &[Value::from(ctx.user_id.as_str())],
                )
                .await?
                .get_i32("next_sort")?;

            let ts = now();
            let row = self
                .pool()
                .fetch_one(
                    &format!(
                        "INSERT INTO projects (id, user_id, name, description, icon, color, \
                                               is_default, is_archived, sort_order, \
                                               created_at, updated_at) \
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
                        PROJECT_COLUMNS
                    ),
                    &[
                        Value::from(new_id()),
                        Value::from(ctx.user_id.as_str()),
                        Value::from(new.name.trim()),
                        Value::from(new.description),
                        Value::from(new.icon.as_deref().unwrap_or("folder")),
                        Value::from(new.color.as_deref().unwrap_or("#f97316")),
                        Value::from(false),
                        Value::from(false),
                        Value::from(next_sort),
                        Value::from(ts),
                        Value::from(ts),
                    ],
                )
                .await?;
            row_to_project(&row)
        })
        .await
    }

    pub async fn get_project(&self, ctx: &RequestContext, project_id: &str) -> Result<Project> {
        ctx.guard("get_project", async {
            let row = self
                .pool()
                .fetch_optional(
                    &format!(
                        "SELECT {} FROM projects WHERE id = ? AND user_id = ?",
                        PROJECT_COLUMNS
                    ),
                    &[Value::from(project_id), Value::from(ctx.user_id.as_str())],
                )
                .await?
                .ok_or_else(|| StoreError::not_found("project", project_id))?;
            row_to_project(&row)
        })
        .await
    }

    pub async fn list_projects(
        &self,
        ctx: &RequestContext,
        include_archived: bool,
        page: Page,
    ) -> Result<Vec<Project>> {
        ctx.guard("list_projects", async {
            let sql = format!(
                "SELECT {} FROM projects WHERE user_id = ?{} \
                 ORDER BY sort_order, created_at LIMIT ? OFFSET ?",
                PROJECT_COLUMNS,
                if include_archived {
                    ""
                } else {
                    " AND is_archived = ?"
                }
            );
            let mut params = vec![Value::from(ctx.user_id.as_str())];
            if !include_archived {
                params.push(Value::from(false));
            }
            params.push(Value::from(page.limit()));
            params.push(Value::from(page.offset()));

            let rows = self.pool().fetch_all(&sql, &params).await?;
            rows.iter().map(row_to_project).collect()
        })
        .await
    }

    pub async fn update_project(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        update: ProjectUpdate,
    ) -> Result<Project> {
        ctx.guard("update_project", async {
            let mut project = self.get_project_unguarded(ctx, project_id).await?;
            if let Some(name) = update.name {
                if name.trim().is_empty() {
                    return Err(StoreError::validation("project name is required"));
                }
                project.name = name.trim().to_string();
            }
            if let Some(description) = update.description {
                project.description = description;
            }
            if let Some(icon) = update.icon {
                project.icon = icon;
            }
            if let Some(color) = update.color {
                project.color = color;
            }
            if let Some(sort_order) = update.sort_order {
                project.sort_order = sort_order;
            }
            project.updated_at = now();

            self.pool()
                .execute(
                    "UPDATE projects SET name = ?, description = ?, icon = ?, color = ?, \
                             sort_order = ?, updated_at = ? \
                     WHERE id = ? AND user_id = ?",
                    &[
                        Value::from(project.name.as_str()),
                        Value::from(project.description.clone()),
                        Value::from(project.icon.as_str()),
                        Value::from(project.color.as_str()),
                        Value::from(project.sort_order),
                        Value::from(project.updated_at),
                        Value::from(project_id),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            Ok(project)
        })
        .await
    }

    pub async fn set_project_archived(
        &self,
        ctx: &RequestContext,
        project_id: &str,
        archived: bool,
    ) -> Result<()> {
        ctx.guard("set_project_archived", async {
            let project = self.get_project_unguarded(ctx, project_id).await?;
            if project.is_default && archived {
                return Err(StoreError::validation(
                    "the default project cannot be archived",
                ));
            }
            self.pool()
                .execute(
                    "UPDATE projects SET is_archived = ?, updated_at = ? \
                     WHERE id = ? AND user_id = ?",
                    &[
                        Value::from(archived),
                        Value::from(now()),
                        Value::from(project_id),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            Ok(())
        })
        .await
    }

    /// Delete a project. Its agent components are deleted with it; files
    /// and MCP servers fall back to "no project" via SET NULL.
    pub async fn delete_project(&self, ctx: &RequestContext, project_id: &str) -> Result<()> {
        ctx.guard("delete_project", async {
            let project = self.get_project_unguarded(ctx, project_id).await?;
            if project.is_default {
                return Err(StoreError::validation(
                    "the default project cannot be deleted",
                ));
            }
            self.pool()
                .execute(
                    "DELETE FROM projects WHERE id = ? AND user_id = ?",
                    &[Value::from(project_id), Value::from(ctx.user_id.as_str())],
                )
                .await?;
            Ok(())
        })
        .await
    }

    /// Ownership check shared by sibling modules that take a project id.
    pub(crate) async fn get_project_unguarded(
        &self,
        ctx: &RequestContext,
        project_id: &str,
    ) -> Result<Project> {
        let row = self
            .pool()
            .fetch_optional(
                &format!(
                    "SELECT {} FROM projects WHERE id = ? AND user_id = ?",
                    PROJECT_COLUMNS
                ),
                &[Value::from(project_id), Value::from(ctx.user_id.as_str())],
            )
            .await?
            .ok_or_else(|| StoreError::not_found("project", project_id))?;
        row_to_project(&row)
    }
}
