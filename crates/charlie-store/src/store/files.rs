//! Uploaded file records.
//!
//! Only metadata lives here; the bytes themselves sit in object storage
//! under `storage_path`.

use chrono::{DateTime, Utc};

use super::{new_id, now, Page, RequestContext, Store};
use crate::db::DbRow;
use crate::error::{Result, StoreError};
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct UserFile {
    pub id: String,
    pub user_id: String,
    pub project_id: Option<String>,
    pub filename: String,
    pub original_filename: String,
    pub content_type: Option<String>,
    pub size: i32,
    pub storage_path: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewFile {
    pub project_id: Option<String>,
    pub filename: String,
    pub original_filename: String,
    pub content_type: Option<String>,
    pub size: i32,
    pub storage_path: String,
    pub description: Option<String>,
}

fn row_to_file(row: &DbRow) -> Result<UserFile> {
    Ok(UserFile {
        id: row.get_text("id")?,
        user_id: row.get_text("user_id")?,
        project_id: row.get_opt_text("project_id")?,
        filename: row.get_text("filename")?,
        original_filename: row.get_text("original_filename")?,
        content_type: row.get_opt_text("content_type")?,
        size: row.get_i32("size")?,
        storage_path: row.get_text("storage_path")?,
        description: row.get_opt_text("description")?,
        created_at: row.get_timestamp("created_at")?,
        updated_at: row.get_timestamp("updated_at")?,
    })
}

const FILE_COLUMNS: &str = "id, user_id, project_id, filename, original_filename, content_type, \
     size, storage_path, description, created_at, updated_at";

impl Store {
    pub async fn record_file(&self, ctx: &RequestContext, new: NewFile) -> Result<UserFile> {
        ctx.guard("record_file", async {
            if new.filename.is_empty() || new.storage_path.is_empty() {
                return Err(StoreError::validation(
                    "filename and storage_path are required",
                ));
            }
            if new.size < 0 {
                return Err(StoreError::validation("file size cannot be negative"));
            }
            if let Some(project_id) = &new.project_id {
                self.get_project_unguarded(ctx, project_id).await?;
            }

            let ts = now();
            let row = self
                .pool()
                .fetch_one(
                    &format!(
                        "INSERT INTO user_files (id, user_id, project_id, filename, \
                                 original_filename, content_type, size, storage_path, \
                                 description, created_at, updated_at) \
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
                        FILE_COLUMNS
                    ),
                    &[
                        Value::from(new_id()),
                        Value::from(ctx.user_id.as_str()),
                        Value::from(new.project_id),
                        Value::from(new.filename.as_str()),
                        Value::from(new.original_filename.as_str()),
                        Value::from(new.content_type),
                        Value::from(new.size),
                        Value::from(new.storage_path.as_str()),
                        Value::from(new.description),
                        Value::from(ts),
                        Value::from(ts),
                    ],
                )
                .await?;
            row_to_file(&row)
        })
        .await
    }

    pub async fn get_file(&self, ctx: &RequestContext, file_id: &str) -> Result<UserFile> {
        ctx.guard("get_file", async {
            let row = self
                .pool()
                .fetch_optional(
                    &format!(
                        "SELECT {} FROM user_files WHERE id = ? AND user_id = ?",
                        FILE_COLUMNS
                    ),
                    &[Value::from(file_id), Value::from(ctx.user_id.as_str())],
                )
                .await?
                .ok_or_else(|| StoreError::not_found("file", file_id))?;
            row_to_file(&row)
        })
        .await
    }

    /// Newest first; optionally narrowed to one project.
    pub async fn list_files(
        &self,
        ctx: &RequestContext,
        project_id: Option<&str>,
        page: Page,
    ) -> Result<Vec<UserFile>> {
        ctx.guard("list_files", async {
            let sql = format!(
                "SELECT {} FROM user_files WHERE user_id = ?{} \
                 ORDER BY created_at DESC LIMIT ? OFFSET ?",
                FILE_COLUMNS,
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
            rows.iter().map(row_to_file).collect()
        })
        .await
    }

    pub async fn update_file_description(
        &self,
        ctx: &RequestContext,
        file_id: &str,
        description: Option<&str>,
    ) -> Result<()> {
        ctx.guard("update_file_description", async {
            let affected = self
                .pool()
                .execute(
                    "UPDATE user_files SET description = ?, updated_at = ? \
                     WHERE id = ? AND user_id = ?",
                    &[
                        Value::from(description),
                        Value::from(now()),
                        Value::from(file_id),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            if affected == 0 {
                return Err(StoreError::not_found("file", file_id));
            }
            Ok(())
        })
        .await
    }

    pub async fn delete_file(&self, ctx: &RequestContext, file_id: &str) -> Result<()> {
        ctx.guard("delete_file", async {
            let affected = self
                .pool()
                .execute(
                    "DELETE FROM user_files WHERE id = ? AND user_id = ?",
                    &[Value::from(file_id), Value::from(ctx.user_id.as_str())],
                )
                .await?;
            if affected == 0 {
                return Err(StoreError::not_found("file", file_id));
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil;
    use super::*;

    fn sample(name: &str) -> NewFile {
        NewFile {
            filename: format!("{}-stored.pdf", name),
            original_filename: format!("{}.pdf", name),
            content_type: Some("application/pdf".into()),
            size: 1024,
            storage_path: format!("/blobs/{}", name),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_record_and_list() {
        let (store, ctx) = testutil::store_with_user().await;
        store.record_file(&ctx, sample("a")).await.unwrap();
        store.record_file(&ctx, sample("b")).await.unwrap();

        let files = store.list_files(&ctx, None, Page::default()).await.unwrap();
        assert_eq!(files.len(), 2);
    }

    #[tokio::test]
    async fn test_negative_size_rejected() {
        let (store, ctx) = testutil::store_with_user().await;
        let mut file = sample("bad");
        file.size = -1;
        assert!(matches!(
            store.record_file(&ctx, file).await.unwrap_err(),
            StoreError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_cross_user_file_hidden() {
        let (store, ctx) = testutil::store_with_user().await;
        let other = testutil::second_user(&store).await;
        let file = store.record_file(&ctx, sample("private")).await.unwrap();
        assert!(matches!(
            store.get_file(&other, &file.id).await.unwrap_err(),
            StoreError::NotFound { .. }
        ));
        assert!(matches!(
            store.delete_file(&other, &file.id).await.unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }
}
