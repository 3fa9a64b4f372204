//! Knowledge sources and their ingestion lifecycle.
//!
//! A source moves pending -> processing -> ready | failed; a failed source
//! may re-enter processing for a retry. Any other transition is rejected.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use super::{new_id, now, Page, RequestContext, Store};
use crate::db::DbRow;
use crate::error::{Result, StoreError};
use crate::sanitize;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Pending => "pending",
            SourceStatus::Processing => "processing",
            SourceStatus::Ready => "ready",
            SourceStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(SourceStatus::Pending),
            "processing" => Ok(SourceStatus::Processing),
            "ready" => Ok(SourceStatus::Ready),
            "failed" => Ok(SourceStatus::Failed),
            other => Err(StoreError::validation(format!(
                "unknown knowledge source status: {}",
                other
            ))),
        }
    }

    fn can_become(&self, next: SourceStatus) -> bool {
        matches!(
            (self, next),
            (SourceStatus::Pending, SourceStatus::Processing)
                | (SourceStatus::Processing, SourceStatus::Ready)
                | (SourceStatus::Processing, SourceStatus::Failed)
                | (SourceStatus::Failed, SourceStatus::Processing)
        )
    }
}

#[derive(Debug, Clone)]
pub struct KnowledgeSource {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub source_type: String,
    pub file_path: Option<String>,
    pub original_filename: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<i32>,
    pub url: Option<String>,
    pub status: SourceStatus,
    pub error_message: Option<String>,
    pub collection_id: Option<String>,
    pub chunk_count: i32,
    pub content_preview: Option<String>,
    pub metadata_json: Option<JsonValue>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewKnowledgeSource {
    pub name: String,
    pub source_type: String,
    pub file_path: Option<String>,
    pub original_filename: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<i32>,
    pub url: Option<String>,
    pub metadata_json: Option<JsonValue>,
}

fn row_to_source(row: &DbRow) -> Result<KnowledgeSource> {
    Ok(KnowledgeSource {
        id: row.get_text("id")?,
        user_id: row.get_text("user_id")?,
        name: row.get_text("name")?,
        source_type: row.get_text("source_type")?,
        file_path: row.get_opt_text("file_path")?,
        original_filename: row.get_opt_text("original_filename")?,
        mime_type: row.get_opt_text("mime_type")?,
        file_size: row.get_opt_i32("file_size")?,
        url: row.get_opt_text("url")?,
        status: SourceStatus::parse(&row.get_text("status")?)?,
        error_message: row.get_opt_text("error_message")?,
        collection_id: row.get_opt_text("collection_id")?,
        chunk_count: row.get_i32("chunk_count")?,
        content_preview: row.get_opt_text("content_preview")?,
        metadata_json: row.get_opt_json("metadata_json")?,
        is_active: row.get_bool("is_active")?,
        created_at: row.get_timestamp("created_at")?,
        updated_at: row.get_timestamp("updated_at")?,
    })
}

fn check_transition(source: &KnowledgeSource, next: SourceStatus) -> Result<()> {
    if !source.status.can_become(next) {
        return Err(StoreError::validation(format!(
            "knowledge source {} cannot move from {} to {}",
            source.id,
            source.status.as_str(),
            next.as_str()
        )));
    }
    Ok(())
}

const SOURCE_COLUMNS: &str = "id, user_id, name, source_type, file_path, original_filename, \
     mime_type, file_size, url, status, error_message, collection_id, \
     chunk_count, content_preview, metadata_json, is_active, \
     created_at, updated_at";

impl Store {
    pub async fn create_knowledge_source(
        &self,
        ctx: &RequestContext,
        new: NewKnowledgeSource,
    ) -> Result<KnowledgeSource> {
        ctx.guard("create_knowledge_source", async {
            if new.name.trim().is_empty() || new.source_type.is_empty() {
                return Err(StoreError::validation("name and source_type are required"));
            }
            let ts = now();
            let row = self
                .pool()
                .fetch_one(
                    &format!(
                        "INSERT INTO knowledge_sources (id, user_id, name, source_type, \
                                 file_path, original_filename, mime_type, file_size, url, \
                                 status, chunk_count, metadata_json, is_active, \
                                 created_at, updated_at) \
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                         RETURNING {}",
                        SOURCE_COLUMNS
                    ),
                    &[
                        Value::from(new_id()),
                        Value::from(ctx.user_id.as_str()),
                        Value::from(new.name.trim()),
                        Value::from(new.source_type.as_str()),
                        Value::from(new.file_path),
                        Value::from(new.original_filename),
                        Value::from(new.mime_type),
                        Value::from(new.file_size),
                        Value::from(new.url),
                        Value::from(SourceStatus::Pending.as_str()),
                        Value::from(0i32),
                        Value::from(new.metadata_json.map(sanitize::clean_json)),
                        Value::from(true),
                        Value::from(ts),
                        Value::from(ts),
                    ],
                )
                .await?;
            row_to_source(&row)
        })
        .await
    }

    pub async fn get_knowledge_source(
        &self,
        ctx: &RequestContext,
        source_id: &str,
    ) -> Result<KnowledgeSource> {
        ctx.guard("get_knowledge_source", async {
            self.fetch_source(ctx, source_id).await
        })
        .await
    }

    /// Newest first.
    pub async fn list_knowledge_sources(
        &self,
        ctx: &RequestContext,
        page: Page,
    ) -> Result<Vec<KnowledgeSource>> {
        ctx.guard("list_knowledge_sources", async {
            let rows = self
                .pool()
                .fetch_all(
                    &format!(
                        "SELECT {} FROM knowledge_sources WHERE user_id = ? \
                         ORDER BY created_at DESC LIMIT ? OFFSET ?",
                        SOURCE_COLUMNS
                    ),
                    &[
                        Value::from(ctx.user_id.as_str()),
                        Value::from(page.limit()),
                        Value::from(page.offset()),
                    ],
                )
                .await?;
            rows.iter().map(row_to_source).collect()
        })
        .await
    }

    /// Claim a source for ingestion.
    pub async fn mark_source_processing(
        &self,
        ctx: &RequestContext,
        source_id: &str,
    ) -> Result<KnowledgeSource> {
        ctx.guard("mark_source_processing", async {
            let source = self.fetch_source(ctx, source_id).await?;
            check_transition(&source, SourceStatus::Processing)?;
            self.pool()
                .execute(
                    "UPDATE knowledge_sources SET status = ?, error_message = ?, \
                             updated_at = ? \
                     WHERE id = ? AND user_id = ?",
                    &[
                        Value::from(SourceStatus::Processing.as_str()),
                        Value::null_text(),
                        Value::from(now()),
                        Value::from(source_id),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            self.fetch_source(ctx, source_id).await
        })
        .await
    }

    /// Ingestion finished; record where the chunks went.
    pub async fn mark_source_ready(
        &self,
        ctx: &RequestContext,
        source_id: &str,
        collection_id: &str,
        chunk_count: i32,
        content_preview: Option<&str>,
    ) -> Result<KnowledgeSource> {
        ctx.guard("mark_source_ready", async {
            let source = self.fetch_source(ctx, source_id).await?;
            check_transition(&source, SourceStatus::Ready)?;
            if chunk_count < 0 {
                return Err(StoreError::validation("chunk_count cannot be negative"));
            }
            self.pool()
                .execute(
                    "UPDATE knowledge_sources SET status = ?, collection_id = ?, \
                             chunk_count = ?, content_preview = ?, error_message = ?, \
                             updated_at = ? \
                     WHERE id = ? AND user_id = ?",
                    &[
                        Value::from(SourceStatus::Ready.as_str()),
                        Value::from(collection_id),
                        Value::from(chunk_count),
                        Value::from(content_preview),
                        Value::null_text(),
                        Value::from(now()),
                        Value::from(source_id),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            self.fetch_source(ctx, source_id).await
        })
        .await
    }

    /// Ingestion failed; the reason is mandatory.
    pub async fn mark_source_failed(
        &self,
        ctx: &RequestContext,
        source_id: &str,
        error_message: &str,
    ) -> Result<KnowledgeSource> {
        ctx.guard("mark_source_failed", async {
            if error_message.trim().is_empty() {
                return Err(StoreError::validation(
                    "a failed source requires an error message",
                ));
            }
            let source = self.fetch_source(ctx, source_id).await?;
            check_transition(&source, SourceStatus::Failed)?;
            self.pool()
                .execute(
                    "UPDATE knowledge_sources SET status = ?, error_message = ?, \
                             updated_at = ? \
                     WHERE id = ? AND user_id = ?",
                    &[
                        Value::from(SourceStatus::Failed.as_str()),
                        Value::from(error_message),
                        Value::from(now()),
                        Value::from(source_id),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            self.fetch_source(ctx, source_id).await
        })
        .await
    }

    pub async fn delete_knowledge_source(
        &self,
        ctx: &RequestContext,
        source_id: &str,
    ) -> Result<()> {
        ctx.guard("delete_knowledge_source", async {
            let affected = self
                .pool()
                .execute(
                    "DELETE FROM knowledge_sources WHERE id = ? AND user_id = ?",
                    &[Value::from(source_id), Value::from(ctx.user_id.as_str())],
                )
                .await?;
            if affected == 0 {
                return Err(StoreError::not_found("knowledge source", source_id));
            }
            Ok(())
        })
        .await
    }

    async fn fetch_source(
        &self,
        ctx: &RequestContext,
        source_id: &str,
    ) -> Result<KnowledgeSource> {
        let row = self
            .pool()
            .fetch_optional(
                &format!(
                    "SELECT {} FROM knowledge_sources WHERE id = ? AND user_id = ?",
                    SOURCE_COLUMNS
                ),
                &[Value::from(source_id), Value::from(ctx.user_id.as_str())],
            )
            .await?
            .ok_or_else(|| StoreError::not_found("knowledge source", source_id))?;
        row_to_source(&row)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil;
    use super::*;

    async fn make(store: &Store, ctx: &RequestContext) -> KnowledgeSource {
        store
            .create_knowledge_source(
                ctx,
                NewKnowledgeSource {
                    name: "Handbook".into(),
                    source_type: "file".into(),
                    original_filename: Some("handbook.pdf".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_happy_path_lifecycle() {
        let (store, ctx) = testutil::store_with_user().await;
        let source = make(&store, &ctx).await;
        assert_eq!(source.status, SourceStatus::Pending);

        let processing = store.mark_source_processing(&ctx, &source.id).await.unwrap();
        assert_eq!(processing.status, SourceStatus::Processing);

        let ready = store
            .mark_source_ready(&ctx, &source.id, "col-1", 42, Some("preview"))
            .await
            .unwrap();
        assert_eq!(ready.status, SourceStatus::Ready);
        assert_eq!(ready.chunk_count, 42);
        assert_eq!(ready.collection_id.as_deref(), Some("col-1"));
    }

    #[tokio::test]
    async fn test_failure_requires_message_and_allows_retry() {
        let (store, ctx) = testutil::store_with_user().await;
        let source = make(&store, &ctx).await;
        store.mark_source_processing(&ctx, &source.id).await.unwrap();

        assert!(store
            .mark_source_failed(&ctx, &source.id, "  ")
            .await
            .is_err());

        let failed = store
            .mark_source_failed(&ctx, &source.id, "parser crashed")
            .await
            .unwrap();
        assert_eq!(failed.status, SourceStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("parser crashed"));

        // retry clears the error
        let retried = store.mark_source_processing(&ctx, &source.id).await.unwrap();
        assert_eq!(retried.status, SourceStatus::Processing);
        assert_eq!(retried.error_message, None);
    }

    #[tokio::test]
    async fn test_illegal_transitions_rejected() {
        let (store, ctx) = testutil::store_with_user().await;
        let source = make(&store, &ctx).await;

        // pending cannot jump straight to ready or failed
        assert!(store
            .mark_source_ready(&ctx, &source.id, "col", 1, None)
            .await
            .is_err());
        assert!(store
            .mark_source_failed(&ctx, &source.id, "boom")
            .await
            .is_err());

        // ready is terminal
        store.mark_source_processing(&ctx, &source.id).await.unwrap();
        store
            .mark_source_ready(&ctx, &source.id, "col", 1, None)
            .await
            .unwrap();
        assert!(store.mark_source_processing(&ctx, &source.id).await.is_err());
    }

    #[tokio::test]
    async fn test_cross_user_source_hidden() {
        let (store, ctx) = testutil::store_with_user().await;
        let other = testutil::second_user(&store).await;
        let source = make(&store, &ctx).await;
        assert!(matches!(
            store
                .get_knowledge_source(&other, &source.id)
                .await
                .unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }
}
