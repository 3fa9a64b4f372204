//! Conversations and their message transcripts.
//!
//! Messages are append-only except for two narrow edits: content editing,
//! which preserves the first original, and thumbs feedback. Both go through
//! the owning conversation so ownership is checked once.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use super::{new_id, now, Page, RequestContext, Store};
use crate::db::DbRow;
use crate::error::{Result, StoreError};
use crate::sanitize;
use crate::value::Value;

pub const ROLES: &[&str] = &["user", "assistant", "system"];
pub const FEEDBACK_VALUES: &[&str] = &["positive", "negative"];

#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub workflow_id: Option<String>,
    pub langflow_session_id: Option<String>,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewConversation {
    pub workflow_id: Option<String>,
    pub langflow_session_id: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub message_metadata: Option<JsonValue>,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub original_content: Option<String>,
    pub feedback: Option<String>,
    pub feedback_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

fn row_to_conversation(row: &DbRow) -> Result<Conversation> {
    Ok(Conversation {
        id: row.get_text("id")?,
        user_id: row.get_text("user_id")?,
        workflow_id: row.get_opt_text("workflow_id")?,
        langflow_session_id: row.get_opt_text("langflow_session_id")?,
        title: row.get_opt_text("title")?,
        created_at: row.get_timestamp("created_at")?,
        updated_at: row.get_timestamp("updated_at")?,
    })
}

fn row_to_message(row: &DbRow) -> Result<Message> {
    Ok(Message {
        id: row.get_text("id")?,
        conversation_id: row.get_text("conversation_id")?,
        role: row.get_text("role")?,
        content: row.get_text("content")?,
        message_metadata: row.get_opt_json("message_metadata")?,
        is_edited: row.get_bool("is_edited")?,
        edited_at: row.get_opt_timestamp("edited_at")?,
        original_content: row.get_opt_text("original_content")?,
        feedback: row.get_opt_text("feedback")?,
        feedback_at: row.get_opt_timestamp("feedback_at")?,
        created_at: row.get_timestamp("created_at")?,
    })
}

const CONVERSATION_COLUMNS: &str =
    "id, user_id, workflow_id, langflow_session_id, title, created_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, message_metadata, is_edited, \
     edited_at, original_content, feedback, feedback_at, created_at";

impl Store {
    pub async fn create_conversation(
        &self,
        ctx: &RequestContext,
        new: NewConversation,
    ) -> Result<Conversation> {
        ctx.guard("create_conversation", async {
            if let Some(workflow_id) = &new.workflow_id {
                self.fetch_workflow(ctx, workflow_id).await?;
            }
            let ts = now();
            let row = self
                .pool()
                .fetch_one(
                    &format!(
                        "INSERT INTO conversations (id, user_id, workflow_id, \
                                 langflow_session_id, title, created_at, updated_at) \
                         VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING {}",
                        CONVERSATION_COLUMNS
                    ),
                    &[
                        Value::from(new_id()),
                        Value::from(ctx.user_id.as_str()),
                        Value::from(new.workflow_id),
                        Value::from(new.langflow_session_id),
                        Value::from(new.title),
                        Value::from(ts),
                        Value::from(ts),
                    ],
                )
                .await?;
            row_to_conversation(&row)
        })
        .await
    }

    pub async fn get_conversation(
        &self,
        ctx: &RequestContext,
        conversation_id: &str,
    ) -> Result<Conversation> {
        ctx.guard("get_conversation", async {
            self.fetch_conversation(ctx, conversation_id).await
        })
        .await
    }

    /// Most recently created first.
    pub async fn list_conversations(
        &self,
        ctx: &RequestContext,
        page: Page,
    ) -> Result<Vec<Conversation>> {
        ctx.guard("list_conversations", async {
            let rows = self
                .pool()
                .fetch_all(
                    &format!(
                        "SELECT {} FROM conversations WHERE user_id = ? \
                         ORDER BY created_at DESC LIMIT ? OFFSET ?",
                        CONVERSATION_COLUMNS
                    ),
                    &[
                        Value::from(ctx.user_id.as_str()),
                        Value::from(page.limit()),
                        Value::from(page.offset()),
                    ],
                )
                .await?;
            rows.iter().map(row_to_conversation).collect()
        })
        .await
    }

    pub async fn rename_conversation(
        &self,
        ctx: &RequestContext,
        conversation_id: &str,
        title: &str,
    ) -> Result<()> {
        ctx.guard("rename_conversation", async {
            let affected = self
                .pool()
                .execute(
                    "UPDATE conversations SET title = ?, updated_at = ? \
                     WHERE id = ? AND user_id = ?",
                    &[
                        Value::from(title),
                        Value::from(now()),
                        Value::from(conversation_id),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            if affected == 0 {
                return Err(StoreError::not_found("conversation", conversation_id));
            }
            Ok(())
        })
        .await
    }

    /// Delete a conversation; its messages cascade.
    pub async fn delete_conversation(
        &self,
        ctx: &RequestContext,
        conversation_id: &str,
    ) -> Result<()> {
        ctx.guard("delete_conversation", async {
            let affected = self
                .pool()
                .execute(
                    "DELETE FROM conversations WHERE id = ? AND user_id = ?",
                    &[
                        Value::from(conversation_id),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            if affected == 0 {
                return Err(StoreError::not_found("conversation", conversation_id));
            }
            Ok(())
        })
        .await
    }

    pub async fn append_message(
        &self,
        ctx: &RequestContext,
        conversation_id: &str,
        role: &str,
        content: &str,
        metadata: Option<JsonValue>,
    ) -> Result<Message> {
        ctx.guard("append_message", async {
            if !ROLES.contains(&role) {
                return Err(StoreError::validation(format!(
                    "invalid message role: {}",
                    role
                )));
            }
            self.fetch_conversation(ctx, conversation_id).await?;

            let ts = now();
            let mut tx = self.pool().begin().await?;
            let row = tx
                .fetch_optional(
                    &format!(
                        "INSERT INTO messages (id, conversation_id, role, content, \
                                 message_metadata, is_edited, created_at) \
                         VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING {}",
                        MESSAGE_COLUMNS
                    ),
                    &[
                        Value::from(new_id()),
                        Value::from(conversation_id),
                        Value::from(role),
                        Value::from(content),
                        Value::from(metadata.map(sanitize::clean_json)),
                        Value::from(false),
                        Value::from(ts),
                    ],
                )
                .await?
                .ok_or_else(|| StoreError::internal(sqlx::Error::RowNotFound))?;
            tx.execute(
                "UPDATE conversations SET updated_at = ? WHERE id = ?",
                &[Value::from(ts), Value::from(conversation_id)],
            )
            .await?;
            tx.commit().await?;
            row_to_message(&row)
        })
        .await
    }

    /// Transcript in chronological order.
    pub async fn list_messages(
        &self,
        ctx: &RequestContext,
        conversation_id: &str,
        page: Page,
    ) -> Result<Vec<Message>> {
        ctx.guard("list_messages", async {
            self.fetch_conversation(ctx, conversation_id).await?;
            let rows = self
                .pool()
                .fetch_all(
                    &format!(
                        "SELECT {} FROM messages WHERE conversation_id = ? \
                         ORDER BY created_at, id LIMIT ? OFFSET ?",
                        MESSAGE_COLUMNS
                    ),
                    &[
                        Value::from(conversation_id),
                        Value::from(page.limit()),
                        Value::from(page.offset()),
                    ],
                )
                .await?;
            rows.iter().map(row_to_message).collect()
        })
        .await
    }

    /// Replace message content. The pre-edit original is kept from the
    /// first edit only; later edits overwrite content but not the original.
    pub async fn edit_message(
        &self,
        ctx: &RequestContext,
        conversation_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<Message> {
        ctx.guard("edit_message", async {
            self.fetch_conversation(ctx, conversation_id).await?;
            let message = self.fetch_message(conversation_id, message_id).await?;

            let original = message
                .original_content
                .unwrap_or_else(|| message.content.clone());
            self.pool()
                .execute(
                    "UPDATE messages SET content = ?, original_content = ?, \
                             is_edited = ?, edited_at = ? \
                     WHERE id = ? AND conversation_id = ?",
                    &[
                        Value::from(content),
                        Value::from(original.as_str()),
                        Value::from(true),
                        Value::from(now()),
                        Value::from(message_id),
                        Value::from(conversation_id),
                    ],
                )
                .await?;
            self.fetch_message(conversation_id, message_id).await
        })
        .await
    }

    /// Set or clear thumbs feedback on a message. `None` clears both the
    /// value and its timestamp.
    pub async fn record_message_feedback(
        &self,
        ctx: &RequestContext,
        conversation_id: &str,
        message_id: &str,
        feedback: Option<&str>,
    ) -> Result<Message> {
        ctx.guard("record_message_feedback", async {
            if let Some(value) = feedback {
                if !FEEDBACK_VALUES.contains(&value) {
                    return Err(StoreError::validation(format!(
                        "invalid feedback value: {}",
                        value
                    )));
                }
            }
            self.fetch_conversation(ctx, conversation_id).await?;
            let feedback_at = feedback.map(|_| now());
            let affected = self
                .pool()
                .execute(
                    "UPDATE messages SET feedback = ?, feedback_at = ? \
                     WHERE id = ? AND conversation_id = ?",
                    &[
                        Value::from(feedback),
                        Value::from(feedback_at),
                        Value::from(message_id),
                        Value::from(conversation_id),
                    ],
                )
                .await?;
            if affected == 0 {
                return Err(StoreError::not_found("message", message_id));
            }
            self.fetch_message(conversation_id, message_id).await
        })
        .await
    }

    async fn fetch_conversation(
        &self,
        ctx: &RequestContext,
        conversation_id: &str,
    ) -> Result<Conversation> {
        let row = self
            .pool()
            .fetch_optional(
                &format!(
                    "SELECT {} FROM conversations WHERE id = ? AND user_id = ?",
                    CONVERSATION_COLUMNS
                ),
                &[
                    Value::from(conversation_id),
                    Value::from(ctx.user_id.as_str()),
                ],
            )
            .await?
            .ok_or_else(|| StoreError::not_found("conversation", conversation_id))?;
        row_to_conversation(&row)
    }

    async fn fetch_message(&self, conversation_id: &str, message_id: &str) -> Result<Message> {
        let row = self
            .pool()
            .fetch_optional(
                &format!(
                    "SELECT {} FROM messages WHERE id = ? AND conversation_id = ?",
                    MESSAGE_COLUMNS
                ),
                &[Value::from(message_id), Value::from(conversation_id)],
            )
            .await?
            .ok_or_else(|| StoreError::not_found("message", message_id))?;
        row_to_message(&row)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil;
    use super::*;

    async fn conversation(store: &Store, ctx: &RequestContext) -> Conversation {
        store
            .create_conversation(ctx, NewConversation::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_append_and_list_in_order() {
        let (store, ctx) = testutil::store_with_user().await;
        let convo = conversation(&store, &ctx).await;
        store
            .append_message(&ctx, &convo.id, "user", "hi", None)
            .await
            .unwrap();
        store
            .append_message(&ctx, &convo.id, "assistant", "hello", None)
            .await
            .unwrap();

        let messages = store
            .list_messages(&ctx, &convo.id, Page::default())
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "assistant");
    }

    #[tokio::test]
    async fn test_invalid_role_rejected() {
        let (store, ctx) = testutil::store_with_user().await;
        let convo = conversation(&store, &ctx).await;
        let err = store
            .append_message(&ctx, &convo.id, "narrator", "hi", None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_edit_preserves_first_original() {
        let (store, ctx) = testutil::store_with_user().await;
        let convo = conversation(&store, &ctx).await;
        let message = store
            .append_message(&ctx, &convo.id, "user", "first", None)
            .await
            .unwrap();

        let edited = store
            .edit_message(&ctx, &convo.id, &message.id, "second")
            .await
            .unwrap();
        assert_eq!(edited.content, "second");
        assert_eq!(edited.original_content.as_deref(), Some("first"));
        assert!(edited.is_edited);

        let again = store
            .edit_message(&ctx, &convo.id, &message.id, "third")
            .await
            .unwrap();
        assert_eq!(again.content, "third");
        assert_eq!(again.original_content.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_feedback_values() {
        let (store, ctx) = testutil::store_with_user().await;
        let convo = conversation(&store, &ctx).await;
        let message = store
            .append_message(&ctx, &convo.id, "assistant", "answer", None)
            .await
            .unwrap();

        let rated = store
            .record_message_feedback(&ctx, &convo.id, &message.id, Some("positive"))
            .await
            .unwrap();
        assert_eq!(rated.feedback.as_deref(), Some("positive"));
        assert!(rated.feedback_at.is_some());

        let flipped = store
            .record_message_feedback(&ctx, &convo.id, &message.id, Some("negative"))
            .await
            .unwrap();
        assert_eq!(flipped.feedback.as_deref(), Some("negative"));

        assert!(store
            .record_message_feedback(&ctx, &convo.id, &message.id, Some("meh"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_feedback_cleared_with_none() {
        let (store, ctx) = testutil::store_with_user().await;
        let convo = conversation(&store, &ctx).await;
        let message = store
            .append_message(&ctx, &convo.id, "assistant", "answer", None)
            .await
            .unwrap();

        store
            .record_message_feedback(&ctx, &convo.id, &message.id, Some("negative"))
            .await
            .unwrap();
        let cleared = store
            .record_message_feedback(&ctx, &convo.id, &message.id, None)
            .await
            .unwrap();
        assert_eq!(cleared.feedback, None);
        assert_eq!(cleared.feedback_at, None);
    }

    #[tokio::test]
    async fn test_cross_user_conversation_hidden() {
        let (store, ctx) = testutil::store_with_user().await;
        let other = testutil::second_user(&store).await;
        let convo = conversation(&store, &ctx).await;

        assert!(matches!(
            store
                .append_message(&other, &convo.id, "user", "intrude", None)
                .await
                .unwrap_err(),
            StoreError::NotFound { .. }
        ));
        assert!(matches!(
            store
                .list_messages(&other, &convo.id, Page::default())
                .await
                .unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_delete_cascades_messages() {
        let (store, ctx) = testutil::store_with_user().await;
        let convo = conversation(&store, &ctx).await;
        store
            .append_message(&ctx, &convo.id, "user", "bye", None)
            .await
            .unwrap();
        store.delete_conversation(&ctx, &convo.id).await.unwrap();

        let rows = store
            .pool()
            .fetch_all(
                "SELECT id FROM messages WHERE conversation_id = ?",
                &[crate::value::Value::from(convo.id.as_str())],
            )
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_metadata_sanitized() {
        let (store, ctx) = testutil::store_with_user().await;
        let convo = conversation(&store, &ctx).await;
        let message = store
            .append_message(
                &ctx,
                &convo.id,
                "assistant",
                "calc",
                Some(serde_json::json!({"tokens": 12, "note": "ok"})),
            )
            .await
            .unwrap();
        assert_eq!(
            message.message_metadata,
            Some(serde_json::json!({"tokens": 12, "note": "ok"}))
        );
    }
}
