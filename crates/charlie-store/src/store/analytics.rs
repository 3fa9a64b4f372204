//! Daily usage rollups.
//!
//! One row per user per calendar day, written with an additive upsert so
//! concurrent recorders never lose counts. Gauges (response time, the
//! breakdown blob) take the newest non-null value instead of summing.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;

use super::{new_id, now, with_conflict_retry, RequestContext, Store};
use crate::db::DbRow;
use crate::error::{Result, StoreError};
use crate::sanitize;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct DailyUsage {
    pub id: String,
    pub user_id: String,
    pub record_date: NaiveDate,
    pub conversations_count: i32,
    pub messages_count: i32,
    pub tokens_used: i64,
    pub agents_created: i32,
    pub agents_active: i32,
    pub workflows_created: i32,
    pub workflows_executed: i32,
    pub avg_response_time_ms: Option<i32>,
    pub error_count: i32,
    pub breakdown: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Increments to fold into a day's rollup. Counters add; the optional
/// gauges replace when present.
#[derive(Debug, Clone, Default)]
pub struct UsageDelta {
    pub conversations_count: i32,
    pub messages_count: i32,
    pub tokens_used: i64,
    pub agents_created: i32,
    pub agents_active: i32,
    pub workflows_created: i32,
    pub workflows_executed: i32,
    pub error_count: i32,
    pub avg_response_time_ms: Option<i32>,
    pub breakdown: Option<JsonValue>,
}

fn row_to_usage(row: &DbRow) -> Result<DailyUsage> {
    Ok(DailyUsage {
        id: row.get_text("id")?,
        user_id: row.get_text("user_id")?,
        record_date: row.get_date("record_date")?,
        conversations_count: row.get_i32("conversations_count")?,
        messages_count: row.get_i32("messages_count")?,
        tokens_used: row.get_i64("tokens_used")?,
        agents_created: row.get_i32("agents_created")?,
        agents_active: row.get_i32("agents_active")?,
        workflows_created: row.get_i32("workflows_created")?,
        workflows_executed: row.get_i32("workflows_executed")?,
        avg_response_time_ms: row.get_opt_i32("avg_response_time_ms")?,
        error_count: row.get_i32("error_count")?,
        breakdown: row.get_opt_json("breakdown")?,
        created_at: row.get_timestamp("created_at")?,
        updated_at: row.get_timestamp("updated_at")?,
    })
}

const USAGE_COLUMNS: &str = "id, user_id, record_date, conversations_count, messages_count, \
     tokens_used, agents_created, agents_active, workflows_created, \
     workflows_executed, avg_response_time_ms, error_count, breakdown, \
     created_at, updated_at";

impl Store {
    /// Fold a delta into the rollup for `record_date`, creating the row on
    /// first touch. Counters accumulate across calls.
    pub async fn record_usage(
        &self,
        ctx: &RequestContext,
        record_date: NaiveDate,
        delta: UsageDelta,
    ) -> Result<DailyUsage> {
        ctx.guard("record_usage", async {
            if delta.tokens_used < 0 {
                return Err(StoreError::validation("token count cannot be negative"));
            }
            let breakdown = delta.breakdown.clone().map(sanitize::clean_json);
            with_conflict_retry(|| async {
                let ts = now();
                let row = self
                    .pool()
                    .fetch_one(
                        &format!(
                            "INSERT INTO analytics_daily (id, user_id, record_date, \
                                     conversations_count, messages_count, tokens_used, \
                                     agents_created, agents_active, workflows_created, \
                                     workflows_executed, avg_response_time_ms, error_count, \
                                     breakdown, created_at, updated_at) \
                             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                             ON CONFLICT (user_id, record_date) DO UPDATE SET \
                                 conversations_count = analytics_daily.conversations_count \
                                     + excluded.conversations_count, \
                                 messages_count = analytics_daily.messages_count \
                                     + excluded.messages_count, \
                                 tokens_used = analytics_daily.tokens_used \
                                     + excluded.tokens_used, \
                                 agents_created = analytics_daily.agents_created \
                                     + excluded.agents_created, \
                                 agents_active = analytics_daily.agents_active \
                                     + excluded.agents_active, \
                                 workflows_created = analytics_daily.workflows_created \
                                     + excluded.workflows_created, \
                                 workflows_executed = analytics_daily.workflows_executed \
                                     + excluded.workflows_executed, \
                                 avg_response_time_ms = COALESCE(\
                                     excluded.avg_response_time_ms, \
                                     analytics_daily.avg_response_time_ms), \
                                 error_count = analytics_daily.error_count \
                                     + excluded.error_count, \
                                 breakdown = COALESCE(excluded.breakdown, \
                                     analytics_daily.breakdown), \
                                 updated_at = excluded.updated_at \
                             RETURNING {}",
                            USAGE_COLUMNS
                        ),
                        &[
                            Value::from(new_id()),
                            Value::from(ctx.user_id.as_str()),
                            Value::from(record_date),
                            Value::from(delta.conversations_count),
                            Value::from(delta.messages_count),
                            Value::from(delta.tokens_used),
                            Value::from(delta.agents_created),
                            Value::from(delta.agents_active),
                            Value::from(delta.workflows_created),
                            Value::from(delta.workflows_executed),
                            Value::from(delta.avg_response_time_ms),
                            Value::from(delta.error_count),
                            Value::from(breakdown.clone()),
                            Value::from(ts),
                            Value::from(ts),
                        ],
                    )
                    .await?;
                row_to_usage(&row)
            })
            .await
        })
        .await
    }

    /// Rollups in `[from, to]`, oldest first. Days with no activity have no
    /// row.
    pub async fn usage_range(
        &self,
        ctx: &RequestContext,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyUsage>> {
        ctx.guard("usage_range", async {
            if from > to {
                return Err(StoreError::validation("date range is inverted"));
            }
            let rows = self
                .pool()
                .fetch_all(
                    &format!(
                        "SELECT {} FROM analytics_daily \
                         WHERE user_id = ? AND record_date >= ? AND record_date <= ? \
                         ORDER BY record_date",
                        USAGE_COLUMNS
                    ),
                    &[
                        Value::from(ctx.user_id.as_str()),
                        Value::from(from),
                        Value::from(to),
                    ],
                )
                .await?;
            rows.iter().map(row_to_usage).collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil;
    use super::*;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_deltas_accumulate() {
        let (store, ctx) = testutil::store_with_user().await;
        let date = day("2026-02-01");

        let first = store
            .record_usage(
                &ctx,
                date,
                UsageDelta {
                    conversations_count: 1,
                    messages_count: 4,
                    tokens_used: 1200,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(first.messages_count, 4);

        let second = store
            .record_usage(
                &ctx,
                date,
                UsageDelta {
                    messages_count: 2,
                    tokens_used: 300,
                    error_count: 1,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.conversations_count, 1);
        assert_eq!(second.messages_count, 6);
        assert_eq!(second.tokens_used, 1500);
        assert_eq!(second.error_count, 1);
    }

    #[tokio::test]
    async fn test_gauges_take_latest_non_null() {
        let (store, ctx) = testutil::store_with_user().await;
        let date = day("2026-02-01");

        store
            .record_usage(
                &ctx,
                date,
                UsageDelta {
                    avg_response_time_ms: Some(850),
                    breakdown: Some(serde_json::json!({"gpt": 10})),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // a delta without gauges leaves them alone
        let kept = store
            .record_usage(&ctx, date, UsageDelta::default())
            .await
            .unwrap();
        assert_eq!(kept.avg_response_time_ms, Some(850));
        assert_eq!(kept.breakdown, Some(serde_json::json!({"gpt": 10})));

        let replaced = store
            .record_usage(
                &ctx,
                date,
                UsageDelta {
                    avg_response_time_ms: Some(420),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(replaced.avg_response_time_ms, Some(420));
    }

    #[tokio::test]
    async fn test_concurrent_recorders_lose_nothing() {
        let (store, ctx) = testutil::store_with_user().await;
        let date = day("2026-02-01");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..5 {
                    store
                        .record_usage(
                            &ctx,
                            date,
                            UsageDelta {
                                messages_count: 1,
                                tokens_used: 10,
                                ..Default::default()
                            },
                        )
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let rows = store.usage_range(&ctx, date, date).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].messages_count, 40);
        assert_eq!(rows[0].tokens_used, 400);
    }

    #[tokio::test]
    async fn test_range_query_ordered_and_scoped() {
        let (store, ctx) = testutil::store_with_user().await;
        let other = testutil::second_user(&store).await;

        for d in ["2026-02-03", "2026-02-01", "2026-02-10"] {
            store
                .record_usage(
                    &ctx,
                    day(d),
                    UsageDelta {
                        messages_count: 1,
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }
        store
            .record_usage(
                &other,
                day("2026-02-02"),
                UsageDelta {
                    messages_count: 9,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let rows = store
            .usage_range(&ctx, day("2026-02-01"), day("2026-02-05"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].record_date, day("2026-02-01"));
        assert_eq!(rows[1].record_date, day("2026-02-03"));

        assert!(store
            .usage_range(&ctx, day("2026-02-05"), day("2026-02-01"))
            .await
            .is_err());
    }
}
