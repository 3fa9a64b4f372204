//! Subscriptions, spend accounting, and payment-provider event ingestion.
//!
//! Event ingestion is idempotent on the provider event id, so webhook
//! retries never double-apply. Spend and credit mutations run in a
//! transaction with a row lock on the server dialect; the embedded dialect
//! serializes writers through its single connection.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use super::{new_id, now, Page, RequestContext, Store};
use crate::db::{DbRow, DbTx};
use crate::error::{Result, StoreError};
use crate::sanitize;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub plan_id: String,
    pub status: String,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub purchased_credits: i32,
    pub auto_top_up_enabled: bool,
    pub auto_top_up_threshold: i32,
    pub auto_top_up_pack_id: String,
    pub auto_top_up_max_monthly: i32,
    pub auto_top_ups_this_month: i32,
    pub spend_cap_enabled: bool,
    pub spend_cap_amount_cents: i32,
    pub spend_this_month_cents: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BillingEvent {
    pub id: String,
    pub user_id: String,
    pub event_type: String,
    pub stripe_event_id: Option<String>,
    pub payload: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

/// Partial update for plan and provider linkage; None leaves the field
/// unchanged.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionUpdate {
    pub stripe_customer_id: Option<Option<String>>,
    pub stripe_subscription_id: Option<Option<String>>,
    pub plan_id: Option<String>,
    pub status: Option<String>,
    pub current_period_start: Option<Option<DateTime<Utc>>>,
    pub current_period_end: Option<Option<DateTime<Utc>>>,
    pub cancel_at_period_end: Option<bool>,
    pub auto_top_up_enabled: Option<bool>,
    pub auto_top_up_threshold: Option<i32>,
    pub auto_top_up_pack_id: Option<String>,
    pub auto_top_up_max_monthly: Option<i32>,
    pub spend_cap_enabled: Option<bool>,
    pub spend_cap_amount_cents: Option<i32>,
}

fn row_to_subscription(row: &DbRow) -> Result<Subscription> {
    Ok(Subscription {
        id: row.get_text("id")?,
        user_id: row.get_text("user_id")?,
        stripe_customer_id: row.get_opt_text("stripe_customer_id")?,
        stripe_subscription_id: row.get_opt_text("stripe_subscription_id")?,
        plan_id: row.get_text("plan_id")?,
        status: row.get_text("status")?,
        current_period_start: row.get_opt_timestamp("current_period_start")?,
        current_period_end: row.get_opt_timestamp("current_period_end")?,
        cancel_at_period_end: row.get_bool("cancel_at_period_end")?,
        purchased_credits: row.get_i32("purchased_credits")?,
        auto_top_up_enabled: row.get_bool("auto_top_up_enabled")?,
        auto_top_up_threshold: row.get_i32("auto_top_up_threshold")?,
        auto_top_up_pack_id: row.get_text("auto_top_up_pack_id")?,
        auto_top_up_max_monthly: row.get_i32("auto_top_up_max_monthly")?,
        auto_top_ups_this_month: row.get_i32("auto_top_ups_this_month")?,
        spend_cap_enabled: row.get_bool("spend_cap_enabled")?,
        spend_cap_amount_cents: row.get_i32("spend_cap_amount_cents")?,
        spend_this_month_cents: row.get_i32("spend_this_month_cents")?,
        created_at: row.get_timestamp("created_at")?,
        updated_at: row.get_timestamp("updated_at")?,
    })
}

fn row_to_event(row: &DbRow) -> Result<BillingEvent> {
    Ok(BillingEvent {
        id: row.get_text("id")?,
        user_id: row.get_text("user_id")?,
        event_type: row.get_text("event_type")?,
        stripe_event_id: row.get_opt_text("stripe_event_id")?,
        payload: row.get_opt_json("payload")?,
        created_at: row.get_timestamp("created_at")?,
    })
}

/// Credits granted by a pack id like `credits_5500`.
fn pack_credits(pack_id: &str) -> Result<i32> {
    pack_id
        .rsplit('_')
        .next()
        .and_then(|suffix| suffix.parse::<i32>().ok())
        .filter(|n| *n > 0)
        .ok_or_else(|| StoreError::validation(format!("unknown credit pack: {}", pack_id)))
}

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, stripe_customer_id, stripe_subscription_id, plan_id, \
     status, current_period_start, current_period_end, cancel_at_period_end, \
     purchased_credits, auto_top_up_enabled, auto_top_up_threshold, \
     auto_top_up_pack_id, auto_top_up_max_monthly, auto_top_ups_this_month, \
     spend_cap_enabled, spend_cap_amount_cents, spend_this_month_cents, \
     created_at, updated_at";

const EVENT_COLUMNS: &str = "id, user_id, event_type, stripe_event_id, payload, created_at";

impl Store {
    /// The user's subscription row, created on the free plan on first call.
    pub async fn get_or_create_subscription(&self, ctx: &RequestContext) -> Result<Subscription> {
        ctx.guard("get_or_create_subscription", async {
            if let Some(row) = self
                .pool()
                .fetch_optional(
                    &format!(
                        "SELECT {} FROM subscriptions WHERE user_id = ?",
                        SUBSCRIPTION_COLUMNS
                    ),
                    &[Value::from(ctx.user_id.as_str())],
                )
                .await?
            {
                return row_to_subscription(&row);
            }
            let ts = now();
            let row = self
                .pool()
                .fetch_one(
                    &format!(
                        "INSERT INTO subscriptions (id, user_id, plan_id, status, \
                                 cancel_at_period_end, purchased_credits, \
                                 auto_top_up_enabled, auto_top_up_threshold, \
                                 auto_top_up_pack_id, auto_top_up_max_monthly, \
                                 auto_top_ups_this_month, spend_cap_enabled, \
                                 spend_cap_amount_cents, spend_this_month_cents, \
                                 created_at, updated_at) \
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                         RETURNING {}",
                        SUBSCRIPTION_COLUMNS
                    ),
                    &[
                        Value::from(new_id()),
                        Value::from(ctx.user_id.as_str()),
                        Value::from("free"),
                        Value::from("active"),
                        Value::from(false),
                        Value::from(0i32),
                        Value::from(false),
                        Value::from(100i32),
                        Value::from("credits_5500"),
                        Value::from(3i32),
                        Value::from(0i32),
                        Value::from(false),
                        Value::from(10000i32),
                        Value::from(0i32),
                        Value::from(ts),
                        Value::from(ts),
                    ],
                )
                .await?;
            row_to_subscription(&row)
        })
        .await
    }

    pub async fn update_subscription(
        &self,
        ctx: &RequestContext,
        update: SubscriptionUpdate,
    ) -> Result<Subscription> {
        ctx.guard("update_subscription", async {
            let mut sub = self.get_or_create_subscription(ctx).await?;
            if let Some(v) = update.stripe_customer_id {
                sub.stripe_customer_id = v;
            }
            if let Some(v) = update.stripe_subscription_id {
                sub.stripe_subscription_id = v;
            }
            if let Some(v) = update.plan_id {
                sub.plan_id = v;
            }
            if let Some(v) = update.status {
                sub.status = v;
            }
            if let Some(v) = update.current_period_start {
                sub.current_period_start = v;
            }
            if let Some(v) = update.current_period_end {
                sub.current_period_end = v;
            }
            if let Some(v) = update.cancel_at_period_end {
                sub.cancel_at_period_end = v;
            }
            if let Some(v) = update.auto_top_up_enabled {
                sub.auto_top_up_enabled = v;
            }
            if let Some(v) = update.auto_top_up_threshold {
                sub.auto_top_up_threshold = v;
            }
            if let Some(v) = update.auto_top_up_pack_id {
                pack_credits(&v)?;
                sub.auto_top_up_pack_id = v;
            }
            if let Some(v) = update.auto_top_up_max_monthly {
                sub.auto_top_up_max_monthly = v;
            }
            if let Some(v) = update.spend_cap_enabled {
                sub.spend_cap_enabled = v;
            }
            if let Some(v) = update.spend_cap_amount_cents {
                if v < 0 {
                    return Err(StoreError::validation("spend cap cannot be negative"));
                }
                sub.spend_cap_amount_cents = v;
            }
            sub.updated_at = now();

            self.pool()
                .execute(
                    "UPDATE subscriptions SET stripe_customer_id = ?, \
                             stripe_subscription_id = ?, plan_id = ?, status = ?, \
                             current_period_start = ?, current_period_end = ?, \
                             cancel_at_period_end = ?, auto_top_up_enabled = ?, \
                             auto_top_up_threshold = ?, auto_top_up_pack_id = ?, \
                             auto_top_up_max_monthly = ?, spend_cap_enabled = ?, \
                             spend_cap_amount_cents = ?, updated_at = ? \
                     WHERE user_id = ?",
                    &[
                        Value::from(sub.stripe_customer_id.clone()),
                        Value::from(sub.stripe_subscription_id.clone()),
                        Value::from(sub.plan_id.as_str()),
                        Value::from(sub.status.as_str()),
                        Value::from(sub.current_period_start),
                        Value::from(sub.current_period_end),
                        Value::from(sub.cancel_at_period_end),
                        Value::from(sub.auto_top_up_enabled),
                        Value::from(sub.auto_top_up_threshold),
                        Value::from(sub.auto_top_up_pack_id.as_str()),
                        Value::from(sub.auto_top_up_max_monthly),
                        Value::from(sub.spend_cap_enabled),
                        Value::from(sub.spend_cap_amount_cents),
                        Value::from(sub.updated_at),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            Ok(sub)
        })
        .await
    }

    /// Record a payment-provider event. Returns the event and whether this
    /// call inserted it; a retried webhook returns the original with false.
    pub async fn ingest_billing_event(
        &self,
        ctx: &RequestContext,
        event_type: &str,
        stripe_event_id: Option<&str>,
        payload: Option<JsonValue>,
    ) -> Result<(BillingEvent, bool)> {
        ctx.guard("ingest_billing_event", async {
            if event_type.is_empty() {
                return Err(StoreError::validation("event_type is required"));
            }
            let payload = payload.map(sanitize::clean_json);
            if let Some(p) = &payload {
                let mut logged = p.clone();
                sanitize::redact_secrets(&mut logged);
                tracing::debug!(event_type, payload = %logged, "ingesting billing event");
            }

            if let Some(event_id) = stripe_event_id {
                let inserted = self
                    .pool()
                    .execute(
                        "INSERT INTO billing_events (id, user_id, event_type, \
                                 stripe_event_id, payload, created_at) \
                         VALUES (?, ?, ?, ?, ?, ?) \
                         ON CONFLICT (stripe_event_id) DO NOTHING",
                        &[
                            Value::from(new_id()),
                            Value::from(ctx.user_id.as_str()),
                            Value::from(event_type),
                            Value::from(event_id),
                            Value::from(payload.clone()),
                            Value::from(now()),
                        ],
                    )
                    .await?;
                let row = self
                    .pool()
                    .fetch_one(
                        &format!(
                            "SELECT {} FROM billing_events WHERE stripe_event_id = ?",
                            EVENT_COLUMNS
                        ),
                        &[Value::from(event_id)],
                    )
                    .await?;
                return Ok((row_to_event(&row)?, inserted > 0));
            }

            // internal events carry no provider id and are never deduplicated
            let row = self
                .pool()
                .fetch_one(
                    &format!(
                        "INSERT INTO billing_events (id, user_id, event_type, payload, \
                                 created_at) \
                         VALUES (?, ?, ?, ?, ?) RETURNING {}",
                        EVENT_COLUMNS
                    ),
                    &[
                        Value::from(new_id()),
                        Value::from(ctx.user_id.as_str()),
                        Value::from(event_type),
                        Value::from(payload),
                        Value::from(now()),
                    ],
                )
                .await?;
            Ok((row_to_event(&row)?, true))
        })
        .await
    }

    /// Newest first.
    pub async fn list_billing_events(
        &self,
        ctx: &RequestContext,
        page: Page,
    ) -> Result<Vec<BillingEvent>> {
        ctx.guard("list_billing_events", async {
            let rows = self
                .pool()
                .fetch_all(
                    &format!(
                        "SELECT {} FROM billing_events WHERE user_id = ? \
                         ORDER BY created_at DESC LIMIT ? OFFSET ?",
                        EVENT_COLUMNS
                    ),
                    &[
                        Value::from(ctx.user_id.as_str()),
                        Value::from(page.limit()),
                        Value::from(page.offset()),
                    ],
                )
                .await?;
            rows.iter().map(row_to_event).collect()
        })
        .await
    }

    /// Add metered spend. Rejected with QuotaExceeded when a spend cap is
    /// enabled and the new total would cross it.
    pub async fn increment_spend(
        &self,
        ctx: &RequestContext,
        amount_cents: i32,
    ) -> Result<Subscription> {
        ctx.guard("increment_spend", async {
            if amount_cents <= 0 {
                return Err(StoreError::validation("spend amount must be positive"));
            }
            self.get_or_create_subscription(ctx).await?;

            let mut tx = self.pool().begin().await?;
            let sub = self.lock_subscription(&mut tx, &ctx.user_id).await?;

            if sub.spend_cap_enabled
                && sub.spend_this_month_cents + amount_cents > sub.spend_cap_amount_cents
            {
                return Err(StoreError::QuotaExceeded {
                    resource: "spend_cap",
                    limit: i64::from(sub.spend_cap_amount_cents),
                });
            }

            tx.execute(
                "UPDATE subscriptions SET spend_this_month_cents = \
                         spend_this_month_cents + ?, updated_at = ? \
                 WHERE user_id = ?",
                &[
                    Value::from(amount_cents),
                    Value::from(now()),
                    Value::from(ctx.user_id.as_str()),
                ],
            )
            .await?;
            tx.commit().await?;
            self.get_or_create_subscription(ctx).await
        })
        .await
    }

    /// Grant purchased credits (after a completed checkout).
    pub async fn add_purchased_credits(
        &self,
        ctx: &RequestContext,
        credits: i32,
    ) -> Result<Subscription> {
        ctx.guard("add_purchased_credits", async {
            if credits <= 0 {
                return Err(StoreError::validation("credit amount must be positive"));
            }
            self.get_or_create_subscription(ctx).await?;
            self.pool()
                .execute(
                    "UPDATE subscriptions SET purchased_credits = purchased_credits + ?, \
                             updated_at = ? \
                     WHERE user_id = ?",
                    &[
                        Value::from(credits),
                        Value::from(now()),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            self.get_or_create_subscription(ctx).await
        })
        .await
    }

    /// Spend purchased credits; fails if the balance is short.
    pub async fn consume_credits(&self, ctx: &RequestContext, credits: i32) -> Result<Subscription> {
        ctx.guard("consume_credits", async {
            if credits <= 0 {
                return Err(StoreError::validation("credit amount must be positive"));
            }
            self.get_or_create_subscription(ctx).await?;

            let mut tx = self.pool().begin().await?;
            let sub = self.lock_subscription(&mut tx, &ctx.user_id).await?;
            if sub.purchased_credits < credits {
                return Err(StoreError::QuotaExceeded {
                    resource: "credits",
                    limit: i64::from(sub.purchased_credits),
                });
            }
            tx.execute(
                "UPDATE subscriptions SET purchased_credits = purchased_credits - ?, \
                         updated_at = ? \
                 WHERE user_id = ?",
                &[
                    Value::from(credits),
                    Value::from(now()),
                    Value::from(ctx.user_id.as_str()),
                ],
            )
            .await?;
            tx.commit().await?;
            self.get_or_create_subscription(ctx).await
        })
        .await
    }

    /// Top up automatically when the balance drops under the configured
    /// threshold. Returns the credits granted, or None when no top-up was
    /// due (disabled or balance healthy). A due top-up past the monthly
    /// allowance fails with QuotaExceeded. The credit grant and its
    /// `auto_top_up_triggered` event commit in one transaction.
    pub async fn maybe_auto_top_up(&self, ctx: &RequestContext) -> Result<Option<i32>> {
        ctx.guard("maybe_auto_top_up", async {
            self.get_or_create_subscription(ctx).await?;

            let mut tx = self.pool().begin().await?;
            let sub = self.lock_subscription(&mut tx, &ctx.user_id).await?;

            if !sub.auto_top_up_enabled || sub.purchased_credits >= sub.auto_top_up_threshold {
                return Ok(None);
            }
            if sub.auto_top_ups_this_month >= sub.auto_top_up_max_monthly {
                return Err(StoreError::QuotaExceeded {
                    resource: "auto_top_ups",
                    limit: i64::from(sub.auto_top_up_max_monthly),
                });
            }

            let credits = pack_credits(&sub.auto_top_up_pack_id)?;
            let ts = now();
            tx.execute(
                "UPDATE subscriptions SET purchased_credits = purchased_credits + ?, \
                         auto_top_ups_this_month = auto_top_ups_this_month + 1, \
                         updated_at = ? \
                 WHERE user_id = ?",
                &[
                    Value::from(credits),
                    Value::from(ts),
                    Value::from(ctx.user_id.as_str()),
                ],
            )
            .await?;
            tx.execute(
                "INSERT INTO billing_events (id, user_id, event_type, payload, created_at) \
                 VALUES (?, ?, ?, ?, ?)",
                &[
                    Value::from(new_id()),
                    Value::from(ctx.user_id.as_str()),
                    Value::from("auto_top_up_triggered"),
                    Value::from(serde_json::json!({
                        "pack_id": sub.auto_top_up_pack_id,
                        "credits": credits,
                    })),
                    Value::from(ts),
                ],
            )
            .await?;
            tx.commit().await?;
            Ok(Some(credits))
        })
        .await
    }

    /// Billing-cycle rollover: zero every user's monthly counters.
    /// Returns the number of subscriptions touched.
    pub async fn reset_monthly_counters(&self) -> Result<u64> {
        let affected = self
            .pool()
            .execute(
                "UPDATE subscriptions SET spend_this_month_cents = 0, \
                         auto_top_ups_this_month = 0, updated_at = ?",
                &[Value::from(now())],
            )
            .await?;
        Ok(affected)
    }

    async fn lock_subscription(&self, tx: &mut DbTx, user_id: &str) -> Result<Subscription> {
        let row = tx
            .fetch_optional(
                &format!(
                    "SELECT {} FROM subscriptions WHERE user_id = ?{}",
                    SUBSCRIPTION_COLUMNS,
                    self.lock_suffix()
                ),
                &[Value::from(user_id)],
            )
            .await?
            .ok_or_else(|| StoreError::not_found("subscription", user_id))?;
        row_to_subscription(&row)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil;
    use super::*;

    #[tokio::test]
    async fn test_subscription_defaults() {
        let (store, ctx) = testutil::store_with_user().await;
        let sub = store.get_or_create_subscription(&ctx).await.unwrap();
        assert_eq!(sub.plan_id, "free");
        assert_eq!(sub.status, "active");
        assert_eq!(sub.purchased_credits, 0);

        let again = store.get_or_create_subscription(&ctx).await.unwrap();
        assert_eq!(sub.id, again.id);
    }

    #[tokio::test]
    async fn test_event_ingestion_idempotent() {
        let (store, ctx) = testutil::store_with_user().await;
        let (first, inserted) = store
            .ingest_billing_event(
                &ctx,
                "invoice.paid",
                Some("evt_1"),
                Some(serde_json::json!({"amount": 999})),
            )
            .await
            .unwrap();
        assert!(inserted);

        let (replay, inserted) = store
            .ingest_billing_event(&ctx, "invoice.paid", Some("evt_1"), None)
            .await
            .unwrap();
        assert!(!inserted);
        assert_eq!(replay.id, first.id);
        assert_eq!(replay.payload, Some(serde_json::json!({"amount": 999})));

        let events = store
            .list_billing_events(&ctx, Page::default())
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_spend_cap_enforced() {
        let (store, ctx) = testutil::store_with_user().await;
        store
            .update_subscription(
                &ctx,
                SubscriptionUpdate {
                    spend_cap_enabled: Some(true),
                    spend_cap_amount_cents: Some(1000),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let sub = store.increment_spend(&ctx, 900).await.unwrap();
        assert_eq!(sub.spend_this_month_cents, 900);

        let err = store.increment_spend(&ctx, 200).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::QuotaExceeded {
                resource: "spend_cap",
                limit: 1000
            }
        ));

        // exactly hitting the cap is allowed
        let sub = store.increment_spend(&ctx, 100).await.unwrap();
        assert_eq!(sub.spend_this_month_cents, 1000);
    }

    #[tokio::test]
    async fn test_credit_balance_enforced() {
        let (store, ctx) = testutil::store_with_user().await;
        store.add_purchased_credits(&ctx, 50).await.unwrap();
        let err = store.consume_credits(&ctx, 60).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::QuotaExceeded {
                resource: "credits",
                ..
            }
        ));
        let sub = store.consume_credits(&ctx, 50).await.unwrap();
        assert_eq!(sub.purchased_credits, 0);
    }

    #[tokio::test]
    async fn test_auto_top_up_rules() {
        let (store, ctx) = testutil::store_with_user().await;

        // disabled by default
        assert_eq!(store.maybe_auto_top_up(&ctx).await.unwrap(), None);

        store
            .update_subscription(
                &ctx,
                SubscriptionUpdate {
                    auto_top_up_enabled: Some(true),
                    auto_top_up_threshold: Some(100),
                    auto_top_up_pack_id: Some("credits_500".into()),
                    auto_top_up_max_monthly: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // balance below threshold: tops up by the pack size
        assert_eq!(store.maybe_auto_top_up(&ctx).await.unwrap(), Some(500));
        // balance now healthy
        assert_eq!(store.maybe_auto_top_up(&ctx).await.unwrap(), None);

        store.consume_credits(&ctx, 450).await.unwrap();
        assert_eq!(store.maybe_auto_top_up(&ctx).await.unwrap(), Some(500));

        // a due top-up past the monthly allowance is a quota error
        store.consume_credits(&ctx, 500).await.unwrap();
        let err = store.maybe_auto_top_up(&ctx).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::QuotaExceeded {
                resource: "auto_top_ups",
                limit: 2
            }
        ));
        // the failed attempt must not grant credits or bump the counter
        let sub = store.get_or_create_subscription(&ctx).await.unwrap();
        assert_eq!(sub.purchased_credits, 50);
        assert_eq!(sub.auto_top_ups_this_month, 2);

        store.reset_monthly_counters().await.unwrap();
        assert_eq!(store.maybe_auto_top_up(&ctx).await.unwrap(), Some(500));
    }

    #[tokio::test]
    async fn test_auto_top_up_emits_billing_event() {
        let (store, ctx) = testutil::store_with_user().await;
        store
            .update_subscription(
                &ctx,
                SubscriptionUpdate {
                    auto_top_up_enabled: Some(true),
                    auto_top_up_threshold: Some(100),
                    auto_top_up_pack_id: Some("credits_500".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(store.maybe_auto_top_up(&ctx).await.unwrap(), Some(500));

        let events = store
            .list_billing_events(&ctx, Page::default())
            .await
            .unwrap();
        let triggered: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == "auto_top_up_triggered")
            .collect();
        assert_eq!(triggered.len(), 1);
        assert_eq!(
            triggered[0].payload,
            Some(serde_json::json!({"pack_id": "credits_500", "credits": 500}))
        );

        // a healthy balance emits nothing further
        assert_eq!(store.maybe_auto_top_up(&ctx).await.unwrap(), None);
        let events = store
            .list_billing_events(&ctx, Page::default())
            .await
            .unwrap();
        assert_eq!(
            events
                .iter()
                .filter(|e| e.event_type == "auto_top_up_triggered")
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_bad_pack_id_rejected() {
        let (store, ctx) = testutil::store_with_user().await;
        let err = store
            .update_subscription(
                &ctx,
                SubscriptionUpdate {
                    auto_top_up_pack_id: Some("credits_gold".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn test_pack_credits_parsing() {
        assert_eq!(pack_credits("credits_5500").unwrap(), 5500);
        assert_eq!(pack_credits("starter_pack_100").unwrap(), 100);
        assert!(pack_credits("credits_zero").is_err());
        assert!(pack_credits("credits_-5").is_err());
    }
}
