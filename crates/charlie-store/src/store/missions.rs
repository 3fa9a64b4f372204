//! Guided onboarding missions and per-user progress.
//!
//! Missions themselves are global content rows seeded by operators; only
//! progress is user-scoped. Visibility is gated by plan tier, and step
//! completion is idempotent so a replayed client event cannot double-count.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use super::{new_id, now, RequestContext, Store};
use crate::db::DbRow;
use crate::error::{Result, StoreError};
use crate::sanitize;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Mission {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub difficulty: String,
    pub estimated_minutes: i32,
    pub icon: Option<String>,
    pub sort_order: i32,
    pub steps: JsonValue,
    pub prerequisites: Option<JsonValue>,
    pub outcomes: Option<JsonValue>,
    pub is_active: bool,
    pub template_id: Option<String>,
    pub component_pack: Option<JsonValue>,
    pub canvas_mode: bool,
    pub ui_config: Option<JsonValue>,
    pub required_plan: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MissionProgress {
    pub id: String,
    pub user_id: String,
    pub mission_id: String,
    pub status: String,
    pub current_step: i32,
    pub completed_steps: JsonValue,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub artifacts: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Full mission definition for seeding; upserted by id.
#[derive(Debug, Clone)]
pub struct MissionSeed {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub difficulty: String,
    pub estimated_minutes: i32,
    pub icon: Option<String>,
    pub sort_order: i32,
    pub steps: JsonValue,
    pub prerequisites: Option<JsonValue>,
    pub outcomes: Option<JsonValue>,
    pub is_active: bool,
    pub template_id: Option<String>,
    pub component_pack: Option<JsonValue>,
    pub canvas_mode: bool,
    pub ui_config: Option<JsonValue>,
    pub required_plan: String,
}

impl Default for MissionSeed {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            description: None,
            category: None,
            difficulty: "beginner".into(),
            estimated_minutes: 30,
            icon: None,
            sort_order: 0,
            steps: JsonValue::Array(Vec::new()),
            prerequisites: None,
            outcomes: None,
            is_active: true,
            template_id: None,
            component_pack: None,
            canvas_mode: false,
            ui_config: None,
            required_plan: "free".into(),
        }
    }
}

/// Plan tiers in ascending order; unknown plans rank highest so a new
/// tier never hides content from its own subscribers.
fn plan_rank(plan: &str) -> u8 {
    match plan {
        "free" => 0,
        "individual" => 1,
        "team" => 2,
        _ => 3,
    }
}

fn step_count(steps: &JsonValue) -> usize {
    match steps {
        JsonValue::Array(items) => items.len(),
        _ => 0,
    }
}

const UI_CONFIG_FLAGS: &[&str] = &[
    "hide_sidebar",
    "hide_minimap",
    "hide_toolbar",
    "custom_actions_only",
];

/// The ui_config blob is a flat map of known boolean flags.
fn check_ui_config(config: &JsonValue) -> Result<()> {
    let map = config
        .as_object()
        .ok_or_else(|| StoreError::validation("ui_config must be an object"))?;
    for (key, value) in map {
        if !UI_CONFIG_FLAGS.contains(&key.as_str()) {
            return Err(StoreError::validation(format!(
                "unknown ui_config flag: {}",
                key
            )));
        }
        if !value.is_boolean() {
            return Err(StoreError::validation(format!(
                "ui_config flag {} must be a boolean",
                key
            )));
        }
    }
    Ok(())
}

fn row_to_mission(row: &DbRow) -> Result<Mission> {
    Ok(Mission {
        id: row.get_text("id")?,
        name: row.get_text("name")?,
        description: row.get_opt_text("description")?,
        category: row.get_opt_text("category")?,
        difficulty: row.get_text("difficulty")?,
        estimated_minutes: row.get_i32("estimated_minutes")?,
        icon: row.get_opt_text("icon")?,
        sort_order: row.get_i32("sort_order")?,
        steps: row
            .get_opt_json("steps")?
            .unwrap_or_else(|| JsonValue::Array(Vec::new())),
        prerequisites: row.get_opt_json("prerequisites")?,
        outcomes: row.get_opt_json("outcomes")?,
        is_active: row.get_bool("is_active")?,
        template_id: row.get_opt_text("template_id")?,
        component_pack: row.get_opt_json("component_pack")?,
        canvas_mode: row.get_bool("canvas_mode")?,
        ui_config: row.get_opt_json("ui_config")?,
        required_plan: row.get_text("required_plan")?,
        created_at: row.get_timestamp("created_at")?,
    })
}

fn row_to_progress(row: &DbRow) -> Result<MissionProgress> {
    Ok(MissionProgress {
        id: row.get_text("id")?,
        user_id: row.get_text("user_id")?,
        mission_id: row.get_text("mission_id")?,
        status: row.get_text("status")?,
        current_step: row.get_i32("current_step")?,
        completed_steps: row
            .get_opt_json("completed_steps")?
            .unwrap_or_else(|| JsonValue::Array(Vec::new())),
        started_at: row.get_opt_timestamp("started_at")?,
        completed_at: row.get_opt_timestamp("completed_at")?,
        artifacts: row.get_opt_json("artifacts")?,
        created_at: row.get_timestamp("created_at")?,
        updated_at: row.get_timestamp("updated_at")?,
    })
}

const MISSION_COLUMNS: &str = "id, name, description, category, difficulty, estimated_minutes, \
     icon, sort_order, steps, prerequisites, outcomes, is_active, \
     template_id, component_pack, canvas_mode, ui_config, required_plan, \
     created_at";

const PROGRESS_COLUMNS: &str = "id, user_id, mission_id, status, current_step, completed_steps, \
     started_at, completed_at, artifacts, created_at, updated_at";

impl Store {
    /// Seed or refresh a mission definition. Not user-scoped; callers gate
    /// this behind operator auth.
    pub async fn upsert_mission(&self, seed: MissionSeed) -> Result<Mission> {
        if seed.id.is_empty() || seed.name.is_empty() {
            return Err(StoreError::validation("mission id and name are required"));
        }
        if !matches!(seed.steps, JsonValue::Array(_)) {
            return Err(StoreError::validation("mission steps must be an array"));
        }
        if let Some(config) = &seed.ui_config {
            check_ui_config(config)?;
        }
        let row = self
            .pool()
            .fetch_one(
                &format!(
                    "INSERT INTO missions (id, name, description, category, difficulty, \
                             estimated_minutes, icon, sort_order, steps, prerequisites, \
                             outcomes, is_active, template_id, component_pack, canvas_mode, \
                             ui_config, required_plan, created_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                     ON CONFLICT (id) DO UPDATE SET \
                         name = excluded.name, description = excluded.description, \
                         category = excluded.category, difficulty = excluded.difficulty, \
                         estimated_minutes = excluded.estimated_minutes, \
                         icon = excluded.icon, sort_order = excluded.sort_order, \
                         steps = excluded.steps, prerequisites = excluded.prerequisites, \
                         outcomes = excluded.outcomes, is_active = excluded.is_active, \
                         template_id = excluded.template_id, \
                         component_pack = excluded.component_pack, \
                         canvas_mode = excluded.canvas_mode, \
                         ui_config = excluded.ui_config, \
                         required_plan = excluded.required_plan \
                     RETURNING {}",
                    MISSION_COLUMNS
                ),
                &[
                    Value::from(seed.id.as_str()),
                    Value::from(seed.name.as_str()),
                    Value::from(seed.description),
                    Value::from(seed.category),
                    Value::from(seed.difficulty.as_str()),
                    Value::from(seed.estimated_minutes),
                    Value::from(seed.icon),
                    Value::from(seed.sort_order),
                    Value::from(sanitize::clean_json(seed.steps)),
                    Value::from(seed.prerequisites.map(sanitize::clean_json)),
                    Value::from(seed.outcomes.map(sanitize::clean_json)),
                    Value::from(seed.is_active),
                    Value::from(seed.template_id),
                    Value::from(seed.component_pack.map(sanitize::clean_json)),
                    Value::from(seed.canvas_mode),
                    Value::from(seed.ui_config.map(sanitize::clean_json)),
                    Value::from(seed.required_plan.as_str()),
                    Value::from(now()),
                ],
            )
            .await?;
        row_to_mission(&row)
    }

    /// Active missions the user's plan can see, in display order.
    pub async fn list_missions(&self, ctx: &RequestContext) -> Result<Vec<Mission>> {
        ctx.guard("list_missions", async {
            let sub = self.get_or_create_subscription(ctx).await?;
            let user_rank = plan_rank(&sub.plan_id);
            let rows = self
                .pool()
                .fetch_all(
                    &format!(
                        "SELECT {} FROM missions WHERE is_active = ? \
                         ORDER BY sort_order, id",
                        MISSION_COLUMNS
                    ),
                    &[Value::from(true)],
                )
                .await?;
            rows.iter()
                .map(row_to_mission)
                .filter(|m| match m {
                    Ok(m) => plan_rank(&m.required_plan) <= user_rank,
                    Err(_) => true,
                })
                .collect()
        })
        .await
    }

    pub async fn get_mission(&self, ctx: &RequestContext, mission_id: &str) -> Result<Mission> {
        ctx.guard("get_mission", async {
            self.fetch_mission(mission_id).await
        })
        .await
    }

    /// Begin a mission. Restarting one already in flight returns the
    /// existing progress untouched.
    pub async fn start_mission(
        &self,
        ctx: &RequestContext,
        mission_id: &str,
    ) -> Result<MissionProgress> {
        ctx.guard("start_mission", async {
            let mission = self.fetch_mission(mission_id).await?;
            if !mission.is_active {
                return Err(StoreError::validation("mission is not active"));
            }
            if let Some(existing) = self.fetch_progress(ctx, mission_id).await? {
                return Ok(existing);
            }
            let ts = now();
            let row = self
                .pool()
                .fetch_one(
                    &format!(
                        "INSERT INTO user_mission_progress (id, user_id, mission_id, \
                                 status, current_step, completed_steps, started_at, \
                                 created_at, updated_at) \
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
                        PROGRESS_COLUMNS
                    ),
                    &[
                        Value::from(new_id()),
                        Value::from(ctx.user_id.as_str()),
                        Value::from(mission_id),
                        Value::from("in_progress"),
                        Value::from(0i32),
                        Value::from(serde_json::json!([])),
                        Value::from(ts),
                        Value::from(ts),
                        Value::from(ts),
                    ],
                )
                .await?;
            row_to_progress(&row)
        })
        .await
    }

    /// Mark a step done, optionally attaching an artifact produced by it.
    /// Completing the last outstanding step completes the mission.
    pub async fn complete_mission_step(
        &self,
        ctx: &RequestContext,
        mission_id: &str,
        step_index: i32,
        artifact: Option<JsonValue>,
    ) -> Result<MissionProgress> {
        ctx.guard("complete_mission_step", async {
            let mission = self.fetch_mission(mission_id).await?;
            let total_steps = step_count(&mission.steps);
            if step_index < 0 || step_index as usize >= total_steps {
                return Err(StoreError::validation(format!(
                    "step {} out of range for mission {}",
                    step_index, mission_id
                )));
            }
            let mut progress = self
                .fetch_progress(ctx, mission_id)
                .await?
                .ok_or_else(|| StoreError::not_found("mission progress", mission_id))?;
            if progress.status == "completed" {
                return Ok(progress);
            }

            let mut done = match progress.completed_steps {
                JsonValue::Array(items) => items,
                _ => Vec::new(),
            };
            let step = JsonValue::from(step_index);
            if !done.contains(&step) {
                done.push(step);
            }
            if let Some(artifact) = artifact {
                let mut map = match progress.artifacts.take() {
                    Some(JsonValue::Object(map)) => map,
                    _ => serde_json::Map::new(),
                };
                map.insert(step_index.to_string(), sanitize::clean_json(artifact));
                progress.artifacts = Some(JsonValue::Object(map));
            }

            progress.current_step = progress.current_step.max(step_index + 1);
            if done.len() >= total_steps {
                progress.status = "completed".into();
                progress.completed_at = Some(now());
            }
            progress.completed_steps = JsonValue::Array(done);
            progress.updated_at = now();

            self.pool()
                .execute(
                    "UPDATE user_mission_progress SET status = ?, current_step = ?, \
                             completed_steps = ?, completed_at = ?, artifacts = ?, \
                             updated_at = ? \
                     WHERE id = ? AND user_id = ?",
                    &[
                        Value::from(progress.status.as_str()),
                        Value::from(progress.current_step),
                        Value::from(progress.completed_steps.clone()),
                        Value::from(progress.completed_at),
                        Value::from(progress.artifacts.clone()),
                        Value::from(progress.updated_at),
                        Value::from(progress.id.as_str()),
                        Value::from(ctx.user_id.as_str()),
                    ],
                )
                .await?;
            Ok(progress)
        })
        .await
    }

    pub async fn get_mission_progress(
        &self,
        ctx: &RequestContext,
        mission_id: &str,
    ) -> Result<MissionProgress> {
        ctx.guard("get_mission_progress", async {
            self.fetch_progress(ctx, mission_id)
                .await?
                .ok_or_else(|| StoreError::not_found("mission progress", mission_id))
        })
        .await
    }

    /// All of the user's progress rows, most recently updated first.
    pub async fn list_mission_progress(
        &self,
        ctx: &RequestContext,
    ) -> Result<Vec<MissionProgress>> {
        ctx.guard("list_mission_progress", async {
            let rows = self
                .pool()
                .fetch_all(
                    &format!(
                        "SELECT {} FROM user_mission_progress WHERE user_id = ? \
                         ORDER BY updated_at DESC",
                        PROGRESS_COLUMNS
                    ),
                    &[Value::from(ctx.user_id.as_str())],
                )
                .await?;
            rows.iter().map(row_to_progress).collect()
        })
        .await
    }

    async fn fetch_mission(&self, mission_id: &str) -> Result<Mission> {
        let row = self
            .pool()
            .fetch_optional(
                &format!("SELECT {} FROM missions WHERE id = ?", MISSION_COLUMNS),
                &[Value::from(mission_id)],
            )
            .await?
            .ok_or_else(|| StoreError::not_found("mission", mission_id))?;
        row_to_mission(&row)
    }

    async fn fetch_progress(
        &self,
        ctx: &RequestContext,
        mission_id: &str,
    ) -> Result<Option<MissionProgress>> {
        let row = self
            .pool()
            .fetch_optional(
                &format!(
                    "SELECT {} FROM user_mission_progress \
                     WHERE mission_id = ? AND user_id = ?",
                    PROGRESS_COLUMNS
                ),
                &[
                    Value::from(mission_id),
                    Value::from(ctx.user_id.as_str()),
                ],
            )
            .await?;
        row.as_ref().map(row_to_progress).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::super::billing::SubscriptionUpdate;
    use super::super::testutil;
    use super::*;

    fn seed(id: &str, steps: usize, plan: &str) -> MissionSeed {
        MissionSeed {
            id: id.into(),
            name: format!("Mission {}", id),
            steps: JsonValue::Array(
                (0..steps)
                    .map(|i| serde_json::json!({"title": format!("step {}", i)}))
                    .collect(),
            ),
            required_plan: plan.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_definition() {
        let (store, _ctx) = testutil::store_with_user().await;
        store.upsert_mission(seed("m1", 2, "free")).await.unwrap();
        let updated = store
            .upsert_mission(MissionSeed {
                sort_order: 5,
                ..seed("m1", 3, "free")
            })
            .await
            .unwrap();
        assert_eq!(updated.sort_order, 5);
        assert_eq!(step_count(&updated.steps), 3);
    }

    #[tokio::test]
    async fn test_ui_config_shape_enforced() {
        let (store, _ctx) = testutil::store_with_user().await;

        let err = store
            .upsert_mission(MissionSeed {
                ui_config: Some(serde_json::json!({"hide_sidebar": "yes"})),
                ..seed("m1", 1, "free")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        assert!(store
            .upsert_mission(MissionSeed {
                ui_config: Some(serde_json::json!({"theme": "dark"})),
                ..seed("m1", 1, "free")
            })
            .await
            .is_err());

        let mission = store
            .upsert_mission(MissionSeed {
                ui_config: Some(serde_json::json!({
                    "hide_sidebar": true,
                    "custom_actions_only": false
                })),
                ..seed("m1", 1, "free")
            })
            .await
            .unwrap();
        assert_eq!(
            mission.ui_config,
            Some(serde_json::json!({
                "hide_sidebar": true,
                "custom_actions_only": false
            }))
        );
    }

    #[tokio::test]
    async fn test_plan_gating() {
        let (store, ctx) = testutil::store_with_user().await;
        store.upsert_mission(seed("m-free", 1, "free")).await.unwrap();
        store
            .upsert_mission(seed("m-team", 1, "team"))
            .await
            .unwrap();
        store
            .upsert_mission(MissionSeed {
                is_active: false,
                ..seed("m-off", 1, "free")
            })
            .await
            .unwrap();

        let visible = store.list_missions(&ctx).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "m-free");

        store
            .update_subscription(
                &ctx,
                SubscriptionUpdate {
                    plan_id: Some("team".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let visible = store.list_missions(&ctx).await.unwrap();
        assert_eq!(visible.len(), 2);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (store, ctx) = testutil::store_with_user().await;
        store.upsert_mission(seed("m1", 2, "free")).await.unwrap();

        let first = store.start_mission(&ctx, "m1").await.unwrap();
        assert_eq!(first.status, "in_progress");
        assert!(first.started_at.is_some());

        let again = store.start_mission(&ctx, "m1").await.unwrap();
        assert_eq!(again.id, first.id);
    }

    #[tokio::test]
    async fn test_step_completion_and_finish() {
        let (store, ctx) = testutil::store_with_user().await;
        store.upsert_mission(seed("m1", 3, "free")).await.unwrap();
        store.start_mission(&ctx, "m1").await.unwrap();

        let p = store
            .complete_mission_step(&ctx, "m1", 1, Some(serde_json::json!({"url": "a"})))
            .await
            .unwrap();
        assert_eq!(p.status, "in_progress");
        assert_eq!(p.current_step, 2);

        // replaying the same step changes nothing
        let p = store
            .complete_mission_step(&ctx, "m1", 1, None)
            .await
            .unwrap();
        assert_eq!(p.completed_steps, serde_json::json!([1]));

        store.complete_mission_step(&ctx, "m1", 0, None).await.unwrap();
        let done = store
            .complete_mission_step(&ctx, "m1", 2, None)
            .await
            .unwrap();
        assert_eq!(done.status, "completed");
        assert!(done.completed_at.is_some());
        assert_eq!(
            done.artifacts,
            Some(serde_json::json!({"1": {"url": "a"}}))
        );

        let err = store
            .complete_mission_step(&ctx, "m1", 3, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_step_requires_started_mission() {
        let (store, ctx) = testutil::store_with_user().await;
        store.upsert_mission(seed("m1", 1, "free")).await.unwrap();
        let err = store
            .complete_mission_step(&ctx, "m1", 0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
