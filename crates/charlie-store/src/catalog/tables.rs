//! Head-revision table declarations.
//!
//! Column shapes here must agree with the end state of the migration chain;
//! the chain walk test introspects a freshly migrated database and diffs it
//! against these declarations.

use super::{
    ColumnSpec, DefaultValue, ForeignKeySpec, IndexSpec, OnDelete, SemanticType, TableSpec,
    UniqueSpec,
};
use SemanticType::{BigInt, Boolean, Date, Integer, Json, Timestamp};

pub(crate) fn id() -> ColumnSpec {
    ColumnSpec::new("id", SemanticType::text(36)).not_null()
}

pub(crate) fn created_at() -> ColumnSpec {
    ColumnSpec::new("created_at", Timestamp)
        .not_null()
        .default_value(DefaultValue::CurrentTimestamp)
}

pub(crate) fn updated_at() -> ColumnSpec {
    ColumnSpec::new("updated_at", Timestamp)
        .not_null()
        .default_value(DefaultValue::CurrentTimestamp)
}

pub(crate) fn user_id() -> ColumnSpec {
    ColumnSpec::new("user_id", SemanticType::text(36)).not_null()
}

pub(crate) fn user_fk() -> ForeignKeySpec {
    ForeignKeySpec::new("user_id", "users", OnDelete::Cascade)
}

pub(crate) fn project_fk_column() -> ColumnSpec {
    ColumnSpec::new("project_id", SemanticType::text(36))
}

pub(crate) fn project_fk() -> ForeignKeySpec {
    ForeignKeySpec::new("project_id", "projects", OnDelete::SetNull)
}

pub fn users() -> TableSpec {
    TableSpec::new(
        "users",
        vec![
            id(),
            ColumnSpec::new("clerk_id", SemanticType::text(255)).not_null(),
            ColumnSpec::new("email", SemanticType::text(255)).not_null(),
            ColumnSpec::new("first_name", SemanticType::text(255)),
            ColumnSpec::new("last_name", SemanticType::text(255)),
            ColumnSpec::new("is_active", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(true)),
            ColumnSpec::new("mcp_bridge_token", SemanticType::text(255)),
            created_at(),
            updated_at(),
        ],
    )
    .indexes(vec![
        IndexSpec::unique("ix_users_clerk_id", &["clerk_id"]),
        IndexSpec::unique("ix_users_email", &["email"]),
        IndexSpec::unique("ix_users_mcp_bridge_token", &["mcp_bridge_token"]),
    ])
}

pub fn projects() -> TableSpec {
    TableSpec::new(
        "projects",
        vec![
            id(),
            user_id(),
            ColumnSpec::new("name", SemanticType::text(255)).not_null(),
            ColumnSpec::new("description", SemanticType::unbounded_text()),
            ColumnSpec::new("icon", SemanticType::text(50))
                .not_null()
                .default_value(DefaultValue::Text("folder")),
            ColumnSpec::new("color", SemanticType::text(20))
                .not_null()
                .default_value(DefaultValue::Text("#f97316")),
            ColumnSpec::new("is_default", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(false)),
            ColumnSpec::new("is_archived", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(false)),
            ColumnSpec::new("sort_order", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            created_at(),
            updated_at(),
        ],
    )
    .foreign_keys(vec![user_fk()])
    .indexes(vec![
        IndexSpec::new("ix_projects_user_id", &["user_id"]),
        IndexSpec::new("ix_projects_user_sort", &["user_id", "sort_order"]),
    ])
}

pub fn agent_components() -> TableSpec {
    TableSpec::new(
        "agent_components",
        vec![
            id(),
            user_id(),
            project_fk_column(),
            ColumnSpec::new("name", SemanticType::text(255)).not_null(),
            ColumnSpec::new("description", SemanticType::unbounded_text()),
            ColumnSpec::new("icon", SemanticType::text(50))
                .not_null()
                .default_value(DefaultValue::Text("bot")),
            ColumnSpec::new("color", SemanticType::text(20))
                .not_null()
                .default_value(DefaultValue::Text("#7C3AED")),
            ColumnSpec::new("avatar_url", SemanticType::text(500)),
            ColumnSpec::new("qa_who", SemanticType::unbounded_text()),
            ColumnSpec::new("qa_rules", SemanticType::unbounded_text()),
            ColumnSpec::new("qa_tricks", SemanticType::unbounded_text()),
            ColumnSpec::new("system_prompt", SemanticType::unbounded_text()),
            ColumnSpec::new("advanced_config", Json),
            ColumnSpec::new("component_file_path", SemanticType::text(500)),
            ColumnSpec::new("component_class_name", SemanticType::text(100)),
            ColumnSpec::new("is_published", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(false)),
            ColumnSpec::new("selected_tools", Json),
            ColumnSpec::new("knowledge_source_ids", Json),
            ColumnSpec::new("is_embeddable", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(false)),
            ColumnSpec::new("embed_config", Json),
            ColumnSpec::new("embed_token", SemanticType::text(64)),
            ColumnSpec::new("is_active", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(true)),
            created_at(),
            updated_at(),
        ],
    )
    .foreign_keys(vec![
        user_fk(),
        ForeignKeySpec::new("project_id", "projects", OnDelete::Cascade),
    ])
    .indexes(vec![
        IndexSpec::new("ix_agent_components_user_id", &["user_id"]),
        IndexSpec::new("ix_agent_components_embed_token", &["embed_token"]),
        IndexSpec::new("ix_agent_components_user_created", &["user_id", "created_at"]),
        IndexSpec::new(
            "ix_agent_components_user_published",
            &["user_id", "is_published"],
        ),
    ])
}

pub fn workflows() -> TableSpec {
    TableSpec::new(
        "workflows",
        vec![
            id(),
            user_id(),
            ColumnSpec::new("name", SemanticType::text(255)).not_null(),
            ColumnSpec::new("description", SemanticType::unbounded_text()),
            ColumnSpec::new("langflow_flow_id", SemanticType::text(255)),
            ColumnSpec::new("flow_data", Json),
            ColumnSpec::new("agent_component_ids", Json),
            ColumnSpec::new("is_active", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(true)),
            ColumnSpec::new("is_public", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(false)),
            ColumnSpec::new("is_agent_skill", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(false)),
            created_at(),
            updated_at(),
        ],
    )
    .foreign_keys(vec![user_fk()])
    .indexes(vec![
        IndexSpec::new("ix_workflows_user_id", &["user_id"]),
        IndexSpec::new("ix_workflows_langflow_flow_id", &["langflow_flow_id"]),
        IndexSpec::new("ix_workflows_user_created", &["user_id", "created_at"]),
        IndexSpec::new("ix_workflows_user_langflow", &["user_id", "langflow_flow_id"]),
    ])
}

pub fn conversations() -> TableSpec {
    TableSpec::new(
        "conversations",
        vec![
            id(),
            user_id(),
            ColumnSpec::new("workflow_id", SemanticType::text(36)),
            ColumnSpec::new("langflow_session_id", SemanticType::text(255)),
            ColumnSpec::new("title", SemanticType::text(255)),
            created_at(),
            updated_at(),
        ],
    )
    // workflow_id carries no FK: the column arrived through ADD COLUMN,
    // which cannot attach one on the embedded dialect. The access layer
    // clears references when a workflow is deleted.
    .foreign_keys(vec![user_fk()])
    .indexes(vec![
        IndexSpec::new("ix_conversations_user_id", &["user_id"]),
        IndexSpec::new("ix_conversations_workflow_id", &["workflow_id"]),
        IndexSpec::new(
            "ix_conversations_langflow_session_id",
            &["langflow_session_id"],
        ),
        IndexSpec::new("ix_conversations_user_created", &["user_id", "created_at"]),
    ])
}

pub fn messages() -> TableSpec {
    TableSpec::new(
        "messages",
        vec![
            id(),
            ColumnSpec::new("conversation_id", SemanticType::text(36)).not_null(),
            ColumnSpec::new("role", SemanticType::text(20)).not_null(),
            ColumnSpec::new("content", SemanticType::unbounded_text()).not_null(),
            ColumnSpec::new("message_metadata", Json),
            ColumnSpec::new("is_edited", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(false)),
            ColumnSpec::new("edited_at", Timestamp),
            ColumnSpec::new("original_content", SemanticType::unbounded_text()),
            ColumnSpec::new("feedback", SemanticType::text(20)),
            ColumnSpec::new("feedback_at", Timestamp),
            created_at(),
        ],
    )
    .foreign_keys(vec![ForeignKeySpec::new(
        "conversation_id",
        "conversations",
        OnDelete::Cascade,
    )])
    .indexes(vec![
        IndexSpec::new("ix_messages_conversation_id", &["conversation_id"]),
        IndexSpec::new(
            "ix_messages_conversation_created",
            &["conversation_id", "created_at"],
        ),
    ])
}

pub fn user_files() -> TableSpec {
    TableSpec::new(
        "user_files",
        vec![
            id(),
            user_id(),
            project_fk_column(),
            ColumnSpec::new("filename", SemanticType::text(255)).not_null(),
            ColumnSpec::new("original_filename", SemanticType::text(255)).not_null(),
            ColumnSpec::new("content_type", SemanticType::text(100)),
            ColumnSpec::new("size", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            ColumnSpec::new("storage_path", SemanticType::text(500)).not_null(),
            ColumnSpec::new("description", SemanticType::unbounded_text()),
            created_at(),
            updated_at(),
        ],
    )
    .foreign_keys(vec![user_fk(), project_fk()])
    .indexes(vec![IndexSpec::new("ix_user_files_user_id", &["user_id"])])
}

pub fn knowledge_sources() -> TableSpec {
    TableSpec::new(
        "knowledge_sources",
        vec![
            id(),
            user_id(),
            ColumnSpec::new("name", SemanticType::text(255)).not_null(),
            ColumnSpec::new("source_type", SemanticType::text(50)).not_null(),
            ColumnSpec::new("file_path", SemanticType::text(500)),
            ColumnSpec::new("original_filename", SemanticType::text(255)),
            ColumnSpec::new("mime_type", SemanticType::text(100)),
            ColumnSpec::new("file_size", Integer),
            ColumnSpec::new("url", SemanticType::text(2000)),
            ColumnSpec::new("status", SemanticType::text(50))
                .not_null()
                .default_value(DefaultValue::Text("pending")),
            ColumnSpec::new("error_message", SemanticType::unbounded_text()),
            ColumnSpec::new("collection_id", SemanticType::text(100)),
            ColumnSpec::new("chunk_count", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            ColumnSpec::new("content_preview", SemanticType::unbounded_text()),
            ColumnSpec::new("metadata_json", Json),
            ColumnSpec::new("is_active", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(true)),
            created_at(),
            updated_at(),
        ],
    )
    .foreign_keys(vec![user_fk()])
    .indexes(vec![
        IndexSpec::new("ix_knowledge_sources_user_id", &["user_id"]),
        IndexSpec::new("ix_knowledge_sources_collection_id", &["collection_id"]),
        IndexSpec::new(
            "ix_knowledge_sources_user_created",
            &["user_id", "created_at"],
        ),
    ])
}

pub fn user_settings() -> TableSpec {
    TableSpec::new(
        "user_settings",
        vec![
            id(),
            user_id(),
            ColumnSpec::new("default_llm_provider", SemanticType::text(100)),
            ColumnSpec::new("api_keys_encrypted", Json),
            ColumnSpec::new("theme", SemanticType::text(20))
                .not_null()
                .default_value(DefaultValue::Text("light")),
            ColumnSpec::new("sidebar_collapsed", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(false)),
            ColumnSpec::new("onboarding_completed", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(false)),
            ColumnSpec::new("tours_completed", Json),
            created_at(),
            updated_at(),
        ],
    )
    .foreign_keys(vec![user_fk()])
    .indexes(vec![IndexSpec::unique("ix_user_settings_user_id", &["user_id"])])
}

pub fn subscriptions() -> TableSpec {
    TableSpec::new(
        "subscriptions",
        vec![
            id(),
            user_id(),
            ColumnSpec::new("stripe_customer_id", SemanticType::text(255)),
            ColumnSpec::new("stripe_subscription_id", SemanticType::text(255)),
            ColumnSpec::new("plan_id", SemanticType::text(50))
                .not_null()
                .default_value(DefaultValue::Text("free")),
            ColumnSpec::new("status", SemanticType::text(50))
                .not_null()
                .default_value(DefaultValue::Text("active")),
            ColumnSpec::new("current_period_start", Timestamp),
            ColumnSpec::new("current_period_end", Timestamp),
            ColumnSpec::new("cancel_at_period_end", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(false)),
            ColumnSpec::new("purchased_credits", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            ColumnSpec::new("auto_top_up_enabled", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(false)),
            ColumnSpec::new("auto_top_up_threshold", Integer)
                .not_null()
                .default_value(DefaultValue::Int(100)),
            ColumnSpec::new("auto_top_up_pack_id", SemanticType::text(50))
                .not_null()
                .default_value(DefaultValue::Text("credits_5500")),
            ColumnSpec::new("auto_top_up_max_monthly", Integer)
                .not_null()
                .default_value(DefaultValue::Int(3)),
            ColumnSpec::new("auto_top_ups_this_month", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            ColumnSpec::new("spend_cap_enabled", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(false)),
            ColumnSpec::new("spend_cap_amount_cents", Integer)
                .not_null()
                .default_value(DefaultValue::Int(10000)),
            ColumnSpec::new("spend_this_month_cents", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            created_at(),
            updated_at(),
        ],
    )
    .foreign_keys(vec![user_fk()])
    .indexes(vec![
        IndexSpec::unique("ix_subscriptions_user_id", &["user_id"]),
        IndexSpec::new("ix_subscriptions_stripe_customer_id", &["stripe_customer_id"]),
    ])
}

pub fn billing_events() -> TableSpec {
    TableSpec::new(
        "billing_events",
        vec![
            id(),
            user_id(),
            ColumnSpec::new("event_type", SemanticType::text(100)).not_null(),
            ColumnSpec::new("stripe_event_id", SemanticType::text(255)),
            ColumnSpec::new("payload", Json),
            created_at(),
        ],
    )
    .foreign_keys(vec![user_fk()])
    .indexes(vec![
        IndexSpec::new("ix_billing_events_user_id", &["user_id"]),
        IndexSpec::unique("ix_billing_events_stripe_event_id", &["stripe_event_id"]),
        IndexSpec::new("ix_billing_events_user_created", &["user_id", "created_at"]),
    ])
}

pub fn analytics_daily() -> TableSpec {
    TableSpec::new(
        "analytics_daily",
        vec![
            id(),
            user_id(),
            ColumnSpec::new("record_date", Date).not_null(),
            ColumnSpec::new("conversations_count", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            ColumnSpec::new("messages_count", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            ColumnSpec::new("tokens_used", BigInt)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            ColumnSpec::new("agents_created", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            ColumnSpec::new("agents_active", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            ColumnSpec::new("workflows_created", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            ColumnSpec::new("workflows_executed", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            ColumnSpec::new("avg_response_time_ms", Integer),
            ColumnSpec::new("error_count", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            ColumnSpec::new("breakdown", Json),
            created_at(),
            updated_at(),
        ],
    )
    .foreign_keys(vec![user_fk()])
    .uniques(vec![UniqueSpec::new(
        "uq_analytics_user_date",
        &["user_id", "record_date"],
    )])
    .indexes(vec![IndexSpec::new(
        "ix_analytics_daily_user_date",
        &["user_id", "record_date"],
    )])
}

pub fn missions() -> TableSpec {
    TableSpec::new(
        "missions",
        vec![
            ColumnSpec::new("id", SemanticType::text(50)).not_null(),
            ColumnSpec::new("name", SemanticType::text(255)).not_null(),
            ColumnSpec::new("description", SemanticType::unbounded_text()),
            ColumnSpec::new("category", SemanticType::text(50)),
            ColumnSpec::new("difficulty", SemanticType::text(20))
                .not_null()
                .default_value(DefaultValue::Text("beginner")),
            ColumnSpec::new("estimated_minutes", Integer)
                .not_null()
                .default_value(DefaultValue::Int(30)),
            ColumnSpec::new("icon", SemanticType::text(50)),
            ColumnSpec::new("sort_order", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            ColumnSpec::new("steps", Json).not_null(),
            ColumnSpec::new("prerequisites", Json),
            ColumnSpec::new("outcomes", Json),
            ColumnSpec::new("is_active", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(true)),
            ColumnSpec::new("template_id", SemanticType::text(100)),
            ColumnSpec::new("component_pack", Json),
            ColumnSpec::new("canvas_mode", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(false)),
            ColumnSpec::new("ui_config", Json),
            ColumnSpec::new("required_plan", SemanticType::text(20))
                .not_null()
                .default_value(DefaultValue::Text("free")),
            created_at(),
        ],
    )
    .indexes(vec![
        IndexSpec::new("ix_missions_category", &["category"]),
        IndexSpec::new("ix_missions_sort_order", &["sort_order"]),
    ])
}

pub fn user_mission_progress() -> TableSpec {
    TableSpec::new(
        "user_mission_progress",
        vec![
            id(),
            user_id(),
            ColumnSpec::new("mission_id", SemanticType::text(50)).not_null(),
            ColumnSpec::new("status", SemanticType::text(20))
                .not_null()
                .default_value(DefaultValue::Text("not_started")),
            ColumnSpec::new("current_step", Integer)
                .not_null()
                .default_value(DefaultValue::Int(0)),
            ColumnSpec::new("completed_steps", Json)
                .not_null()
                .default_value(DefaultValue::EmptyJsonArray),
            ColumnSpec::new("started_at", Timestamp),
            ColumnSpec::new("completed_at", Timestamp),
            ColumnSpec::new("artifacts", Json),
            created_at(),
            updated_at(),
        ],
    )
    .foreign_keys(vec![
        user_fk(),
        ForeignKeySpec::new("mission_id", "missions", OnDelete::Cascade),
    ])
    .uniques(vec![UniqueSpec::new(
        "uq_user_mission",
        &["user_id", "mission_id"],
    )])
    .indexes(vec![
        IndexSpec::new("ix_user_mission_progress_user", &["user_id"]),
        IndexSpec::new("ix_user_mission_progress_status", &["status"]),
    ])
}

pub fn mcp_servers() -> TableSpec {
    TableSpec::new(
        "mcp_servers",
        vec![
            id(),
            user_id(),
            project_fk_column(),
            ColumnSpec::new("name", SemanticType::text(255)).not_null(),
            ColumnSpec::new("description", SemanticType::unbounded_text()),
            ColumnSpec::new("server_type", SemanticType::text(50)).not_null(),
            ColumnSpec::new("command", SemanticType::text(500)),
            ColumnSpec::new("args", Json)
                .not_null()
                .default_value(DefaultValue::EmptyJsonArray),
            ColumnSpec::new("env", Json)
                .not_null()
                .default_value(DefaultValue::EmptyJsonObject),
            ColumnSpec::new("credentials_encrypted", SemanticType::unbounded_text()),
            ColumnSpec::new("is_enabled", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(true)),
            ColumnSpec::new("needs_sync", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(true)),
            ColumnSpec::new("last_health_check", Timestamp),
            ColumnSpec::new("health_status", SemanticType::text(50))
                .not_null()
                .default_value(DefaultValue::Text("unknown")),
            ColumnSpec::new("transport", SemanticType::text(20))
                .not_null()
                .default_value(DefaultValue::Text("stdio")),
            ColumnSpec::new("url", SemanticType::text(2000)),
            ColumnSpec::new("headers", Json)
                .not_null()
                .default_value(DefaultValue::EmptyJsonObject),
            ColumnSpec::new("ssl_verify", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(true)),
            ColumnSpec::new("use_cache", Boolean)
                .not_null()
                .default_value(DefaultValue::Bool(false)),
            created_at(),
            updated_at(),
        ],
    )
    .foreign_keys(vec![user_fk(), project_fk()])
    .indexes(vec![
        IndexSpec::new("ix_mcp_servers_user_id", &["user_id"]),
        IndexSpec::new("ix_mcp_servers_project_id", &["project_id"]),
        IndexSpec::new("ix_mcp_servers_user_created", &["user_id", "created_at"]),
    ])
}

pub fn user_connections() -> TableSpec {
    TableSpec::new(
        "user_connections",
        vec![
            id(),
            user_id(),
            ColumnSpec::new("app_name", SemanticType::text(100)).not_null(),
            ColumnSpec::new("app_display_name", SemanticType::text(255)),
            ColumnSpec::new("composio_connection_id", SemanticType::text(255)),
            ColumnSpec::new("composio_entity_id", SemanticType::text(255)).not_null(),
            ColumnSpec::new("status", SemanticType::text(50))
                .not_null()
                .default_value(DefaultValue::Text("pending")),
            ColumnSpec::new("account_identifier", SemanticType::text(255)),
            ColumnSpec::new("scopes", Json),
            ColumnSpec::new("available_actions", Json),
            ColumnSpec::new("connected_at", Timestamp),
            ColumnSpec::new("last_used_at", Timestamp),
            ColumnSpec::new("expires_at", Timestamp),
            ColumnSpec::new("last_error", SemanticType::unbounded_text()),
            created_at(),
            updated_at(),
        ],
    )
    .foreign_keys(vec![user_fk()])
    .uniques(vec![UniqueSpec::new(
        "uq_user_connections_user_app_account",
        &["user_id", "app_name", "account_identifier"],
    )])
    .indexes(vec![
        IndexSpec::new("ix_user_connections_user_id", &["user_id"]),
        IndexSpec::new("ix_user_connections_app_name", &["app_name"]),
        IndexSpec::new(
            "ix_user_connections_composio_connection_id",
            &["composio_connection_id"],
        ),
        IndexSpec::new("ix_user_connections_user_status", &["user_id", "status"]),
    ])
}

/// Every table at head revision.
pub fn all() -> Vec<TableSpec> {
    vec![
        users(),
        projects(),
        agent_components(),
        workflows(),
        conversations(),
        messages(),
        user_files(),
        knowledge_sources(),
        user_settings(),
        subscriptions(),
        billing_events(),
        analytics_daily(),
        missions(),
        user_mission_progress(),
        mcp_servers(),
        user_connections(),
    ]
}
